use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::transaction::money_amount;
use crate::errors::ServiceError;

/// Aggregate status of a rental, tracked per line and per lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "LATE")]
    Late,
    #[sea_orm(string_value = "EXTENDED")]
    Extended,
    #[sea_orm(string_value = "PARTIAL_RETURN")]
    PartialReturn,
    #[sea_orm(string_value = "LATE_PARTIAL_RETURN")]
    LatePartialReturn,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

impl RentalStatus {
    /// Statuses reachable from `self` in one step.
    pub fn allowed_transitions(self) -> &'static [RentalStatus] {
        use RentalStatus::*;
        match self {
            Active => &[Late, Extended, PartialReturn, Completed],
            Late => &[Extended, LatePartialReturn, Completed],
            Extended => &[Active, Late, PartialReturn, Completed],
            PartialReturn => &[LatePartialReturn, Completed],
            LatePartialReturn => &[Completed],
            Completed => &[],
        }
    }

    pub fn can_transition_to(self, next: RentalStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Checks the transition table, failing with the rejected pair.
    pub fn ensure_transition(self, next: RentalStatus) -> Result<(), ServiceError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(format!(
                "Invalid rental status transition from {} to {}",
                self, next
            )))
        }
    }

    /// Status an overdue rental moves to, if it is still open.
    pub fn overdue_successor(self) -> Option<RentalStatus> {
        match self {
            RentalStatus::Active | RentalStatus::Extended => Some(RentalStatus::Late),
            RentalStatus::PartialReturn => Some(RentalStatus::LatePartialReturn),
            _ => None,
        }
    }
}

/// Condition recorded when a rented item comes back.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalItemCondition {
    #[sea_orm(string_value = "EXCELLENT")]
    Excellent,
    #[sea_orm(string_value = "GOOD")]
    Good,
    #[sea_orm(string_value = "FAIR")]
    Fair,
    #[sea_orm(string_value = "POOR")]
    Poor,
    #[sea_orm(string_value = "DAMAGED")]
    Damaged,
}

impl RentalItemCondition {
    pub fn needs_photos(self) -> bool {
        matches!(self, RentalItemCondition::Poor | RentalItemCondition::Damaged)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageSeverity {
    #[sea_orm(string_value = "MINOR")]
    Minor,
    #[sea_orm(string_value = "MODERATE")]
    Moderate,
    #[sea_orm(string_value = "MAJOR")]
    Major,
    #[sea_orm(string_value = "TOTAL_LOSS")]
    TotalLoss,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnEventType {
    #[sea_orm(string_value = "PARTIAL_RETURN")]
    PartialReturn,
    #[sea_orm(string_value = "FULL_RETURN")]
    FullReturn,
    #[sea_orm(string_value = "EXTENSION")]
    Extension,
    #[sea_orm(string_value = "STATUS_CHANGE")]
    StatusChange,
}

/// One returned line inside a rental return event, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnedItem {
    pub line_id: Uuid,
    pub quantity: i32,
    pub condition: Option<RentalItemCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateRentalStatusRequest {
    pub status: RentalStatus,
    #[serde(default)]
    pub changed_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RentalReturnRequest {
    pub return_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one returned item is required"))]
    pub items: Vec<ReturnedItem>,
    #[serde(default)]
    pub processed_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
}

fn default_return_to_stock() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct InspectionRequest {
    pub transaction_line_id: Uuid,
    pub condition: RentalItemCondition,
    #[serde(default)]
    pub damage_severity: Option<DamageSeverity>,
    #[serde(default)]
    pub damage_description: Option<String>,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub estimated_repair_cost: Option<Decimal>,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub replacement_cost: Option<Decimal>,
    /// Replaces the severity-based damage fee
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub custom_damage_fee: Option<Decimal>,
    #[serde(default = "default_return_to_stock")]
    pub return_to_stock: bool,
    #[serde(default)]
    pub requires_maintenance: bool,
    #[serde(default)]
    pub inspected_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CompleteReturnEventRequest {
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub payment_collected: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub refund_issued: Decimal,
    #[serde(default)]
    pub completed_by: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ExtendRentalRequest {
    pub new_end_date: NaiveDate,
    #[serde(default)]
    #[validate(length(max = 255, message = "Reason too long"))]
    pub reason: Option<String>,
    #[serde(default)]
    pub processed_by: Option<Uuid>,
}
