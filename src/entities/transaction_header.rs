use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{RentalPeriodUnit, ReturnWorkflowState, TransactionStatus, TransactionType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_headers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub transaction_date: DateTimeUtc,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    /// Original transaction for RETURN headers
    pub reference_transaction_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub paid_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub deposit_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub customer_advance_balance: Decimal,
    pub rental_start_date: Option<Date>,
    pub rental_end_date: Option<Date>,
    pub rental_period: Option<i32>,
    pub rental_period_unit: Option<RentalPeriodUnit>,
    pub workflow_state: Option<ReturnWorkflowState>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_line::Entity")]
    Lines,
    #[sea_orm(has_one = "super::rental_lifecycle::Entity")]
    RentalLifecycle,
    #[sea_orm(has_one = "super::transaction_metadata::Entity")]
    Metadata,
}

impl Related<super::transaction_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::rental_lifecycle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RentalLifecycle.def()
    }
}

impl Related<super::transaction_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Metadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inclusive-exclusive span of the rental in days, when both dates are set.
    pub fn rental_duration_days(&self) -> Option<i64> {
        match (self.rental_start_date, self.rental_end_date) {
            (Some(start), Some(end)) => Some((end - start).num_days()),
            _ => None,
        }
    }

    pub fn transaction_day(&self) -> NaiveDate {
        self.transaction_date.date_naive()
    }
}
