use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::rental::RentalStatus;
use super::returns::ReturnWorkflowState;
use crate::entities::{transaction_header, transaction_line};

/// Kind of financial record held in `transaction_headers`.
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
pub enum TransactionType {
    #[sea_orm(string_value = "SALE")]
    Sale,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "RENTAL")]
    Rental,
    #[sea_orm(string_value = "RETURN")]
    Return,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
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
pub enum TransactionStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "ON_HOLD")]
    OnHold,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

/// Unit the `rental_period` of a rental header is expressed in.
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
pub enum RentalPeriodUnit {
    #[sea_orm(string_value = "HOUR")]
    Hour,
    #[sea_orm(string_value = "DAY")]
    Day,
    #[sea_orm(string_value = "WEEK")]
    Week,
    #[sea_orm(string_value = "MONTH")]
    Month,
}

impl TransactionType {
    /// Prefix used when generating transaction numbers.
    pub fn number_prefix(self) -> &'static str {
        match self {
            TransactionType::Sale => "SAL",
            TransactionType::Purchase => "PUR",
            TransactionType::Rental => "REN",
            TransactionType::Return => "RET",
            TransactionType::Adjustment => "ADJ",
        }
    }
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Completed
}

/// Largest amount accepted on any money input (10^15).
pub const MAX_MONEY_AMOUNT: Decimal = dec!(1000000000000000);

/// Largest quantity accepted on a transaction line.
pub const MAX_LINE_QUANTITY: i32 = 1_000_000;

fn positive_quantity(quantity: i32) -> Result<(), ValidationError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some(format!("Quantity must be between 1 and {}", MAX_LINE_QUANTITY).into());
        Err(err)
    }
}

/// Non-negative and at most [`MAX_MONEY_AMOUNT`].
pub(crate) fn money_amount(amount: &Decimal) -> Result<(), ValidationError> {
    let message = if *amount < Decimal::ZERO {
        "Amount cannot be negative".to_string()
    } else if *amount > MAX_MONEY_AMOUNT {
        format!("Amount cannot exceed {}", MAX_MONEY_AMOUNT)
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new("range");
    err.message = Some(message.into());
    Err(err)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionLine {
    pub item_id: Uuid,
    #[serde(default)]
    pub inventory_unit_id: Option<Uuid>,
    /// Registers a new inventory unit on PURCHASE lines
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Description cannot be empty"))]
    pub description: String,
    #[validate(custom = "positive_quantity")]
    pub quantity: i32,
    #[validate(custom = "money_amount")]
    pub unit_price: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub discount_amount: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub rental_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub rental_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub rental_period: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    pub transaction_type: TransactionType,
    #[serde(default = "default_status")]
    pub status: TransactionStatus,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub discount_amount: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub paid_amount: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub deposit_amount: Decimal,
    #[serde(default)]
    #[validate(custom = "money_amount")]
    pub customer_advance_balance: Decimal,
    #[serde(default)]
    pub rental_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub rental_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub rental_period: Option<i32>,
    #[serde(default)]
    pub rental_period_unit: Option<RentalPeriodUnit>,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Notes too long"))]
    pub notes: Option<String>,
    /// Each line is validated by the service
    #[validate(length(min = 1, max = 1000, message = "Between 1 and 1000 lines are required"))]
    pub lines: Vec<CreateTransactionLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionLineView {
    pub id: Uuid,
    pub line_number: i32,
    pub item_id: Uuid,
    pub inventory_unit_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub rental_status: Option<RentalStatus>,
    pub returned_quantity: i32,
    pub return_condition: Option<String>,
    pub original_line_id: Option<Uuid>,
}

impl From<transaction_line::Model> for TransactionLineView {
    fn from(line: transaction_line::Model) -> Self {
        Self {
            id: line.id,
            line_number: line.line_number,
            item_id: line.item_id,
            inventory_unit_id: line.inventory_unit_id,
            description: line.description,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
            rental_start_date: line.rental_start_date,
            rental_end_date: line.rental_end_date,
            rental_status: line.rental_status,
            returned_quantity: line.returned_quantity,
            return_condition: line.return_condition,
            original_line_id: line.original_line_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub transaction_number: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub transaction_date: DateTime<Utc>,
    pub customer_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub reference_transaction_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub deposit_amount: Decimal,
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub rental_period: Option<i32>,
    pub rental_period_unit: Option<RentalPeriodUnit>,
    pub workflow_state: Option<ReturnWorkflowState>,
    pub notes: Option<String>,
    pub lines: Vec<TransactionLineView>,
}

impl TransactionView {
    pub fn new(header: transaction_header::Model, lines: Vec<transaction_line::Model>) -> Self {
        Self {
            id: header.id,
            transaction_number: header.transaction_number,
            transaction_type: header.transaction_type,
            status: header.status,
            transaction_date: header.transaction_date,
            customer_id: header.customer_id,
            supplier_id: header.supplier_id,
            reference_transaction_id: header.reference_transaction_id,
            subtotal: header.subtotal,
            discount_amount: header.discount_amount,
            tax_amount: header.tax_amount,
            total_amount: header.total_amount,
            paid_amount: header.paid_amount,
            deposit_amount: header.deposit_amount,
            rental_start_date: header.rental_start_date,
            rental_end_date: header.rental_end_date,
            rental_period: header.rental_period,
            rental_period_unit: header.rental_period_unit,
            workflow_state: header.workflow_state,
            notes: header.notes,
            lines: lines.into_iter().map(TransactionLineView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transaction_type_round_trips_through_strings() {
        assert_eq!(TransactionType::Rental.to_string(), "RENTAL");
        assert_eq!(
            TransactionType::from_str("PURCHASE").unwrap(),
            TransactionType::Purchase
        );
        assert!(TransactionType::from_str("LEASE").is_err());
    }

    #[test]
    fn money_bound_is_ten_to_the_fifteenth() {
        assert_eq!(MAX_MONEY_AMOUNT, Decimal::from(1_000_000_000_000_000i64));
        assert!(money_amount(&MAX_MONEY_AMOUNT).is_ok());
        assert!(money_amount(&Decimal::ZERO).is_ok());
        assert!(money_amount(&(MAX_MONEY_AMOUNT + Decimal::ONE)).is_err());
        assert!(money_amount(&Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn line_quantity_is_bounded() {
        assert!(positive_quantity(1).is_ok());
        assert!(positive_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(positive_quantity(0).is_err());
        assert!(positive_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&TransactionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
