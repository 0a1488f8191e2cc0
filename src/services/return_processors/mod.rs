//! Type-specific return processing. A return's declared type picks one
//! processor; all of them share the line checks in [`validate_lines`].

pub mod purchase;
pub mod rental;
pub mod sale;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    config::ReturnPolicyConfig,
    entities::{transaction_header, transaction_line},
    errors::ServiceError,
    events::Event,
    models::{
        returns::ReturnLine, transaction::MAX_MONEY_AMOUNT, ReturnDetails, ReturnFinancials,
    },
    services::inventory::InventoryLedger,
};

pub use purchase::PurchaseReturnProcessor;
pub use rental::RentalReturnProcessor;
pub use sale::SaleReturnProcessor;

/// Everything a processor may consult about the return being processed.
#[derive(Debug, Clone, Copy)]
pub struct ReturnContext<'a> {
    pub original: &'a transaction_header::Model,
    pub original_lines: &'a [transaction_line::Model],
    pub return_date: NaiveDate,
    pub processed_by: Option<Uuid>,
    /// Date validation is evaluated against
    pub today: NaiveDate,
}

impl<'a> ReturnContext<'a> {
    pub fn line(&self, id: Uuid) -> Option<&'a transaction_line::Model> {
        self.original_lines.iter().find(|l| l.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Flags a caller-supplied amount outside `0..=MAX_MONEY_AMOUNT`.
    pub fn check_amount(&mut self, label: &str, amount: Decimal) {
        if amount < Decimal::ZERO || amount > MAX_MONEY_AMOUNT {
            self.error(format!(
                "{} must be between 0 and {}",
                label, MAX_MONEY_AMOUNT
            ));
        }
    }
}

#[async_trait]
pub trait ReturnProcessor: Send + Sync {
    /// Collects every problem with the return; never stops at the first.
    fn validate_return(&self, ctx: &ReturnContext<'_>) -> ValidationOutcome;

    /// Stock side of the return, inside the caller's transaction.
    async fn process_inventory(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
    ) -> Result<Vec<Event>, ServiceError>;

    fn calculate_financials(&self, ctx: &ReturnContext<'_>) -> ReturnFinancials;

    /// Type-specific writes after the return and its lines exist.
    async fn post_process(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
        financials: &ReturnFinancials,
    ) -> Result<Vec<Event>, ServiceError>;
}

/// Closed set of processors, selected by the return's declared type.
pub enum ReturnProcessorKind<'a> {
    Sale(SaleReturnProcessor<'a>),
    Purchase(PurchaseReturnProcessor<'a>),
    Rental(RentalReturnProcessor<'a>),
}

impl<'a> ReturnProcessorKind<'a> {
    pub fn select(
        details: &'a ReturnDetails,
        policy: &'a ReturnPolicyConfig,
        ledger: &'a dyn InventoryLedger,
    ) -> Self {
        match details {
            ReturnDetails::Sale(d) => Self::Sale(SaleReturnProcessor::new(d, policy, ledger)),
            ReturnDetails::Purchase(d) => {
                Self::Purchase(PurchaseReturnProcessor::new(d, ledger))
            }
            ReturnDetails::Rental(d) => Self::Rental(RentalReturnProcessor::new(d, policy, ledger)),
        }
    }

    fn inner(&self) -> &dyn ReturnProcessor {
        match self {
            Self::Sale(p) => p,
            Self::Purchase(p) => p,
            Self::Rental(p) => p,
        }
    }
}

#[async_trait]
impl<'a> ReturnProcessor for ReturnProcessorKind<'a> {
    fn validate_return(&self, ctx: &ReturnContext<'_>) -> ValidationOutcome {
        let mut outcome = self.inner().validate_return(ctx);
        if ctx.return_date > ctx.today {
            outcome.errors.insert(
                0,
                format!("Return date {} cannot be in the future", ctx.return_date),
            );
        }
        outcome
    }

    async fn process_inventory(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
    ) -> Result<Vec<Event>, ServiceError> {
        self.inner().process_inventory(txn, ctx, return_id).await
    }

    fn calculate_financials(&self, ctx: &ReturnContext<'_>) -> ReturnFinancials {
        self.inner().calculate_financials(ctx)
    }

    async fn post_process(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
        financials: &ReturnFinancials,
    ) -> Result<Vec<Event>, ServiceError> {
        self.inner()
            .post_process(txn, ctx, return_id, financials)
            .await
    }
}

/// Checks shared by every return type: lines exist on the original, are
/// listed once, and stay within what is left to return.
pub fn validate_lines<L: ReturnLine>(lines: &[L], ctx: &ReturnContext<'_>) -> Vec<String> {
    if lines.is_empty() {
        return vec!["At least one return line is required".to_string()];
    }

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for line in lines {
        let id = line.original_line_id();
        if !seen.insert(id) {
            errors.push(format!("Line {} appears more than once", id));
            continue;
        }
        let Some(original) = ctx.line(id) else {
            errors.push(format!(
                "Line {} not found on transaction {}",
                id, ctx.original.transaction_number
            ));
            continue;
        };
        let quantity = line.return_quantity();
        if quantity <= 0 {
            errors.push(format!("Return quantity for line {} must be positive", id));
        } else if quantity > original.remaining_quantity() {
            errors.push(format!(
                "Return quantity {} for line {} exceeds remaining quantity {} (original {}, already returned {})",
                quantity,
                id,
                original.remaining_quantity(),
                original.quantity,
                original.returned_quantity
            ));
        }
    }
    errors
}

/// Value of the returned quantities at original unit prices.
pub fn returned_value<L: ReturnLine>(lines: &[L], ctx: &ReturnContext<'_>) -> Decimal {
    lines
        .iter()
        .filter_map(|l| {
            ctx.line(l.original_line_id())
                .map(|o| o.unit_price * Decimal::from(l.return_quantity()))
        })
        .sum()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{TransactionStatus, TransactionType};
    use chrono::{TimeZone, Utc};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn header(
        transaction_type: TransactionType,
        status: TransactionStatus,
        day: NaiveDate,
    ) -> transaction_header::Model {
        let at = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
        transaction_header::Model {
            id: Uuid::new_v4(),
            transaction_number: "TXN-1".into(),
            transaction_type,
            status,
            transaction_date: at,
            customer_id: None,
            supplier_id: None,
            location_id: None,
            reference_transaction_id: None,
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            deposit_amount: Decimal::ZERO,
            customer_advance_balance: Decimal::ZERO,
            rental_start_date: None,
            rental_end_date: None,
            rental_period: None,
            rental_period_unit: None,
            workflow_state: None,
            notes: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn line(header: &transaction_header::Model, quantity: i32, unit_price: Decimal) -> transaction_line::Model {
        transaction_line::Model {
            id: Uuid::new_v4(),
            transaction_id: header.id,
            line_number: 1,
            item_id: Uuid::new_v4(),
            inventory_unit_id: None,
            location_id: None,
            description: "Item".into(),
            quantity,
            unit_price,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            line_total: unit_price * Decimal::from(quantity),
            rental_start_date: None,
            rental_end_date: None,
            rental_period: None,
            rental_status: None,
            returned_quantity: 0,
            return_condition: None,
            original_line_id: None,
            version: 0,
            created_at: header.created_at,
            updated_at: header.created_at,
        }
    }

    pub fn ctx<'a>(
        original: &'a transaction_header::Model,
        lines: &'a [transaction_line::Model],
        return_date: NaiveDate,
    ) -> ReturnContext<'a> {
        ReturnContext {
            original,
            original_lines: lines,
            return_date,
            processed_by: None,
            today: return_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{PurchaseReturnLine, TransactionStatus, TransactionType};
    use rust_decimal_macros::dec;

    fn purchase_line(id: Uuid, qty: i32) -> PurchaseReturnLine {
        PurchaseReturnLine {
            original_line_id: id,
            return_quantity: qty,
            defect_code: None,
            supplier_fault: false,
            notes: None,
        }
    }

    #[test]
    fn over_return_names_line_and_quantities() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let mut original = line(&header, 5, dec!(10));
        original.returned_quantity = 3;
        let lines = vec![original.clone()];
        let ctx = ctx(&header, &lines, date(2024, 3, 2));

        let errors = validate_lines(&[purchase_line(original.id, 3)], &ctx);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(&original.id.to_string()));
        assert!(errors[0].contains("remaining quantity 2"));
    }

    #[test]
    fn unknown_duplicate_and_zero_lines_are_all_reported() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 5, dec!(10));
        let lines = vec![original.clone()];
        let ctx = ctx(&header, &lines, date(2024, 3, 2));

        let errors = validate_lines(
            &[
                purchase_line(original.id, 0),
                purchase_line(original.id, 1),
                purchase_line(Uuid::new_v4(), 1),
            ],
            &ctx,
        );
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn empty_return_is_rejected() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let ctx = ctx(&header, &[], date(2024, 3, 2));
        let errors = validate_lines::<PurchaseReturnLine>(&[], &ctx);
        assert_eq!(errors, vec!["At least one return line is required".to_string()]);
    }

    #[test]
    fn returned_value_uses_original_prices() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let a = line(&header, 5, dec!(10));
        let b = line(&header, 2, dec!(7.5));
        let lines = vec![a.clone(), b.clone()];
        let ctx = ctx(&header, &lines, date(2024, 3, 2));

        let value = returned_value(&[purchase_line(a.id, 2), purchase_line(b.id, 2)], &ctx);
        assert_eq!(value, dec!(35));
    }

    #[test]
    fn future_return_date_is_rejected_for_every_type() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 5, dec!(10));
        let lines = vec![original.clone()];
        let details = crate::models::PurchaseReturnDetails {
            lines: vec![purchase_line(original.id, 1)],
            supplier_rma_number: "RMA-1".into(),
            rma_authorization_date: None,
            is_quality_claim: false,
            supplier_restocking_fee_percent: None,
            quality_check_required: false,
            shipping_carrier: None,
            tracking_number: None,
        };
        let processor = ReturnProcessorKind::Purchase(PurchaseReturnProcessor::new(
            &details,
            &crate::services::inventory::SeaOrmInventoryLedger,
        ));

        let mut future = ctx(&header, &lines, date(2024, 3, 20));
        future.today = date(2024, 3, 10);
        let outcome = processor.validate_return(&future);
        assert_eq!(outcome.errors[0], "Return date 2024-03-20 cannot be in the future");

        future.today = date(2024, 3, 20);
        let outcome = processor.validate_return(&future);
        assert!(outcome.errors.iter().all(|e| !e.contains("future")), "{:?}", outcome.errors);
    }
}
