use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use uuid::Uuid;

use super::{returned_value, validate_lines, ReturnContext, ReturnProcessor, ValidationOutcome};
use crate::{
    errors::ServiceError,
    events::Event,
    models::{
        FinancialBreakdown, InventoryUnitStatus, PurchaseReturnDetails, ReturnFinancials,
        StockMovementType, TransactionType,
    },
    services::{
        fee_calculator::round_money,
        inventory::{line_location, InventoryLedger, StockAdjustment},
    },
};

/// Goods sent back to a supplier under an RMA.
pub struct PurchaseReturnProcessor<'a> {
    details: &'a PurchaseReturnDetails,
    ledger: &'a dyn InventoryLedger,
}

impl<'a> PurchaseReturnProcessor<'a> {
    pub fn new(details: &'a PurchaseReturnDetails, ledger: &'a dyn InventoryLedger) -> Self {
        Self { details, ledger }
    }

    fn restocking_percent(&self) -> Decimal {
        self.details
            .supplier_restocking_fee_percent
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl<'a> ReturnProcessor for PurchaseReturnProcessor<'a> {
    fn validate_return(&self, ctx: &ReturnContext<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        if self.details.supplier_rma_number.trim().is_empty() {
            outcome.error("Supplier RMA number is required");
        }
        if ctx.original.transaction_type != TransactionType::Purchase {
            outcome.error(format!(
                "Original transaction {} is not a purchase",
                ctx.original.transaction_number
            ));
        }

        outcome
            .errors
            .extend(validate_lines(&self.details.lines, ctx));

        if self.details.is_quality_claim && !self.details.lines.iter().any(|l| l.supplier_fault) {
            outcome.error("Quality claims require at least one supplier-fault line");
        }
        if let Some(authorized) = self.details.rma_authorization_date {
            if authorized > ctx.today {
                outcome.error(format!(
                    "RMA authorization date {} is in the future",
                    authorized
                ));
            }
        }
        let percent = self.restocking_percent();
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            outcome.error("Supplier restocking fee percent must be between 0 and 100");
        }

        if self.details.tracking_number.is_none() {
            outcome.warn("No shipment tracking number given for the supplier return");
        }

        outcome
    }

    async fn process_inventory(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
    ) -> Result<Vec<Event>, ServiceError> {
        let notes = format!("RMA: {}", self.details.supplier_rma_number.trim());
        let mut events = Vec::new();

        for line in &self.details.lines {
            let Some(original) = ctx.line(line.original_line_id) else {
                continue;
            };
            let location_id = line_location(original, ctx.original);
            let delta = -line.return_quantity;

            self.ledger
                .adjust_stock(
                    txn,
                    StockAdjustment {
                        item_id: original.item_id,
                        location_id,
                        delta,
                        movement_type: StockMovementType::SupplierReturn,
                        affects_available: true,
                        reference_id: Some(return_id),
                        notes: Some(notes.clone()),
                    },
                )
                .await?;
            if let Some(unit_id) = original.inventory_unit_id {
                self.ledger
                    .update_unit_status(
                        txn,
                        unit_id,
                        InventoryUnitStatus::ReturnedToSupplier,
                        line.defect_code.clone(),
                    )
                    .await?;
            }
            events.push(Event::StockAdjusted {
                item_id: original.item_id,
                location_id,
                delta,
                movement_type: StockMovementType::SupplierReturn,
            });
        }
        Ok(events)
    }

    fn calculate_financials(&self, ctx: &ReturnContext<'_>) -> ReturnFinancials {
        let return_value = returned_value(&self.details.lines, ctx);
        let restocking_fee = round_money(return_value * self.restocking_percent() / Decimal::ONE_HUNDRED);
        let expected_credit = return_value - restocking_fee;

        ReturnFinancials {
            return_value,
            estimated_refund: expected_credit,
            estimated_fees: restocking_fee,
            breakdown: FinancialBreakdown::Purchase {
                return_value,
                restocking_fee,
                expected_credit,
            },
        }
    }

    async fn post_process(
        &self,
        _txn: &DatabaseTransaction,
        _ctx: &ReturnContext<'_>,
        _return_id: Uuid,
        _financials: &ReturnFinancials,
    ) -> Result<Vec<Event>, ServiceError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::{PurchaseReturnLine, TransactionStatus};
    use crate::services::inventory::SeaOrmInventoryLedger;
    use rust_decimal_macros::dec;

    fn details(lines: Vec<PurchaseReturnLine>, rma: &str) -> PurchaseReturnDetails {
        PurchaseReturnDetails {
            lines,
            supplier_rma_number: rma.into(),
            rma_authorization_date: None,
            is_quality_claim: false,
            supplier_restocking_fee_percent: None,
            quality_check_required: false,
            shipping_carrier: None,
            tracking_number: Some("1Z999".into()),
        }
    }

    fn purchase_line(id: Uuid, qty: i32, supplier_fault: bool) -> PurchaseReturnLine {
        PurchaseReturnLine {
            original_line_id: id,
            return_quantity: qty,
            defect_code: None,
            supplier_fault,
            notes: None,
        }
    }

    #[test]
    fn blank_rma_is_rejected() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 10, dec!(4));
        let lines = vec![original.clone()];
        let details = details(vec![purchase_line(original.id, 2, false)], "  ");
        let processor = PurchaseReturnProcessor::new(&details, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 5)));
        assert_eq!(outcome.errors, vec!["Supplier RMA number is required".to_string()]);
    }

    #[test]
    fn quality_claim_needs_supplier_fault_and_past_authorization() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 10, dec!(4));
        let lines = vec![original.clone()];
        let mut details = details(vec![purchase_line(original.id, 2, false)], "RMA-7");
        details.is_quality_claim = true;
        details.rma_authorization_date = Some(date(2024, 4, 1));
        let processor = PurchaseReturnProcessor::new(&details, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 5)));
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(
            outcome.errors[0],
            "Quality claims require at least one supplier-fault line"
        );
        assert!(outcome.errors[1].contains("in the future"));
    }

    #[test]
    fn sale_cannot_be_returned_to_supplier() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 1, dec!(4));
        let lines = vec![original.clone()];
        let details = details(vec![purchase_line(original.id, 1, true)], "RMA-7");
        let processor = PurchaseReturnProcessor::new(&details, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 5)));
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].contains("is not a purchase"));
    }

    #[test]
    fn expected_credit_deducts_supplier_restocking_fee() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 10, dec!(12.50));
        let lines = vec![original.clone()];
        let mut details = details(vec![purchase_line(original.id, 4, true)], "RMA-7");
        details.supplier_restocking_fee_percent = Some(dec!(10));
        let processor = PurchaseReturnProcessor::new(&details, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 5)));
        assert_eq!(
            financials.breakdown,
            FinancialBreakdown::Purchase {
                return_value: dec!(50.00),
                restocking_fee: dec!(5.00),
                expected_credit: dec!(45.00),
            }
        );
        assert_eq!(financials.estimated_refund, dec!(45.00));
    }

    #[test]
    fn percent_out_of_range_is_rejected() {
        let header = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 10, dec!(4));
        let lines = vec![original.clone()];
        let mut details = details(vec![purchase_line(original.id, 1, false)], "RMA-7");
        details.supplier_restocking_fee_percent = Some(dec!(120));
        let processor = PurchaseReturnProcessor::new(&details, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 5)));
        assert_eq!(outcome.errors.len(), 1);
    }
}
