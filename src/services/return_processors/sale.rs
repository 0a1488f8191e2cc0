use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use uuid::Uuid;

use super::{returned_value, validate_lines, ReturnContext, ReturnProcessor, ValidationOutcome};
use crate::{
    config::ReturnPolicyConfig,
    errors::ServiceError,
    events::Event,
    models::{
        FinancialBreakdown, InventoryUnitStatus, RefundMethod, ReturnFinancials,
        SaleItemCondition, SaleReturnDetails, StockMovementType, TransactionStatus,
        TransactionType,
    },
    services::{
        fee_calculator::round_money,
        inventory::{line_location, InventoryLedger, StockAdjustment},
    },
};

/// Customer returns against a completed sale.
pub struct SaleReturnProcessor<'a> {
    details: &'a SaleReturnDetails,
    policy: &'a ReturnPolicyConfig,
    ledger: &'a dyn InventoryLedger,
}

impl<'a> SaleReturnProcessor<'a> {
    pub fn new(
        details: &'a SaleReturnDetails,
        policy: &'a ReturnPolicyConfig,
        ledger: &'a dyn InventoryLedger,
    ) -> Self {
        Self {
            details,
            policy,
            ledger,
        }
    }

    pub fn refund_factor(&self, condition: SaleItemCondition) -> Decimal {
        match condition {
            SaleItemCondition::New => Decimal::ONE,
            SaleItemCondition::Opened => self.policy.opened_refund_factor,
            SaleItemCondition::Used => self.policy.used_refund_factor,
            SaleItemCondition::Damaged => self.policy.damaged_refund_factor,
        }
    }
}

/// Stock status for a restocked sale item.
pub fn restock_status(condition: SaleItemCondition) -> InventoryUnitStatus {
    match condition {
        SaleItemCondition::New | SaleItemCondition::Opened => InventoryUnitStatus::Available,
        SaleItemCondition::Used => InventoryUnitStatus::AvailableUsed,
        SaleItemCondition::Damaged => InventoryUnitStatus::RequiresInspection,
    }
}

#[async_trait]
impl<'a> ReturnProcessor for SaleReturnProcessor<'a> {
    fn validate_return(&self, ctx: &ReturnContext<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let original = ctx.original;

        if original.transaction_type != TransactionType::Sale {
            outcome.error(format!(
                "Original transaction {} is not a sale",
                original.transaction_number
            ));
        } else if original.status != TransactionStatus::Completed {
            outcome.error(format!(
                "Original sale {} is not completed",
                original.transaction_number
            ));
        }

        // The window runs to the day the return is recorded, whatever date it carries.
        let days_since_sale = (ctx.today - original.transaction_day()).num_days();
        if ctx.return_date < original.transaction_day() {
            outcome.error("Return date cannot precede the original transaction");
        } else if days_since_sale > self.policy.sale_return_window_days {
            outcome.error(format!(
                "Return window of {} days has expired ({} days since sale)",
                self.policy.sale_return_window_days, days_since_sale
            ));
        }

        outcome
            .errors
            .extend(validate_lines(&self.details.lines, ctx));

        if self.details.refund_method == RefundMethod::Exchange
            && self.details.exchange_transaction_id.is_none()
        {
            outcome.error("Exchange transaction id is required for EXCHANGE refunds");
        }

        if self.details.refund_method == RefundMethod::OriginalPayment
            && self
                .details
                .lines
                .iter()
                .any(|l| l.condition == SaleItemCondition::Damaged || !l.original_packaging)
        {
            outcome.error(
                "Original payment refunds are not allowed for damaged items or items without original packaging",
            );
        }

        outcome.check_amount("Return shipping cost", self.details.return_shipping_cost);
        if self.details.customer_pays_return_shipping
            && self.details.return_shipping_cost.is_zero()
        {
            outcome.warn("Customer pays return shipping but no shipping cost was given");
        }
        if self.details.lines.iter().any(|l| !l.return_to_stock) {
            outcome.warn("Some items will not be returned to stock");
        }

        outcome
    }

    async fn process_inventory(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
    ) -> Result<Vec<Event>, ServiceError> {
        let mut events = Vec::new();
        for line in self.details.lines.iter().filter(|l| l.return_to_stock) {
            let Some(original) = ctx.line(line.original_line_id) else {
                continue;
            };
            let status = restock_status(line.condition);
            let location_id = line_location(original, ctx.original);

            self.ledger
                .adjust_stock(
                    txn,
                    StockAdjustment {
                        item_id: original.item_id,
                        location_id,
                        delta: line.return_quantity,
                        movement_type: StockMovementType::CustomerReturn,
                        affects_available: status.is_sellable(),
                        reference_id: Some(return_id),
                        notes: line.notes.clone(),
                    },
                )
                .await?;
            if let Some(unit_id) = original.inventory_unit_id {
                self.ledger
                    .update_unit_status(txn, unit_id, status, Some(line.condition.to_string()))
                    .await?;
            }
            events.push(Event::StockAdjusted {
                item_id: original.item_id,
                location_id,
                delta: line.return_quantity,
                movement_type: StockMovementType::CustomerReturn,
            });
        }
        Ok(events)
    }

    fn calculate_financials(&self, ctx: &ReturnContext<'_>) -> ReturnFinancials {
        let subtotal: Decimal = self
            .details
            .lines
            .iter()
            .filter_map(|l| {
                ctx.line(l.original_line_id).map(|o| {
                    o.unit_price * Decimal::from(l.return_quantity) * self.refund_factor(l.condition)
                })
            })
            .sum();

        let restocking_fee = if self.details.lines.iter().any(|l| !l.original_packaging) {
            subtotal * self.policy.restocking_fee_rate
        } else {
            Decimal::ZERO
        };
        let shipping_deduction = if self.details.customer_pays_return_shipping {
            self.details.return_shipping_cost
        } else {
            Decimal::ZERO
        };
        let refund_amount =
            round_money((subtotal - restocking_fee - shipping_deduction).max(Decimal::ZERO));

        ReturnFinancials {
            return_value: returned_value(&self.details.lines, ctx),
            estimated_refund: refund_amount,
            estimated_fees: restocking_fee + shipping_deduction,
            breakdown: FinancialBreakdown::Sale {
                subtotal,
                restocking_fee,
                shipping_deduction,
                refund_amount,
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
    use crate::models::SaleReturnLine;
    use crate::services::inventory::SeaOrmInventoryLedger;
    use rust_decimal_macros::dec;

    fn sale_line(id: Uuid, qty: i32, condition: SaleItemCondition, packaging: bool) -> SaleReturnLine {
        SaleReturnLine {
            original_line_id: id,
            return_quantity: qty,
            condition,
            return_to_stock: true,
            original_packaging: packaging,
            notes: None,
        }
    }

    fn details(lines: Vec<SaleReturnLine>, method: RefundMethod) -> SaleReturnDetails {
        SaleReturnDetails {
            lines,
            refund_method: method,
            exchange_transaction_id: None,
            customer_pays_return_shipping: false,
            return_shipping_cost: Decimal::ZERO,
            quality_check_required: false,
        }
    }

    #[test]
    fn opened_item_without_packaging() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 1, dec!(50));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(
            vec![sale_line(original.id, 1, SaleItemCondition::Opened, false)],
            RefundMethod::StoreCredit,
        );
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 5)));
        match financials.breakdown {
            FinancialBreakdown::Sale {
                subtotal,
                restocking_fee,
                ..
            } => {
                assert_eq!(subtotal, dec!(47.50));
                assert_eq!(restocking_fee, dec!(7.125));
            }
            other => panic!("unexpected breakdown {:?}", other),
        }
        assert_eq!(financials.estimated_refund, dec!(40.38));
        assert_eq!(financials.return_value, dec!(50));
    }

    #[test]
    fn customer_paid_shipping_is_deducted() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 2, dec!(20));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let mut details = details(
            vec![sale_line(original.id, 2, SaleItemCondition::New, true)],
            RefundMethod::OriginalPayment,
        );
        details.customer_pays_return_shipping = true;
        details.return_shipping_cost = dec!(6.99);
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 5)));
        assert_eq!(financials.estimated_refund, dec!(33.01));
        assert_eq!(financials.estimated_fees, dec!(6.99));
    }

    #[test]
    fn expired_window_and_refund_rules_are_collected() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 1, 1));
        let original = line(&header, 1, dec!(50));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(
            vec![sale_line(original.id, 1, SaleItemCondition::Damaged, true)],
            RefundMethod::OriginalPayment,
        );
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 1)));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("Return window of 30 days has expired"));
        assert!(outcome.errors[1].contains("Original payment refunds are not allowed"));
    }

    #[test]
    fn backdated_return_date_does_not_reopen_the_window() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 1, 1));
        let original = line(&header, 1, dec!(50));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(
            vec![sale_line(original.id, 1, SaleItemCondition::New, true)],
            RefundMethod::StoreCredit,
        );
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let mut backdated = ctx(&header, &lines, date(2024, 1, 10));
        backdated.today = date(2024, 3, 1);
        let outcome = processor.validate_return(&backdated);
        assert_eq!(outcome.errors.len(), 1, "{:?}", outcome.errors);
        assert!(outcome.errors[0].contains("Return window of 30 days has expired (60 days since sale)"));
    }

    #[test]
    fn negative_shipping_cost_is_rejected() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 1, dec!(50));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let mut details = details(
            vec![sale_line(original.id, 1, SaleItemCondition::New, true)],
            RefundMethod::StoreCredit,
        );
        details.return_shipping_cost = dec!(-5);
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 2)));
        assert_eq!(outcome.errors.len(), 1, "{:?}", outcome.errors);
        assert!(outcome.errors[0].starts_with("Return shipping cost must be between 0 and"));
    }

    #[test]
    fn exchange_requires_exchange_transaction() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let original = line(&header, 1, dec!(50));
        let lines = vec![original.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(
            vec![sale_line(original.id, 1, SaleItemCondition::New, true)],
            RefundMethod::Exchange,
        );
        let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 2)));
        assert_eq!(
            outcome.errors,
            vec!["Exchange transaction id is required for EXCHANGE refunds".to_string()]
        );
    }

    #[test]
    fn original_must_be_a_completed_sale() {
        let pending = header(TransactionType::Sale, TransactionStatus::Pending, date(2024, 3, 1));
        let purchase = header(TransactionType::Purchase, TransactionStatus::Completed, date(2024, 3, 1));
        let policy = ReturnPolicyConfig::default();

        for original in [&pending, &purchase] {
            let l = line(original, 1, dec!(5));
            let lines = vec![l.clone()];
            let details = details(
                vec![sale_line(l.id, 1, SaleItemCondition::New, true)],
                RefundMethod::Cash,
            );
            let processor = SaleReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);
            let outcome = processor.validate_return(&ctx(original, &lines, date(2024, 3, 2)));
            assert_eq!(outcome.errors.len(), 1, "{:?}", outcome.errors);
        }
    }

    #[test]
    fn restock_status_follows_condition() {
        assert_eq!(restock_status(SaleItemCondition::New), InventoryUnitStatus::Available);
        assert_eq!(restock_status(SaleItemCondition::Opened), InventoryUnitStatus::Available);
        assert_eq!(restock_status(SaleItemCondition::Used), InventoryUnitStatus::AvailableUsed);
        assert_eq!(
            restock_status(SaleItemCondition::Damaged),
            InventoryUnitStatus::RequiresInspection
        );
    }
}
