use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::{returned_value, validate_lines, ReturnContext, ReturnProcessor, ValidationOutcome};
use crate::{
    config::ReturnPolicyConfig,
    entities::transaction_header::{self, Entity as TransactionHeader},
    errors::ServiceError,
    events::Event,
    models::{
        CleaningLevel, FinancialBreakdown, RentalItemCondition, RentalReturnDetails,
        RentalReturnLine, RentalStatus, ReturnEventType, ReturnFinancials, ReturnedItem,
        TransactionStatus, TransactionType,
    },
    services::{
        fee_calculator::{round_money, AccumulatedFees},
        inventory::{line_location, release_from_rent_or_queue, InventoryLedger, RentalStockRelease},
        rental_lifecycle::{
            add_lifecycle_fees, ensure_lifecycle, record_event, restock_status_for,
            transition_lifecycle, NewReturnEvent,
        },
        transactions::{load_lines, set_line_rental_status},
    },
};

/// Days in the month used to derive a daily rate from the rental total.
const DAYS_PER_MONTH: i64 = 30;

/// Full check-in of a rental through the unified return flow.
pub struct RentalReturnProcessor<'a> {
    details: &'a RentalReturnDetails,
    policy: &'a ReturnPolicyConfig,
    ledger: &'a dyn InventoryLedger,
}

impl<'a> RentalReturnProcessor<'a> {
    pub fn new(
        details: &'a RentalReturnDetails,
        policy: &'a ReturnPolicyConfig,
        ledger: &'a dyn InventoryLedger,
    ) -> Self {
        Self {
            details,
            policy,
            ledger,
        }
    }

    fn damage_fee(&self, line: &RentalReturnLine) -> Decimal {
        let mut fee = match line.condition {
            RentalItemCondition::Damaged => line
                .repair_cost_estimate
                .unwrap_or(self.policy.damaged_item_fee),
            RentalItemCondition::Poor => self.policy.poor_condition_fee,
            _ => Decimal::ZERO,
        };
        if line.beyond_normal_wear {
            fee += self.policy.beyond_normal_wear_fee;
        }
        fee + self.policy.missing_accessory_fee * Decimal::from(line.missing_accessories.len())
    }

    fn cleaning_fee(&self) -> Decimal {
        if let Some(explicit) = self.details.cleaning_fee {
            return explicit;
        }
        self.details
            .lines
            .iter()
            .filter_map(|l| l.cleaning_required)
            .map(|level| match level {
                CleaningLevel::Major => self.policy.major_cleaning_fee,
                CleaningLevel::Minor => self.policy.minor_cleaning_fee,
            })
            .sum()
    }

    fn days_late(&self, ctx: &ReturnContext<'_>) -> i64 {
        ctx.original
            .rental_end_date
            .map(|end| (ctx.return_date - end).num_days().max(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl<'a> ReturnProcessor for RentalReturnProcessor<'a> {
    fn validate_return(&self, ctx: &ReturnContext<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        if ctx.original.transaction_type != TransactionType::Rental {
            outcome.error(format!(
                "Original transaction {} is not a rental",
                ctx.original.transaction_number
            ));
        }

        let line_errors = validate_lines(&self.details.lines, ctx);
        let lines_ok = line_errors.is_empty();
        outcome.errors.extend(line_errors);

        if lines_ok {
            let mut returned: HashMap<Uuid, i32> = HashMap::new();
            for line in &self.details.lines {
                *returned.entry(line.original_line_id).or_default() += line.return_quantity;
            }
            let incomplete = ctx.original_lines.iter().any(|l| {
                l.remaining_quantity() > 0
                    && returned.get(&l.id).copied().unwrap_or(0) != l.remaining_quantity()
            });
            if incomplete {
                outcome.error("All rental items must be returned");
            }
        }

        if self.policy.require_damage_photos {
            for line in &self.details.lines {
                if line.condition.needs_photos() && line.photos.is_empty() {
                    outcome.error(format!(
                        "Photos are required for line {} returned in {} condition",
                        line.original_line_id, line.condition
                    ));
                }
            }
        }

        for line in &self.details.lines {
            if let Some(estimate) = line.repair_cost_estimate {
                outcome.check_amount("Repair cost estimate", estimate);
            }
        }
        if let Some(fee) = self.details.late_fee {
            outcome.check_amount("Late fee", fee);
        }
        if let Some(fee) = self.details.cleaning_fee {
            outcome.check_amount("Cleaning fee", fee);
        }

        if self.days_late(ctx) > 0 {
            outcome.warn(format!("Rental returned {} days late", self.days_late(ctx)));
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
        for line in &self.details.lines {
            let Some(original) = ctx.line(line.original_line_id) else {
                continue;
            };
            let release = RentalStockRelease {
                reference_id: return_id,
                transaction_line_id: original.id,
                item_id: original.item_id,
                location_id: line_location(original, ctx.original),
                inventory_unit_id: original.inventory_unit_id,
                quantity: line.return_quantity,
                target_status: restock_status_for(line.condition, line.cleaning_required.is_some()),
                condition: Some(line.condition.to_string()),
            };
            if let Some(event) = release_from_rent_or_queue(self.ledger, txn, release).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn calculate_financials(&self, ctx: &ReturnContext<'_>) -> ReturnFinancials {
        let late_fee_days = self.days_late(ctx);
        let late_fee = match self.details.late_fee {
            Some(explicit) => explicit,
            None => round_money(
                Decimal::from(late_fee_days)
                    * self.policy.rental_processor_late_rate
                    * ctx.original.total_amount
                    / Decimal::from(DAYS_PER_MONTH),
            ),
        };
        let damage_fee: Decimal = self.details.lines.iter().map(|l| self.damage_fee(l)).sum();
        let cleaning_fee = self.cleaning_fee();

        let total_deductions = late_fee + damage_fee + cleaning_fee;
        let deposit_amount = ctx.original.deposit_amount;
        let deposit_refund = (deposit_amount - total_deductions).max(Decimal::ZERO);
        let amount_due = (total_deductions - deposit_amount).max(Decimal::ZERO);

        ReturnFinancials {
            return_value: returned_value(&self.details.lines, ctx),
            estimated_refund: deposit_refund,
            estimated_fees: total_deductions,
            breakdown: FinancialBreakdown::Rental {
                late_fee_days,
                late_fee,
                damage_fee,
                cleaning_fee,
                total_deductions,
                deposit_amount,
                deposit_refund,
                amount_due,
            },
        }
    }

    /// Closes the rental: lines and lifecycle to COMPLETED, fees onto the
    /// lifecycle totals, original marked completed.
    async fn post_process(
        &self,
        txn: &DatabaseTransaction,
        ctx: &ReturnContext<'_>,
        return_id: Uuid,
        financials: &ReturnFinancials,
    ) -> Result<Vec<Event>, ServiceError> {
        let (late, damage, cleaning) = match financials.breakdown {
            FinancialBreakdown::Rental {
                late_fee,
                damage_fee,
                cleaning_fee,
                ..
            } => (late_fee, damage_fee, cleaning_fee),
            _ => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        };

        let lines = load_lines(txn, ctx.original.id).await?;
        let mut lifecycle = ensure_lifecycle(txn, ctx.original, &lines).await?;
        for line in lines
            .iter()
            .filter(|l| l.rental_status != Some(RentalStatus::Completed))
        {
            set_line_rental_status(txn, line, RentalStatus::Completed, None).await?;
        }

        let mut events = Vec::new();
        let from = lifecycle.current_status;
        if from != RentalStatus::Completed {
            lifecycle =
                transition_lifecycle(txn, &lifecycle, RentalStatus::Completed, ctx.processed_by)
                    .await?;
            events.push(Event::RentalStatusChanged {
                transaction_id: ctx.original.id,
                from,
                to: RentalStatus::Completed,
            });
        }

        let returned_event = record_event(
            txn,
            &lifecycle,
            NewReturnEvent {
                event_type: ReturnEventType::FullReturn,
                event_date: ctx.return_date,
                processed_by: ctx.processed_by,
                items: self
                    .details
                    .lines
                    .iter()
                    .map(|l| ReturnedItem {
                        line_id: l.original_line_id,
                        quantity: l.return_quantity,
                        condition: Some(l.condition),
                    })
                    .collect(),
                late_fees: late,
                other_fees: damage + cleaning,
                new_return_date: None,
                extension_reason: None,
                notes: Some(format!("Return {}", return_id)),
            },
        )
        .await?;
        add_lifecycle_fees(
            txn,
            &lifecycle,
            AccumulatedFees {
                late,
                damage,
                other: cleaning,
            },
            Some(ctx.return_date),
        )
        .await?;

        TransactionHeader::update_many()
            .col_expr(
                transaction_header::Column::Status,
                Expr::value(TransactionStatus::Completed),
            )
            .col_expr(transaction_header::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transaction_header::Column::Id.eq(ctx.original.id))
            .exec(txn)
            .await?;

        info!(
            transaction_id = %ctx.original.id,
            return_id = %return_id,
            "Rental closed by return"
        );
        events.push(Event::RentalReturnRecorded {
            transaction_id: ctx.original.id,
            event_id: returned_event.id,
            event_type: ReturnEventType::FullReturn,
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::services::inventory::SeaOrmInventoryLedger;
    use rust_decimal_macros::dec;

    fn rental_line(id: Uuid, qty: i32, condition: RentalItemCondition) -> RentalReturnLine {
        RentalReturnLine {
            original_line_id: id,
            return_quantity: qty,
            condition,
            damage_description: None,
            photos: Vec::new(),
            cleaning_required: None,
            beyond_normal_wear: false,
            missing_accessories: Vec::new(),
            repair_cost_estimate: None,
        }
    }

    fn details(lines: Vec<RentalReturnLine>) -> RentalReturnDetails {
        RentalReturnDetails {
            lines,
            late_fee: None,
            cleaning_fee: None,
            inspector_id: None,
        }
    }

    fn rental_header() -> crate::entities::transaction_header::Model {
        let mut h = header(TransactionType::Rental, TransactionStatus::InProgress, date(2024, 3, 1));
        h.rental_start_date = Some(date(2024, 3, 1));
        h.rental_end_date = Some(date(2024, 3, 10));
        h.total_amount = dec!(300);
        h.deposit_amount = dec!(250);
        h
    }

    #[test]
    fn partial_coverage_is_rejected() {
        let header = rental_header();
        let a = line(&header, 2, dec!(100));
        let b = line(&header, 1, dec!(100));
        let lines = vec![a.clone(), b.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(vec![rental_line(a.id, 2, RentalItemCondition::Good)]);
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 10)));
        assert_eq!(outcome.errors, vec!["All rental items must be returned".to_string()]);
    }

    #[test]
    fn damaged_items_need_photos_when_configured() {
        let header = rental_header();
        let a = line(&header, 1, dec!(100));
        let lines = vec![a.clone()];
        let mut policy = ReturnPolicyConfig::default();
        let details = details(vec![rental_line(a.id, 1, RentalItemCondition::Damaged)]);

        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);
        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 10)));
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("Photos are required"));

        policy.require_damage_photos = false;
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);
        assert!(processor
            .validate_return(&ctx(&header, &lines, date(2024, 3, 10)))
            .is_valid());
    }

    #[test]
    fn late_damaged_return_exceeding_deposit() {
        let header = rental_header();
        let a = line(&header, 1, dec!(150));
        let b = line(&header, 1, dec!(150));
        let lines = vec![a.clone(), b.clone()];
        let policy = ReturnPolicyConfig::default();
        let mut damaged = rental_line(a.id, 1, RentalItemCondition::Damaged);
        damaged.beyond_normal_wear = true;
        damaged.missing_accessories = vec!["charger".into()];
        let mut dirty = rental_line(b.id, 1, RentalItemCondition::Fair);
        dirty.cleaning_required = Some(CleaningLevel::Major);
        let details = details(vec![damaged, dirty]);
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 13)));
        assert_eq!(
            financials.breakdown,
            FinancialBreakdown::Rental {
                late_fee_days: 3,
                late_fee: dec!(3.00),
                damage_fee: dec!(275),
                cleaning_fee: dec!(75),
                total_deductions: dec!(353.00),
                deposit_amount: dec!(250),
                deposit_refund: dec!(0),
                amount_due: dec!(103.00),
            }
        );
        assert_eq!(financials.estimated_refund, Decimal::ZERO);
    }

    #[test]
    fn on_time_clean_return_refunds_full_deposit() {
        let header = rental_header();
        let a = line(&header, 1, dec!(300));
        let lines = vec![a.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(vec![rental_line(a.id, 1, RentalItemCondition::Excellent)]);
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 9)));
        assert_eq!(financials.estimated_refund, dec!(250));
        assert_eq!(financials.estimated_fees, Decimal::ZERO);
    }

    #[test]
    fn explicit_fees_override_computed_ones() {
        let header = rental_header();
        let a = line(&header, 1, dec!(300));
        let lines = vec![a.clone()];
        let policy = ReturnPolicyConfig::default();
        let mut line = rental_line(a.id, 1, RentalItemCondition::Poor);
        line.cleaning_required = Some(CleaningLevel::Minor);
        let mut details = details(vec![line]);
        details.late_fee = Some(dec!(40));
        details.cleaning_fee = Some(dec!(10));
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let financials = processor.calculate_financials(&ctx(&header, &lines, date(2024, 3, 20)));
        assert_eq!(financials.estimated_fees, dec!(150));
        assert_eq!(financials.estimated_refund, dec!(100));
    }

    #[test]
    fn out_of_range_explicit_fees_are_rejected() {
        let header = rental_header();
        let a = line(&header, 1, dec!(300));
        let lines = vec![a.clone()];
        let policy = ReturnPolicyConfig::default();
        let mut line = rental_line(a.id, 1, RentalItemCondition::Good);
        line.repair_cost_estimate = Some(dec!(-1));
        let mut details = details(vec![line]);
        details.late_fee = Some(dec!(1000000000000000.01));
        details.cleaning_fee = Some(dec!(-0.01));
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 9)));
        assert_eq!(outcome.errors.len(), 3, "{:?}", outcome.errors);
        assert!(outcome.errors[0].starts_with("Repair cost estimate must be between 0 and"));
        assert!(outcome.errors[1].starts_with("Late fee must be between 0 and"));
        assert!(outcome.errors[2].starts_with("Cleaning fee must be between 0 and"));
    }

    #[test]
    fn non_rental_original_is_rejected() {
        let header = header(TransactionType::Sale, TransactionStatus::Completed, date(2024, 3, 1));
        let a = line(&header, 1, dec!(300));
        let lines = vec![a.clone()];
        let policy = ReturnPolicyConfig::default();
        let details = details(vec![rental_line(a.id, 1, RentalItemCondition::Good)]);
        let processor = RentalReturnProcessor::new(&details, &policy, &SeaOrmInventoryLedger);

        let outcome = processor.validate_return(&ctx(&header, &lines, date(2024, 3, 2)));
        assert!(outcome.errors[0].contains("is not a rental"));
    }
}
