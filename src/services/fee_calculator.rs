//! Pure fee arithmetic for rentals: late fees, damage fees, fee totals netted
//! against deposits, extension estimates and partial-return proration.
//!
//! Nothing in here touches the database; callers load the rental and the
//! lifecycle's accumulated fees and pass them in.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ReturnPolicyConfig;
use crate::entities::transaction_header;
use crate::errors::ServiceError;
use crate::models::{DamageSeverity, RentalPeriodUnit};

/// Rounds a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    /// Fraction of the daily amount charged per day late
    pub late_fee_rate: Decimal,
    /// Cap on the late fee, in multiples of the daily amount
    pub max_late_fee_multiplier: Decimal,
    pub extension_fee_rate: Decimal,
    pub default_cleaning_fee: Decimal,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            late_fee_rate: dec!(0.05),
            max_late_fee_multiplier: dec!(3),
            extension_fee_rate: dec!(0.10),
            default_cleaning_fee: dec!(25),
        }
    }
}

impl From<&ReturnPolicyConfig> for FeePolicy {
    fn from(cfg: &ReturnPolicyConfig) -> Self {
        Self {
            late_fee_rate: cfg.late_fee_rate,
            max_late_fee_multiplier: cfg.max_late_fee_multiplier,
            extension_fee_rate: cfg.extension_fee_rate,
            default_cleaning_fee: cfg.default_cleaning_fee,
        }
    }
}

/// The parts of a rental header fee arithmetic depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct RentalTerms {
    pub total_amount: Decimal,
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub rental_period: Option<i32>,
    pub rental_period_unit: Option<RentalPeriodUnit>,
}

impl From<&transaction_header::Model> for RentalTerms {
    fn from(header: &transaction_header::Model) -> Self {
        Self {
            total_amount: header.total_amount,
            rental_start_date: header.rental_start_date,
            rental_end_date: header.rental_end_date,
            rental_period: header.rental_period,
            rental_period_unit: header.rental_period_unit,
        }
    }
}

impl RentalTerms {
    fn duration_days(&self) -> Option<i64> {
        match (self.rental_start_date, self.rental_end_date) {
            (Some(start), Some(end)) if end > start => Some((end - start).num_days()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LateFeeCalculation {
    pub days_overdue: i64,
    pub daily_rental_amount: Decimal,
    pub late_fee_rate: Decimal,
    /// `daily × rate × days` before the cap
    pub uncapped_fee: Decimal,
    pub max_late_fee: Decimal,
    pub late_fee_amount: Decimal,
    pub is_capped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DamageFee {
    pub damage_fee: Decimal,
    pub cleaning_fee: Decimal,
    pub replacement_required: bool,
    pub total: Decimal,
}

/// Fees already recorded on a rental lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccumulatedFees {
    pub late: Decimal,
    pub damage: Decimal,
    pub other: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalFeeSummary {
    pub as_of: NaiveDate,
    pub days_overdue: i64,
    pub daily_rental_amount: Decimal,
    pub accumulated_late_fees: Decimal,
    /// Late fee owed on top of what the lifecycle already accumulated
    pub new_late_fees: Decimal,
    pub damage_fees: Decimal,
    pub other_fees: Decimal,
    pub total_fees: Decimal,
    pub deposit_amount: Decimal,
    pub customer_advance_balance: Decimal,
    pub total_credit: Decimal,
    pub amount_due: Decimal,
    pub refund_due: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtensionEstimate {
    pub current_end_date: NaiveDate,
    pub new_end_date: NaiveDate,
    pub extension_days: i64,
    pub daily_rate: Decimal,
    pub extension_cost: Decimal,
    pub extension_fee: Decimal,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    policy: FeePolicy,
}

impl FeeCalculator {
    pub fn new(policy: FeePolicy) -> Self {
        Self { policy }
    }

    /// Daily rental amount derived from the period unit, rounded to cents.
    pub fn daily_rental_amount(&self, terms: &RentalTerms) -> Decimal {
        let total = terms.total_amount;
        let by_period = match (terms.rental_period, terms.rental_period_unit) {
            (Some(period), Some(unit)) if period > 0 => {
                let period = Decimal::from(period);
                Some(match unit {
                    RentalPeriodUnit::Day => total / period,
                    RentalPeriodUnit::Week => total / (period * dec!(7)),
                    RentalPeriodUnit::Month => total / (period * dec!(30)),
                    RentalPeriodUnit::Hour => total * dec!(24) / period,
                })
            }
            _ => None,
        };

        let daily = by_period.unwrap_or_else(|| match terms.duration_days() {
            Some(days) => total / Decimal::from(days),
            None => total,
        });
        round_money(daily)
    }

    pub fn calculate_late_fee(&self, terms: &RentalTerms, as_of: NaiveDate) -> LateFeeCalculation {
        let days_overdue = terms
            .rental_end_date
            .map(|end| (as_of - end).num_days().max(0))
            .unwrap_or(0);
        let daily = self.daily_rental_amount(terms);
        let max_fee = daily * self.policy.max_late_fee_multiplier;
        // A product past Decimal::MAX is certainly above the cap.
        let uncapped = (daily * self.policy.late_fee_rate)
            .checked_mul(Decimal::from(days_overdue))
            .map(round_money)
            .unwrap_or(Decimal::MAX);
        let is_capped = uncapped > max_fee;

        LateFeeCalculation {
            days_overdue,
            daily_rental_amount: daily,
            late_fee_rate: self.policy.late_fee_rate,
            uncapped_fee: uncapped,
            max_late_fee: max_fee,
            late_fee_amount: if is_capped { max_fee } else { uncapped },
            is_capped,
        }
    }

    /// Damage and cleaning fee for one line. `custom_amount` replaces the formula.
    pub fn calculate_damage_fee(
        &self,
        severity: DamageSeverity,
        item_value: Decimal,
        replacement_cost: Option<Decimal>,
        custom_amount: Option<Decimal>,
    ) -> DamageFee {
        if let Some(custom) = custom_amount {
            return DamageFee {
                damage_fee: custom,
                cleaning_fee: Decimal::ZERO,
                replacement_required: severity == DamageSeverity::TotalLoss,
                total: custom,
            };
        }

        let cleaning = self.policy.default_cleaning_fee;
        let (damage_fee, cleaning_fee) = match severity {
            DamageSeverity::Minor => (Decimal::ZERO, cleaning),
            DamageSeverity::Moderate => (round_money(item_value * dec!(0.25)), cleaning),
            DamageSeverity::Major => (round_money(item_value * dec!(0.50)), cleaning * dec!(2)),
            DamageSeverity::TotalLoss => (replacement_cost.unwrap_or(item_value), Decimal::ZERO),
        };

        DamageFee {
            damage_fee,
            cleaning_fee,
            replacement_required: severity == DamageSeverity::TotalLoss,
            total: damage_fee + cleaning_fee,
        }
    }

    /// Accumulated fees plus any late-fee delta, netted against deposit and advance balance.
    pub fn calculate_total_fees(
        &self,
        terms: &RentalTerms,
        accumulated: AccumulatedFees,
        deposit_amount: Decimal,
        customer_advance_balance: Decimal,
        as_of: NaiveDate,
    ) -> RentalFeeSummary {
        let late = self.calculate_late_fee(terms, as_of);
        let new_late_fees = (late.late_fee_amount - accumulated.late).max(Decimal::ZERO);
        let total_fees = accumulated.late + new_late_fees + accumulated.damage + accumulated.other;
        let total_credit = deposit_amount + customer_advance_balance;

        RentalFeeSummary {
            as_of,
            days_overdue: late.days_overdue,
            daily_rental_amount: late.daily_rental_amount,
            accumulated_late_fees: accumulated.late,
            new_late_fees,
            damage_fees: accumulated.damage,
            other_fees: accumulated.other,
            total_fees,
            deposit_amount,
            customer_advance_balance,
            total_credit,
            amount_due: (total_fees - total_credit).max(Decimal::ZERO),
            refund_due: (total_credit - total_fees).max(Decimal::ZERO),
        }
    }

    pub fn estimate_extension(
        &self,
        terms: &RentalTerms,
        new_end_date: NaiveDate,
    ) -> Result<ExtensionEstimate, ServiceError> {
        let current_end_date = terms.rental_end_date.ok_or_else(|| {
            ServiceError::ValidationError("Rental has no end date to extend".to_string())
        })?;
        if new_end_date <= current_end_date {
            return Err(ServiceError::ValidationError(
                "New end date must be after current end date".to_string(),
            ));
        }

        let extension_days = (new_end_date - current_end_date).num_days();
        let daily_rate = self.daily_rental_amount(terms);
        let too_large = || {
            ServiceError::ValidationError(format!(
                "Extension to {} is too large to price",
                new_end_date
            ))
        };
        let extension_cost = daily_rate
            .checked_mul(Decimal::from(extension_days))
            .ok_or_else(too_large)?;
        let extension_fee = extension_cost
            .checked_mul(self.policy.extension_fee_rate)
            .map(round_money)
            .ok_or_else(too_large)?;
        let total_cost = extension_cost.checked_add(extension_fee).ok_or_else(too_large)?;

        Ok(ExtensionEstimate {
            current_end_date,
            new_end_date,
            extension_days,
            daily_rate,
            extension_cost,
            extension_fee,
            total_cost,
        })
    }
}

/// Prorates a late fee by the share of value still out on rent.
pub fn adjust_late_fee_for_partial_return(
    late_fee: Decimal,
    returned_value: Decimal,
    original_value: Decimal,
) -> Decimal {
    if original_value <= Decimal::ZERO {
        return late_fee;
    }
    let returned_share = (returned_value / original_value).clamp(Decimal::ZERO, Decimal::ONE);
    round_money(late_fee * (Decimal::ONE - returned_share))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ten_day_rental(total: Decimal) -> RentalTerms {
        RentalTerms {
            total_amount: total,
            rental_start_date: Some(date(2024, 3, 1)),
            rental_end_date: Some(date(2024, 3, 11)),
            rental_period: Some(10),
            rental_period_unit: Some(RentalPeriodUnit::Day),
        }
    }

    #[test]
    fn three_days_late_on_thousand_dollar_rental() {
        let calc = FeeCalculator::default();
        let fee = calc.calculate_late_fee(&ten_day_rental(dec!(1000)), date(2024, 3, 14));

        assert_eq!(fee.days_overdue, 3);
        assert_eq!(fee.daily_rental_amount, dec!(100));
        assert_eq!(fee.late_fee_amount, dec!(15.00));
        assert!(!fee.is_capped);
    }

    #[test]
    fn late_fee_is_capped_at_multiplier() {
        let calc = FeeCalculator::default();
        let fee = calc.calculate_late_fee(&ten_day_rental(dec!(1000)), date(2024, 6, 1));

        assert_eq!(fee.max_late_fee, dec!(300));
        assert_eq!(fee.late_fee_amount, dec!(300));
        assert!(fee.is_capped);
    }

    #[test]
    fn returned_early_has_no_late_fee() {
        let calc = FeeCalculator::default();
        let fee = calc.calculate_late_fee(&ten_day_rental(dec!(1000)), date(2024, 3, 5));
        assert_eq!(fee.days_overdue, 0);
        assert_eq!(fee.late_fee_amount, Decimal::ZERO);
    }

    #[rstest]
    #[case(RentalPeriodUnit::Day, 10, dec!(1400), dec!(140))]
    #[case(RentalPeriodUnit::Week, 2, dec!(1400), dec!(100))]
    #[case(RentalPeriodUnit::Month, 1, dec!(900), dec!(30))]
    #[case(RentalPeriodUnit::Hour, 48, dec!(96), dec!(48))]
    fn daily_amount_by_period_unit(
        #[case] unit: RentalPeriodUnit,
        #[case] period: i32,
        #[case] total: Decimal,
        #[case] expected: Decimal,
    ) {
        let terms = RentalTerms {
            total_amount: total,
            rental_start_date: None,
            rental_end_date: None,
            rental_period: Some(period),
            rental_period_unit: Some(unit),
        };
        assert_eq!(FeeCalculator::default().daily_rental_amount(&terms), expected);
    }

    #[test]
    fn daily_amount_falls_back_to_duration_then_total() {
        let calc = FeeCalculator::default();
        let mut terms = ten_day_rental(dec!(500));
        terms.rental_period = None;
        assert_eq!(calc.daily_rental_amount(&terms), dec!(50));

        terms.rental_start_date = None;
        assert_eq!(calc.daily_rental_amount(&terms), dec!(500));
    }

    #[test]
    fn daily_amount_is_rounded_to_cents() {
        let terms = RentalTerms {
            total_amount: dec!(100),
            rental_start_date: None,
            rental_end_date: None,
            rental_period: Some(3),
            rental_period_unit: Some(RentalPeriodUnit::Day),
        };
        assert_eq!(FeeCalculator::default().daily_rental_amount(&terms), dec!(33.33));
    }

    #[rstest]
    #[case(DamageSeverity::Minor, dec!(0), dec!(25))]
    #[case(DamageSeverity::Moderate, dec!(100), dec!(25))]
    #[case(DamageSeverity::Major, dec!(200), dec!(50))]
    #[case(DamageSeverity::TotalLoss, dec!(650), dec!(0))]
    fn damage_fee_by_severity(
        #[case] severity: DamageSeverity,
        #[case] damage: Decimal,
        #[case] cleaning: Decimal,
    ) {
        let fee =
            FeeCalculator::default().calculate_damage_fee(severity, dec!(400), Some(dec!(650)), None);
        assert_eq!(fee.damage_fee, damage);
        assert_eq!(fee.cleaning_fee, cleaning);
        assert_eq!(fee.total, damage + cleaning);
        assert_eq!(fee.replacement_required, severity == DamageSeverity::TotalLoss);
    }

    #[test]
    fn custom_damage_amount_overrides_formula() {
        let fee = FeeCalculator::default().calculate_damage_fee(
            DamageSeverity::Major,
            dec!(400),
            None,
            Some(dec!(42)),
        );
        assert_eq!(fee.total, dec!(42));
        assert_eq!(fee.cleaning_fee, Decimal::ZERO);
    }

    #[test]
    fn total_fees_only_count_new_late_delta() {
        let calc = FeeCalculator::default();
        let summary = calc.calculate_total_fees(
            &ten_day_rental(dec!(1000)),
            AccumulatedFees {
                late: dec!(10),
                damage: dec!(40),
                other: dec!(5),
            },
            dec!(50),
            dec!(0),
            date(2024, 3, 14),
        );

        assert_eq!(summary.new_late_fees, dec!(5));
        assert_eq!(summary.total_fees, dec!(60));
        assert_eq!(summary.amount_due, dec!(10));
        assert_eq!(summary.refund_due, Decimal::ZERO);
    }

    #[test]
    fn deposit_larger_than_fees_yields_refund() {
        let calc = FeeCalculator::default();
        let summary = calc.calculate_total_fees(
            &ten_day_rental(dec!(1000)),
            AccumulatedFees::default(),
            dec!(200),
            dec!(25),
            date(2024, 3, 12),
        );
        assert_eq!(summary.total_fees, dec!(5));
        assert_eq!(summary.refund_due, dec!(220));
        assert_eq!(summary.amount_due, Decimal::ZERO);
    }

    #[test]
    fn extension_adds_ten_percent_fee() {
        let est = FeeCalculator::default()
            .estimate_extension(&ten_day_rental(dec!(1000)), date(2024, 3, 16))
            .unwrap();
        assert_eq!(est.extension_days, 5);
        assert_eq!(est.extension_cost, dec!(500));
        assert_eq!(est.extension_fee, dec!(50));
        assert_eq!(est.total_cost, dec!(550));
    }

    #[test]
    fn huge_amounts_cap_or_reject_instead_of_overflowing() {
        let calc = FeeCalculator::default();
        let mut terms = ten_day_rental(dec!(10000000000000000000000000));
        terms.rental_period = Some(1);
        terms.rental_period_unit = Some(RentalPeriodUnit::Hour);

        let far = date(200000, 1, 1);
        let fee = calc.calculate_late_fee(&terms, far);
        assert!(fee.is_capped);
        assert_eq!(fee.late_fee_amount, fee.max_late_fee);

        let err = calc.estimate_extension(&terms, far).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("too large to price"));
    }

    #[test]
    fn extension_must_move_end_date_forward() {
        let err = FeeCalculator::default()
            .estimate_extension(&ten_day_rental(dec!(1000)), date(2024, 3, 11))
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("after current end date"));
    }

    #[rstest]
    #[case(dec!(30), dec!(50), dec!(100), dec!(15))]
    #[case(dec!(30), dec!(100), dec!(100), dec!(0))]
    #[case(dec!(30), dec!(0), dec!(100), dec!(30))]
    #[case(dec!(30), dec!(10), dec!(0), dec!(30))]
    fn partial_return_prorates_late_fee(
        #[case] late_fee: Decimal,
        #[case] returned: Decimal,
        #[case] original: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(
            adjust_late_fee_for_partial_return(late_fee, returned, original),
            expected
        );
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(7.125)), dec!(7.13));
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
    }
}
