//! Rental lifecycle: status aggregation over lines, the validated status
//! machine, return events, inspections, extensions and overdue detection.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, DbPool},
    entities::{
        rental_item_inspection::{self, Entity as RentalItemInspection},
        rental_lifecycle::{self, Entity as RentalLifecycle},
        rental_return_event::{self, Entity as RentalReturnEvent},
        transaction_header::{self, Entity as TransactionHeader},
        transaction_line,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        rental::{
            CompleteReturnEventRequest, ExtendRentalRequest, InspectionRequest,
            RentalReturnRequest, UpdateRentalStatusRequest,
        },
        DamageSeverity, InventoryUnitStatus, RentalItemCondition, RentalStatus, ReturnEventType,
        ReturnedItem, TransactionStatus, TransactionType,
    },
    services::{
        fee_calculator::{
            adjust_late_fee_for_partial_return, round_money, AccumulatedFees, ExtensionEstimate,
            FeeCalculator, RentalFeeSummary, RentalTerms,
        },
        inventory::{line_location, release_from_rent_or_queue, InventoryLedger, RentalStockRelease},
        transactions::{
            load_header, load_lines, load_lines_for_update, record_returned_quantity,
            set_line_rental_status,
        },
    },
};

/// Rental view derived from the lines of a rental transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalAggregate {
    pub rental_start_date: Option<NaiveDate>,
    pub rental_end_date: Option<NaiveDate>,
    pub current_rental_status: Option<RentalStatus>,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

/// Combines per-line statuses into one rental status.
///
/// Lateness dominates, then partial returns; COMPLETED only when every line
/// is completed.
pub fn aggregate_status<I>(statuses: I) -> Option<RentalStatus>
where
    I: IntoIterator<Item = RentalStatus>,
{
    let statuses: Vec<RentalStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return None;
    }
    let any = |s: RentalStatus| statuses.contains(&s);

    let status = if any(RentalStatus::Late) || any(RentalStatus::LatePartialReturn) {
        if any(RentalStatus::PartialReturn) || any(RentalStatus::LatePartialReturn) {
            RentalStatus::LatePartialReturn
        } else {
            RentalStatus::Late
        }
    } else if any(RentalStatus::PartialReturn) {
        RentalStatus::PartialReturn
    } else if statuses.iter().all(|s| *s == RentalStatus::Completed) {
        RentalStatus::Completed
    } else if any(RentalStatus::Extended) {
        RentalStatus::Extended
    } else {
        RentalStatus::Active
    };
    Some(status)
}

pub fn aggregate_rental(lines: &[transaction_line::Model], today: NaiveDate) -> RentalAggregate {
    let rental_start_date = lines.iter().filter_map(|l| l.rental_start_date).min();
    let rental_end_date = lines.iter().filter_map(|l| l.rental_end_date).max();
    let days_overdue = rental_end_date
        .filter(|end| *end < today)
        .map(|end| (today - end).num_days())
        .unwrap_or(0);

    RentalAggregate {
        rental_start_date,
        rental_end_date,
        current_rental_status: aggregate_status(lines.iter().filter_map(|l| l.rental_status)),
        is_overdue: days_overdue > 0,
        days_overdue,
    }
}

/// Stock status a returned rental unit goes back to.
pub fn restock_status_for(condition: RentalItemCondition, needs_cleaning: bool) -> InventoryUnitStatus {
    match condition {
        RentalItemCondition::Excellent | RentalItemCondition::Good => InventoryUnitStatus::Available,
        RentalItemCondition::Fair if needs_cleaning => InventoryUnitStatus::RequiresCleaning,
        RentalItemCondition::Fair => InventoryUnitStatus::Available,
        RentalItemCondition::Poor | RentalItemCondition::Damaged => {
            InventoryUnitStatus::RequiresInspection
        }
    }
}

pub fn ensure_rental(header: &transaction_header::Model) -> Result<(), ServiceError> {
    if header.transaction_type != TransactionType::Rental {
        return Err(ServiceError::ValidationError(format!(
            "Transaction {} is not a rental",
            header.transaction_number
        )));
    }
    Ok(())
}

/// Returns the lifecycle of a rental, creating it from the lines on first use.
pub async fn ensure_lifecycle<C: ConnectionTrait>(
    conn: &C,
    header: &transaction_header::Model,
    lines: &[transaction_line::Model],
) -> Result<rental_lifecycle::Model, ServiceError> {
    if let Some(existing) = RentalLifecycle::find()
        .filter(rental_lifecycle::Column::TransactionId.eq(header.id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let aggregate = aggregate_rental(lines, now.date_naive());
    let lifecycle = rental_lifecycle::ActiveModel {
        id: Set(Uuid::new_v4()),
        transaction_id: Set(header.id),
        current_status: Set(aggregate.current_rental_status.unwrap_or(RentalStatus::Active)),
        last_status_change: Set(now),
        status_changed_by: Set(None),
        expected_return_date: Set(aggregate.rental_end_date.or(header.rental_end_date)),
        actual_return_date: Set(None),
        total_late_fees: Set(Decimal::ZERO),
        total_damage_fees: Set(Decimal::ZERO),
        total_other_fees: Set(Decimal::ZERO),
        notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match lifecycle.insert(conn).await {
        Ok(model) => {
            info!(transaction_id = %header.id, status = %model.current_status, "Rental lifecycle created");
            Ok(model)
        }
        // Another request created it first.
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            RentalLifecycle::find()
                .filter(rental_lifecycle::Column::TransactionId.eq(header.id))
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Rental lifecycle for", header.id))
        }
        Err(err) => Err(err.into()),
    }
}

/// Moves a lifecycle to `to` after checking the transition table.
///
/// The write is conditional on the status read, so a concurrent change
/// surfaces as `ConcurrentModification`.
pub async fn transition_lifecycle(
    txn: &DatabaseTransaction,
    lifecycle: &rental_lifecycle::Model,
    to: RentalStatus,
    changed_by: Option<Uuid>,
) -> Result<rental_lifecycle::Model, ServiceError> {
    let from = lifecycle.current_status;
    from.ensure_transition(to)?;

    let now = Utc::now();
    let result = RentalLifecycle::update_many()
        .col_expr(rental_lifecycle::Column::CurrentStatus, Expr::value(to))
        .col_expr(rental_lifecycle::Column::LastStatusChange, Expr::value(now))
        .col_expr(rental_lifecycle::Column::StatusChangedBy, Expr::value(changed_by))
        .col_expr(rental_lifecycle::Column::UpdatedAt, Expr::value(now))
        .filter(rental_lifecycle::Column::Id.eq(lifecycle.id))
        .filter(rental_lifecycle::Column::CurrentStatus.eq(from))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(lifecycle.id));
    }

    Ok(rental_lifecycle::Model {
        current_status: to,
        last_status_change: now,
        status_changed_by: changed_by,
        updated_at: now,
        ..lifecycle.clone()
    })
}

/// Adds fees to the lifecycle running totals.
pub async fn add_lifecycle_fees(
    txn: &DatabaseTransaction,
    lifecycle: &rental_lifecycle::Model,
    fees: AccumulatedFees,
    actual_return_date: Option<NaiveDate>,
) -> Result<rental_lifecycle::Model, ServiceError> {
    let mut active: rental_lifecycle::ActiveModel = lifecycle.clone().into();
    active.total_late_fees = Set(lifecycle.total_late_fees + fees.late);
    active.total_damage_fees = Set(lifecycle.total_damage_fees + fees.damage);
    active.total_other_fees = Set(lifecycle.total_other_fees + fees.other);
    if actual_return_date.is_some() {
        active.actual_return_date = Set(actual_return_date);
    }
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

/// Fields of a rental return event to insert.
#[derive(Debug, Clone)]
pub struct NewReturnEvent {
    pub event_type: ReturnEventType,
    pub event_date: NaiveDate,
    pub processed_by: Option<Uuid>,
    pub items: Vec<ReturnedItem>,
    pub late_fees: Decimal,
    pub other_fees: Decimal,
    pub new_return_date: Option<NaiveDate>,
    pub extension_reason: Option<String>,
    pub notes: Option<String>,
}

impl NewReturnEvent {
    fn status_change(date: NaiveDate, processed_by: Option<Uuid>, notes: Option<String>) -> Self {
        Self {
            event_type: ReturnEventType::StatusChange,
            event_date: date,
            processed_by,
            items: Vec::new(),
            late_fees: Decimal::ZERO,
            other_fees: Decimal::ZERO,
            new_return_date: None,
            extension_reason: None,
            notes,
        }
    }
}

pub async fn record_event(
    txn: &DatabaseTransaction,
    lifecycle: &rental_lifecycle::Model,
    event: NewReturnEvent,
) -> Result<rental_return_event::Model, ServiceError> {
    let total_quantity_returned = event.items.iter().map(|i| i.quantity).sum();
    Ok(rental_return_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        rental_lifecycle_id: Set(lifecycle.id),
        transaction_id: Set(lifecycle.transaction_id),
        event_type: Set(event.event_type),
        event_date: Set(event.event_date),
        processed_by: Set(event.processed_by),
        items_returned: Set(serde_json::to_string(&event.items)?),
        total_quantity_returned: Set(total_quantity_returned),
        late_fees_charged: Set(event.late_fees),
        damage_fees_charged: Set(Decimal::ZERO),
        other_fees_charged: Set(event.other_fees),
        payment_collected: Set(Decimal::ZERO),
        refund_issued: Set(Decimal::ZERO),
        new_return_date: Set(event.new_return_date),
        extension_reason: Set(event.extension_reason),
        completed_at: Set(None),
        notes: Set(event.notes),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?)
}

/// Writes `status` to every line that is not yet completed.
async fn propagate_to_open_lines(
    txn: &DatabaseTransaction,
    lines: &[transaction_line::Model],
    status: RentalStatus,
    end_date: Option<NaiveDate>,
) -> Result<(), ServiceError> {
    for line in lines
        .iter()
        .filter(|l| l.rental_status.is_some() && l.rental_status != Some(RentalStatus::Completed))
    {
        set_line_rental_status(txn, line, status, end_date).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalStatusView {
    pub transaction_id: Uuid,
    pub transaction_number: String,
    pub lifecycle_id: Uuid,
    /// Status held by the lifecycle
    pub status: RentalStatus,
    pub aggregate: RentalAggregate,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<NaiveDate>,
    pub last_status_change: chrono::DateTime<Utc>,
    pub total_late_fees: Decimal,
    pub total_damage_fees: Decimal,
    pub total_other_fees: Decimal,
    pub total_fees: Decimal,
}

impl RentalStatusView {
    fn new(
        header: &transaction_header::Model,
        lines: &[transaction_line::Model],
        lifecycle: &rental_lifecycle::Model,
        today: NaiveDate,
    ) -> Self {
        Self {
            transaction_id: header.id,
            transaction_number: header.transaction_number.clone(),
            lifecycle_id: lifecycle.id,
            status: lifecycle.current_status,
            aggregate: aggregate_rental(lines, today),
            expected_return_date: lifecycle.expected_return_date,
            actual_return_date: lifecycle.actual_return_date,
            last_status_change: lifecycle.last_status_change,
            total_late_fees: lifecycle.total_late_fees,
            total_damage_fees: lifecycle.total_damage_fees,
            total_other_fees: lifecycle.total_other_fees,
            total_fees: lifecycle.total_fees(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalReturnEventView {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event_type: ReturnEventType,
    pub event_date: NaiveDate,
    pub items: Vec<ReturnedItem>,
    pub total_quantity_returned: i32,
    pub late_fees_charged: Decimal,
    pub damage_fees_charged: Decimal,
    pub other_fees_charged: Decimal,
    pub payment_collected: Decimal,
    pub refund_issued: Decimal,
    pub new_return_date: Option<NaiveDate>,
    pub completed: bool,
    pub notes: Option<String>,
}

impl TryFrom<rental_return_event::Model> for RentalReturnEventView {
    type Error = ServiceError;

    fn try_from(event: rental_return_event::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            items: event.items()?,
            id: event.id,
            transaction_id: event.transaction_id,
            event_type: event.event_type,
            event_date: event.event_date,
            total_quantity_returned: event.total_quantity_returned,
            late_fees_charged: event.late_fees_charged,
            damage_fees_charged: event.damage_fees_charged,
            other_fees_charged: event.other_fees_charged,
            payment_collected: event.payment_collected,
            refund_issued: event.refund_issued,
            new_return_date: event.new_return_date,
            completed: event.completed_at.is_some(),
            notes: event.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InspectionView {
    pub id: Uuid,
    pub return_event_id: Uuid,
    pub transaction_line_id: Uuid,
    pub condition: RentalItemCondition,
    pub has_damage: bool,
    pub damage_severity: Option<DamageSeverity>,
    pub damage_fee_assessed: Decimal,
    pub cleaning_fee_assessed: Decimal,
    pub replacement_required: bool,
    pub return_to_stock: bool,
    pub requires_maintenance: bool,
}

impl From<rental_item_inspection::Model> for InspectionView {
    fn from(m: rental_item_inspection::Model) -> Self {
        Self {
            id: m.id,
            return_event_id: m.return_event_id,
            transaction_line_id: m.transaction_line_id,
            condition: m.condition,
            has_damage: m.has_damage,
            damage_severity: m.damage_severity,
            damage_fee_assessed: m.damage_fee_assessed,
            cleaning_fee_assessed: m.cleaning_fee_assessed,
            replacement_required: m.replacement_required,
            return_to_stock: m.return_to_stock,
            requires_maintenance: m.requires_maintenance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtensionResult {
    pub event_id: Uuid,
    pub status: RentalStatus,
    pub estimate: ExtensionEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverdueMark {
    pub transaction_id: Uuid,
    pub from: RentalStatus,
    pub to: RentalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverdueFailure {
    pub transaction_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverdueScanReport {
    pub as_of: NaiveDate,
    pub scanned: usize,
    pub marked: Vec<OverdueMark>,
    pub skipped: usize,
    pub failures: Vec<OverdueFailure>,
}

#[derive(Clone)]
pub struct RentalLifecycleService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: Arc<dyn InventoryLedger>,
    fees: FeeCalculator,
}

impl RentalLifecycleService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        ledger: Arc<dyn InventoryLedger>,
        fees: FeeCalculator,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            ledger,
            fees,
        }
    }

    async fn load_rental<C: ConnectionTrait>(
        conn: &C,
        transaction_id: Uuid,
    ) -> Result<transaction_header::Model, ServiceError> {
        let header = load_header(conn, transaction_id).await?;
        ensure_rental(&header)?;
        Ok(header)
    }

    /// Aggregated status plus lifecycle fees; creates the lifecycle on first call.
    #[instrument(skip(self))]
    pub async fn get_rental_status(
        &self,
        transaction_id: Uuid,
        today: NaiveDate,
    ) -> Result<RentalStatusView, ServiceError> {
        let (txn, started) = db::begin(&self.db_pool).await?;
        let header = Self::load_rental(&txn, transaction_id).await?;
        let lines = load_lines(&txn, transaction_id).await?;
        let lifecycle = ensure_lifecycle(&txn, &header, &lines).await?;
        db::commit(txn, started).await?;

        Ok(RentalStatusView::new(&header, &lines, &lifecycle, today))
    }

    #[instrument(skip(self, request), fields(to = %request.status))]
    pub async fn update_rental_status(
        &self,
        transaction_id: Uuid,
        request: UpdateRentalStatusRequest,
    ) -> Result<RentalStatusView, ServiceError> {
        request.validate()?;
        let today = Utc::now().date_naive();

        let (txn, started) = db::begin(&self.db_pool).await?;
        let header = Self::load_rental(&txn, transaction_id).await?;
        let lines = load_lines_for_update(&txn, transaction_id).await?;
        let lifecycle = ensure_lifecycle(&txn, &header, &lines).await?;
        let from = lifecycle.current_status;

        let lifecycle =
            transition_lifecycle(&txn, &lifecycle, request.status, request.changed_by).await?;
        record_event(
            &txn,
            &lifecycle,
            NewReturnEvent::status_change(today, request.changed_by, request.notes.clone()),
        )
        .await?;

        if matches!(
            request.status,
            RentalStatus::Active | RentalStatus::Late | RentalStatus::Extended | RentalStatus::Completed
        ) {
            propagate_to_open_lines(&txn, &lines, request.status, None).await?;
        }
        let lines = load_lines(&txn, transaction_id).await?;
        db::commit(txn, started).await?;

        info!(%transaction_id, %from, to = %request.status, "Rental status updated");
        self.event_sender
            .publish_all(vec![Event::RentalStatusChanged {
                transaction_id,
                from,
                to: request.status,
            }])
            .await;

        Ok(RentalStatusView::new(&header, &lines, &lifecycle, today))
    }

    /// Moves every overdue open rental to LATE / LATE_PARTIAL_RETURN.
    ///
    /// Each rental is handled in its own transaction; failures are collected
    /// and never abort the batch.
    #[instrument(skip(self))]
    pub async fn mark_overdue_rentals(
        &self,
        today: NaiveDate,
    ) -> Result<OverdueScanReport, ServiceError> {
        let candidates = TransactionHeader::find()
            .filter(transaction_header::Column::TransactionType.eq(TransactionType::Rental))
            .filter(transaction_header::Column::RentalEndDate.lt(today))
            .filter(
                transaction_header::Column::Status
                    .is_not_in([TransactionStatus::Completed, TransactionStatus::Cancelled]),
            )
            .order_by_asc(transaction_header::Column::RentalEndDate)
            .all(self.db_pool.as_ref())
            .await?;

        let mut report = OverdueScanReport {
            as_of: today,
            scanned: candidates.len(),
            marked: Vec::new(),
            skipped: 0,
            failures: Vec::new(),
        };

        for header in candidates {
            match self.mark_one_overdue(&header, today).await {
                Ok(Some(mark)) => report.marked.push(mark),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(transaction_id = %header.id, error = %e, "Failed to mark rental overdue");
                    report.failures.push(OverdueFailure {
                        transaction_id: header.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            marked = report.marked.len(),
            failed = report.failures.len(),
            "Overdue rental scan finished"
        );
        Ok(report)
    }

    async fn mark_one_overdue(
        &self,
        header: &transaction_header::Model,
        today: NaiveDate,
    ) -> Result<Option<OverdueMark>, ServiceError> {
        let (txn, started) = db::begin(&self.db_pool).await?;
        let lines = load_lines_for_update(&txn, header.id).await?;
        let lifecycle = ensure_lifecycle(&txn, header, &lines).await?;
        let from = lifecycle.current_status;

        // Everything is back; the open event only awaits inspection.
        let all_returned = !lines.is_empty() && lines.iter().all(|l| l.is_fully_returned());
        let Some(to) = from.overdue_successor().filter(|_| !all_returned) else {
            db::commit(txn, started).await?;
            return Ok(None);
        };

        let lifecycle = transition_lifecycle(&txn, &lifecycle, to, None).await?;
        for line in lines.iter().filter(|l| {
            l.rental_status.is_some() && l.rental_status != Some(RentalStatus::Completed)
        }) {
            let line_status = if line.rental_status == Some(RentalStatus::PartialReturn) {
                RentalStatus::LatePartialReturn
            } else {
                RentalStatus::Late
            };
            if line.rental_status != Some(line_status) {
                set_line_rental_status(&txn, line, line_status, None).await?;
            }
        }
        record_event(
            &txn,
            &lifecycle,
            NewReturnEvent::status_change(today, None, Some("Marked overdue".to_string())),
        )
        .await?;
        db::commit(txn, started).await?;

        self.event_sender
            .publish_all(vec![Event::RentalStatusChanged {
                transaction_id: header.id,
                from,
                to,
            }])
            .await;

        Ok(Some(OverdueMark {
            transaction_id: header.id,
            from,
            to,
        }))
    }

    /// Records a partial or full return of rented items.
    #[instrument(skip(self, request))]
    pub async fn process_rental_return(
        &self,
        transaction_id: Uuid,
        request: RentalReturnRequest,
    ) -> Result<RentalReturnEventView, ServiceError> {
        request.validate()?;

        let (txn, started) = db::begin(&self.db_pool).await?;
        let header = Self::load_rental(&txn, transaction_id).await?;
        let lines = load_lines_for_update(&txn, transaction_id).await?;
        let lifecycle = ensure_lifecycle(&txn, &header, &lines).await?;
        if lifecycle.current_status == RentalStatus::Completed {
            return Err(ServiceError::ValidationError(format!(
                "Rental {} is already completed",
                header.transaction_number
            )));
        }

        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for item in &request.items {
            if !seen.insert(item.line_id) {
                errors.push(format!("Line {} appears more than once", item.line_id));
                continue;
            }
            match lines.iter().find(|l| l.id == item.line_id) {
                None => errors.push(format!("Line {} is not part of rental {}", item.line_id, header.transaction_number)),
                Some(_) if item.quantity <= 0 => {
                    errors.push(format!("Return quantity for line {} must be positive", item.line_id))
                }
                Some(line) if item.quantity > line.remaining_quantity() => errors.push(format!(
                    "Return quantity {} for line {} exceeds remaining quantity {}",
                    item.quantity,
                    item.line_id,
                    line.remaining_quantity()
                )),
                Some(_) => {}
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::ValidationErrors(errors));
        }

        let original_value: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let mut returned_value = Decimal::ZERO;
        let mut updated_lines = lines.clone();

        let partial_status = match lifecycle.current_status {
            RentalStatus::Late | RentalStatus::LatePartialReturn => RentalStatus::LatePartialReturn,
            _ => RentalStatus::PartialReturn,
        };

        for item in &request.items {
            let Some(idx) = updated_lines.iter().position(|l| l.id == item.line_id) else {
                continue;
            };
            let line = &updated_lines[idx];
            returned_value += line.unit_price * Decimal::from(item.quantity);
            let line = record_returned_quantity(
                &txn,
                line,
                item.quantity,
                item.condition.map(|c| c.to_string()),
            )
            .await?;
            let status = if line.is_fully_returned() {
                RentalStatus::Completed
            } else {
                partial_status
            };
            updated_lines[idx] = set_line_rental_status(&txn, &line, status, None).await?;
        }

        let all_returned = updated_lines.iter().all(|l| l.is_fully_returned());
        let terms = RentalTerms::from(&header);
        let late_fee = self
            .fees
            .calculate_late_fee(&terms, request.return_date)
            .late_fee_amount;
        let late_charge = round_money(
            late_fee - adjust_late_fee_for_partial_return(late_fee, returned_value, original_value),
        );

        let from = lifecycle.current_status;
        let lifecycle = if !all_returned && from != partial_status {
            transition_lifecycle(&txn, &lifecycle, partial_status, request.processed_by).await?
        } else {
            lifecycle
        };
        let lifecycle = add_lifecycle_fees(
            &txn,
            &lifecycle,
            AccumulatedFees {
                late: late_charge,
                ..Default::default()
            },
            None,
        )
        .await?;

        let event_type = if all_returned {
            ReturnEventType::FullReturn
        } else {
            ReturnEventType::PartialReturn
        };
        let event = record_event(
            &txn,
            &lifecycle,
            NewReturnEvent {
                event_type,
                event_date: request.return_date,
                processed_by: request.processed_by,
                items: request.items.clone(),
                late_fees: late_charge,
                other_fees: Decimal::ZERO,
                new_return_date: None,
                extension_reason: None,
                notes: request.notes.clone(),
            },
        )
        .await?;
        db::commit(txn, started).await?;

        let mut events = vec![Event::RentalReturnRecorded {
            transaction_id,
            event_id: event.id,
            event_type,
        }];
        if lifecycle.current_status != from {
            events.push(Event::RentalStatusChanged {
                transaction_id,
                from,
                to: lifecycle.current_status,
            });
        }
        self.event_sender.publish_all(events).await;

        event.try_into()
    }

    /// Records the inspection of one returned line.
    #[instrument(skip(self, request), fields(line_id = %request.transaction_line_id))]
    pub async fn record_inspection(
        &self,
        event_id: Uuid,
        request: InspectionRequest,
    ) -> Result<InspectionView, ServiceError> {
        request.validate()?;

        let (txn, started) = db::begin(&self.db_pool).await?;
        let event = RentalReturnEvent::find_by_id(event_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return event", event_id))?;
        if event.completed_at.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Return event {} is already completed",
                event_id
            )));
        }

        let item = event
            .items()?
            .into_iter()
            .find(|i| i.line_id == request.transaction_line_id)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Line {} is not part of return event {}",
                    request.transaction_line_id, event_id
                ))
            })?;

        let duplicate = RentalItemInspection::find()
            .filter(rental_item_inspection::Column::ReturnEventId.eq(event_id))
            .filter(rental_item_inspection::Column::TransactionLineId.eq(request.transaction_line_id))
            .one(&txn)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Line {} has already been inspected for return event {}",
                request.transaction_line_id, event_id
            )));
        }

        let line = transaction_line::Entity::find_by_id(request.transaction_line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Transaction line", request.transaction_line_id))?;
        let item_value = line.unit_price * Decimal::from(item.quantity);

        let assessed = request.damage_severity.is_some() || request.custom_damage_fee.is_some();
        let fee = if assessed {
            Some(self.fees.calculate_damage_fee(
                request.damage_severity.unwrap_or(DamageSeverity::Minor),
                item_value,
                request.replacement_cost,
                request.custom_damage_fee,
            ))
        } else {
            None
        };

        let inspection = rental_item_inspection::ActiveModel {
            id: Set(Uuid::new_v4()),
            return_event_id: Set(event_id),
            transaction_line_id: Set(request.transaction_line_id),
            condition: Set(request.condition),
            has_damage: Set(assessed || request.condition == RentalItemCondition::Damaged),
            damage_severity: Set(request.damage_severity),
            damage_description: Set(request.damage_description.clone()),
            estimated_repair_cost: Set(request.estimated_repair_cost),
            damage_fee_assessed: Set(fee.as_ref().map(|f| f.damage_fee).unwrap_or_default()),
            cleaning_fee_assessed: Set(fee.as_ref().map(|f| f.cleaning_fee).unwrap_or_default()),
            replacement_required: Set(fee.as_ref().map(|f| f.replacement_required).unwrap_or(false)),
            replacement_cost: Set(request.replacement_cost),
            return_to_stock: Set(request.return_to_stock),
            requires_maintenance: Set(request.requires_maintenance),
            inspected_by: Set(request.inspected_by),
            inspection_date: Set(Utc::now()),
            inspection_notes: Set(request.notes.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
                "Line {} has already been inspected for return event {}",
                request.transaction_line_id, event_id
            )),
            _ => err.into(),
        })?;
        db::commit(txn, started).await?;

        Ok(inspection.into())
    }

    /// Folds inspection fees into the event and lifecycle and releases stock.
    #[instrument(skip(self, request))]
    pub async fn complete_return_event(
        &self,
        event_id: Uuid,
        request: CompleteReturnEventRequest,
    ) -> Result<RentalReturnEventView, ServiceError> {
        request.validate()?;

        let (txn, started) = db::begin(&self.db_pool).await?;
        let event = RentalReturnEvent::find_by_id(event_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return event", event_id))?;
        if event.completed_at.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Return event {} is already completed",
                event_id
            )));
        }
        if !matches!(
            event.event_type,
            ReturnEventType::PartialReturn | ReturnEventType::FullReturn
        ) {
            return Err(ServiceError::ValidationError(format!(
                "Return event {} is a {} event and cannot be completed",
                event_id, event.event_type
            )));
        }

        let inspections = RentalItemInspection::find()
            .filter(rental_item_inspection::Column::ReturnEventId.eq(event_id))
            .all(&txn)
            .await?;
        let damage: Decimal = inspections.iter().map(|i| i.damage_fee_assessed).sum();
        let cleaning: Decimal = inspections.iter().map(|i| i.cleaning_fee_assessed).sum();

        let header = load_header(&txn, event.transaction_id).await?;
        let lines = load_lines_for_update(&txn, event.transaction_id).await?;
        let lifecycle = RentalLifecycle::find_by_id(event.rental_lifecycle_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Rental lifecycle", event.rental_lifecycle_id))?;

        let mut events = Vec::new();
        for item in event.items()? {
            let Some(line) = lines.iter().find(|l| l.id == item.line_id) else {
                continue;
            };
            let inspection = inspections.iter().find(|i| i.transaction_line_id == line.id);
            let target_status = match inspection {
                Some(i) if !i.return_to_stock || i.requires_maintenance => {
                    InventoryUnitStatus::RequiresInspection
                }
                Some(i) => restock_status_for(i.condition, i.cleaning_fee_assessed > Decimal::ZERO),
                None => restock_status_for(item.condition.unwrap_or(RentalItemCondition::Good), false),
            };
            let queued = release_from_rent_or_queue(
                self.ledger.as_ref(),
                &txn,
                RentalStockRelease {
                    reference_id: event.id,
                    transaction_line_id: line.id,
                    item_id: line.item_id,
                    location_id: line_location(line, &header),
                    inventory_unit_id: line.inventory_unit_id,
                    quantity: item.quantity,
                    target_status,
                    condition: inspection.map(|i| i.condition.to_string()),
                },
            )
            .await?;
            events.extend(queued);
        }

        let all_returned = lines.iter().all(|l| l.is_fully_returned());
        let from = lifecycle.current_status;
        let lifecycle = add_lifecycle_fees(
            &txn,
            &lifecycle,
            AccumulatedFees {
                late: Decimal::ZERO,
                damage,
                other: cleaning,
            },
            all_returned.then_some(event.event_date),
        )
        .await?;
        let lifecycle = if all_returned && from != RentalStatus::Completed {
            propagate_to_open_lines(&txn, &lines, RentalStatus::Completed, None).await?;
            let mut active: transaction_header::ActiveModel = header.clone().into();
            active.status = Set(TransactionStatus::Completed);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
            transition_lifecycle(&txn, &lifecycle, RentalStatus::Completed, request.completed_by)
                .await?
        } else {
            lifecycle
        };

        let mut active: rental_return_event::ActiveModel = event.clone().into();
        active.damage_fees_charged = Set(event.damage_fees_charged + damage);
        active.other_fees_charged = Set(event.other_fees_charged + cleaning);
        active.payment_collected = Set(request.payment_collected);
        active.refund_issued = Set(request.refund_issued);
        active.completed_at = Set(Some(Utc::now()));
        if let Some(notes) = &request.notes {
            active.notes = Set(Some(match &event.notes {
                Some(existing) => format!("{}\n{}", existing, notes),
                None => notes.clone(),
            }));
        }
        let event = active.update(&txn).await?;
        db::commit(txn, started).await?;

        if lifecycle.current_status != from {
            events.push(Event::RentalStatusChanged {
                transaction_id: header.id,
                from,
                to: lifecycle.current_status,
            });
        }
        self.event_sender.publish_all(events).await;

        event.try_into()
    }

    #[instrument(skip(self, request), fields(new_end_date = %request.new_end_date))]
    pub async fn extend_rental(
        &self,
        transaction_id: Uuid,
        request: ExtendRentalRequest,
    ) -> Result<ExtensionResult, ServiceError> {
        request.validate()?;

        let (txn, started) = db::begin(&self.db_pool).await?;
        let header = Self::load_rental(&txn, transaction_id).await?;
        let lines = load_lines_for_update(&txn, transaction_id).await?;
        let lifecycle = ensure_lifecycle(&txn, &header, &lines).await?;
        let estimate = self
            .fees
            .estimate_extension(&RentalTerms::from(&header), request.new_end_date)?;

        let from = lifecycle.current_status;
        let lifecycle = if from == RentalStatus::Extended {
            lifecycle
        } else {
            transition_lifecycle(&txn, &lifecycle, RentalStatus::Extended, request.processed_by)
                .await?
        };

        let mut active: transaction_header::ActiveModel = header.clone().into();
        active.rental_end_date = Set(Some(request.new_end_date));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        propagate_to_open_lines(&txn, &lines, RentalStatus::Extended, Some(request.new_end_date))
            .await?;

        let mut active: rental_lifecycle::ActiveModel = lifecycle.clone().into();
        active.expected_return_date = Set(Some(request.new_end_date));
        active.total_other_fees = Set(lifecycle.total_other_fees + estimate.extension_fee);
        active.updated_at = Set(Utc::now());
        let lifecycle = active.update(&txn).await?;

        let event = record_event(
            &txn,
            &lifecycle,
            NewReturnEvent {
                event_type: ReturnEventType::Extension,
                event_date: Utc::now().date_naive(),
                processed_by: request.processed_by,
                items: Vec::new(),
                late_fees: Decimal::ZERO,
                other_fees: estimate.extension_fee,
                new_return_date: Some(request.new_end_date),
                extension_reason: request.reason.clone(),
                notes: None,
            },
        )
        .await?;
        db::commit(txn, started).await?;

        let mut events = vec![Event::RentalExtended {
            transaction_id,
            new_end_date: request.new_end_date,
        }];
        if from != RentalStatus::Extended {
            events.push(Event::RentalStatusChanged {
                transaction_id,
                from,
                to: RentalStatus::Extended,
            });
        }
        self.event_sender.publish_all(events).await;

        Ok(ExtensionResult {
            event_id: event.id,
            status: lifecycle.current_status,
            estimate,
        })
    }

    pub async fn estimate_extension(
        &self,
        transaction_id: Uuid,
        new_end_date: NaiveDate,
    ) -> Result<ExtensionEstimate, ServiceError> {
        let header = Self::load_rental(self.db_pool.as_ref(), transaction_id).await?;
        self.fees
            .estimate_extension(&RentalTerms::from(&header), new_end_date)
    }

    /// Fee view netted against deposit and advance balance.
    ///
    /// Late fees stop accruing on the day the last item came back.
    #[instrument(skip(self))]
    pub async fn calculate_fees(
        &self,
        transaction_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<RentalFeeSummary, ServiceError> {
        let db = self.db_pool.as_ref();
        let header = Self::load_rental(db, transaction_id).await?;
        let lifecycle = RentalLifecycle::find()
            .filter(rental_lifecycle::Column::TransactionId.eq(transaction_id))
            .one(db)
            .await?;
        let accumulated = lifecycle
            .as_ref()
            .map(|l| AccumulatedFees {
                late: l.total_late_fees,
                damage: l.total_damage_fees,
                other: l.total_other_fees,
            })
            .unwrap_or_default();

        let returned_on = match lifecycle.as_ref().and_then(|l| l.actual_return_date) {
            Some(date) => Some(date),
            None => self.last_return_date_if_all_returned(transaction_id).await?,
        };
        let fees_as_of = returned_on.map_or(as_of, |date| date.min(as_of));

        Ok(self.fees.calculate_total_fees(
            &RentalTerms::from(&header),
            accumulated,
            header.deposit_amount,
            header.customer_advance_balance,
            fees_as_of,
        ))
    }

    /// Date of the latest return event, once every line is back.
    async fn last_return_date_if_all_returned(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<NaiveDate>, ServiceError> {
        let db = self.db_pool.as_ref();
        let lines = load_lines(db, transaction_id).await?;
        if lines.is_empty() || !lines.iter().all(|l| l.is_fully_returned()) {
            return Ok(None);
        }
        let last = RentalReturnEvent::find()
            .filter(rental_return_event::Column::TransactionId.eq(transaction_id))
            .filter(
                rental_return_event::Column::EventType
                    .is_in([ReturnEventType::PartialReturn, ReturnEventType::FullReturn]),
            )
            .order_by_desc(rental_return_event::Column::EventDate)
            .one(db)
            .await?;
        Ok(last.map(|e| e.event_date))
    }

    pub async fn list_return_events(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<RentalReturnEventView>, ServiceError> {
        RentalReturnEvent::find()
            .filter(rental_return_event::Column::TransactionId.eq(transaction_id))
            .order_by_asc(rental_return_event::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await?
            .into_iter()
            .map(RentalReturnEventView::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use RentalStatus::*;

    fn line(status: Option<RentalStatus>, end: Option<NaiveDate>) -> transaction_line::Model {
        let now = Utc::now();
        transaction_line::Model {
            id: Uuid::new_v4(),
            transaction_id: Uuid::nil(),
            line_number: 1,
            item_id: Uuid::new_v4(),
            inventory_unit_id: None,
            location_id: None,
            description: "Tent".into(),
            quantity: 1,
            unit_price: Decimal::ONE,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            line_total: Decimal::ONE,
            rental_start_date: end.map(|e| e - chrono::Duration::days(5)),
            rental_end_date: end,
            rental_period: None,
            rental_status: status,
            returned_quantity: 0,
            return_condition: None,
            original_line_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(vec![Late, Active], Late)]
    #[case(vec![Late, PartialReturn], LatePartialReturn)]
    #[case(vec![LatePartialReturn], LatePartialReturn)]
    #[case(vec![PartialReturn, Extended], PartialReturn)]
    #[case(vec![Completed, Completed], Completed)]
    #[case(vec![Completed, Extended], Extended)]
    #[case(vec![Completed, Active], Active)]
    #[case(vec![Active, Extended], Extended)]
    fn status_precedence(#[case] statuses: Vec<RentalStatus>, #[case] expected: RentalStatus) {
        assert_eq!(aggregate_status(statuses), Some(expected));
    }

    #[test]
    fn no_statuses_means_no_aggregate_status() {
        assert_eq!(aggregate_status(Vec::new()), None);
    }

    #[test]
    fn aggregate_spans_earliest_start_to_latest_end() {
        let lines = vec![
            line(Some(Active), Some(date(2024, 3, 10))),
            line(Some(Active), Some(date(2024, 3, 12))),
        ];
        let agg = aggregate_rental(&lines, date(2024, 3, 15));

        assert_eq!(agg.rental_start_date, Some(date(2024, 3, 5)));
        assert_eq!(agg.rental_end_date, Some(date(2024, 3, 12)));
        assert!(agg.is_overdue);
        assert_eq!(agg.days_overdue, 3);
    }

    #[test]
    fn zero_lines_are_never_overdue() {
        let agg = aggregate_rental(&[], date(2024, 3, 15));
        assert_eq!(agg.rental_end_date, None);
        assert!(!agg.is_overdue);
        assert_eq!(agg.days_overdue, 0);
        assert_eq!(agg.current_rental_status, None);
    }

    #[test]
    fn due_today_is_not_overdue() {
        let lines = vec![line(Some(Active), Some(date(2024, 3, 15)))];
        let agg = aggregate_rental(&lines, date(2024, 3, 15));
        assert!(!agg.is_overdue);
    }

    #[rstest]
    #[case(RentalItemCondition::Excellent, false, InventoryUnitStatus::Available)]
    #[case(RentalItemCondition::Good, true, InventoryUnitStatus::Available)]
    #[case(RentalItemCondition::Fair, true, InventoryUnitStatus::RequiresCleaning)]
    #[case(RentalItemCondition::Fair, false, InventoryUnitStatus::Available)]
    #[case(RentalItemCondition::Poor, false, InventoryUnitStatus::RequiresInspection)]
    #[case(RentalItemCondition::Damaged, false, InventoryUnitStatus::RequiresInspection)]
    fn restock_status_by_condition(
        #[case] condition: RentalItemCondition,
        #[case] cleaning: bool,
        #[case] expected: InventoryUnitStatus,
    ) {
        assert_eq!(restock_status_for(condition, cleaning), expected);
    }
}
