use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db,
    entities::{
        inventory_unit, stock_level, stock_movement,
        stock_reconciliation_task::{self, Entity as ReconciliationTask},
        transaction_header, transaction_line,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{InventoryUnitStatus, ReconciliationStatus, StockMovementType, DEFAULT_LOCATION_ID},
};

/// A signed change to one (item, location) stock row.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub delta: i32,
    pub movement_type: StockMovementType,
    /// When false only on-hand moves; the goods are not sellable yet.
    pub affects_available: bool,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Inventory collaborator used by transactions, return processors and rentals.
///
/// Every call runs on the caller's transaction (or savepoint) so stock changes
/// commit or roll back with the write that caused them.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn adjust_stock(
        &self,
        txn: &DatabaseTransaction,
        adjustment: StockAdjustment,
    ) -> Result<stock_level::Model, ServiceError>;

    async fn update_unit_status(
        &self,
        txn: &DatabaseTransaction,
        unit_id: Uuid,
        status: InventoryUnitStatus,
        condition: Option<String>,
    ) -> Result<inventory_unit::Model, ServiceError>;

    /// Moves available stock out on rent.
    async fn move_to_rent(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    ) -> Result<stock_level::Model, ServiceError>;

    /// Moves rented stock back; into available only when `to_available`.
    async fn move_from_rent(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        to_available: bool,
        reference_id: Option<Uuid>,
    ) -> Result<stock_level::Model, ServiceError>;
}

/// Location a line's stock lives at.
pub fn line_location(
    line: &transaction_line::Model,
    header: &transaction_header::Model,
) -> Uuid {
    line.location_id
        .or(header.location_id)
        .unwrap_or(DEFAULT_LOCATION_ID)
}

#[derive(Debug, Clone, Default)]
pub struct SeaOrmInventoryLedger;

impl SeaOrmInventoryLedger {
    async fn load_or_create(
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<stock_level::Model, ServiceError> {
        let mut query = stock_level::Entity::find()
            .filter(stock_level::Column::ItemId.eq(item_id))
            .filter(stock_level::Column::LocationId.eq(location_id));
        if db::supports_row_locks(txn) {
            query = query.lock_exclusive();
        }

        if let Some(level) = query.one(txn).await? {
            return Ok(level);
        }

        let level = stock_level::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(item_id),
            location_id: Set(location_id),
            quantity_on_hand: Set(0),
            quantity_available: Set(0),
            quantity_on_rent: Set(0),
            version: Set(0),
            updated_at: Set(Utc::now()),
        };
        Ok(level.insert(txn).await?)
    }

    /// Writes new quantities guarded by the row's version.
    async fn store(
        txn: &DatabaseTransaction,
        level: &stock_level::Model,
        on_hand: i32,
        available: i32,
        on_rent: i32,
    ) -> Result<stock_level::Model, ServiceError> {
        let result = stock_level::Entity::update_many()
            .col_expr(stock_level::Column::QuantityOnHand, Expr::value(on_hand))
            .col_expr(stock_level::Column::QuantityAvailable, Expr::value(available))
            .col_expr(stock_level::Column::QuantityOnRent, Expr::value(on_rent))
            .col_expr(stock_level::Column::Version, Expr::value(level.version + 1))
            .col_expr(stock_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_level::Column::Id.eq(level.id))
            .filter(stock_level::Column::Version.eq(level.version))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(level.id));
        }

        Ok(stock_level::Model {
            quantity_on_hand: on_hand,
            quantity_available: available,
            quantity_on_rent: on_rent,
            version: level.version + 1,
            ..level.clone()
        })
    }

    async fn record_movement(
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
        movement_type: StockMovementType,
        quantity: i32,
        reference_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<(), ServiceError> {
        stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(item_id),
            location_id: Set(location_id),
            movement_type: Set(movement_type),
            quantity: Set(quantity),
            reference_id: Set(reference_id),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for SeaOrmInventoryLedger {
    #[instrument(skip(self, txn), fields(item_id = %adjustment.item_id, delta = adjustment.delta))]
    async fn adjust_stock(
        &self,
        txn: &DatabaseTransaction,
        adjustment: StockAdjustment,
    ) -> Result<stock_level::Model, ServiceError> {
        let level = Self::load_or_create(txn, adjustment.item_id, adjustment.location_id).await?;

        let on_hand = level.quantity_on_hand + adjustment.delta;
        let available = if adjustment.affects_available {
            level.quantity_available + adjustment.delta
        } else {
            level.quantity_available
        };
        if available < 0 {
            warn!(
                item_id = %adjustment.item_id,
                location_id = %adjustment.location_id,
                available,
                "Stock level went negative"
            );
        }

        let updated = Self::store(txn, &level, on_hand, available, level.quantity_on_rent).await?;
        Self::record_movement(
            txn,
            adjustment.item_id,
            adjustment.location_id,
            adjustment.movement_type,
            adjustment.delta,
            adjustment.reference_id,
            adjustment.notes,
        )
        .await?;

        Ok(updated)
    }

    async fn update_unit_status(
        &self,
        txn: &DatabaseTransaction,
        unit_id: Uuid,
        status: InventoryUnitStatus,
        condition: Option<String>,
    ) -> Result<inventory_unit::Model, ServiceError> {
        let unit = inventory_unit::Entity::find_by_id(unit_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory unit", unit_id))?;

        let mut active: inventory_unit::ActiveModel = unit.into();
        active.status = Set(status);
        if condition.is_some() {
            active.condition = Set(condition);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(txn).await?)
    }

    async fn move_to_rent(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        reference_id: Option<Uuid>,
    ) -> Result<stock_level::Model, ServiceError> {
        let level = Self::load_or_create(txn, item_id, location_id).await?;
        let updated = Self::store(
            txn,
            &level,
            level.quantity_on_hand - quantity,
            level.quantity_available - quantity,
            level.quantity_on_rent + quantity,
        )
        .await?;
        Self::record_movement(
            txn,
            item_id,
            location_id,
            StockMovementType::RentalOut,
            -quantity,
            reference_id,
            None,
        )
        .await?;
        Ok(updated)
    }

    async fn move_from_rent(
        &self,
        txn: &DatabaseTransaction,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        to_available: bool,
        reference_id: Option<Uuid>,
    ) -> Result<stock_level::Model, ServiceError> {
        let level = Self::load_or_create(txn, item_id, location_id).await?;
        if level.quantity_on_rent < quantity {
            return Err(ServiceError::InventoryError(format!(
                "Item {} has {} on rent at location {}, cannot return {}",
                item_id, level.quantity_on_rent, location_id, quantity
            )));
        }

        let available = if to_available {
            level.quantity_available + quantity
        } else {
            level.quantity_available
        };
        let updated = Self::store(
            txn,
            &level,
            level.quantity_on_hand + quantity,
            available,
            level.quantity_on_rent - quantity,
        )
        .await?;
        Self::record_movement(
            txn,
            item_id,
            location_id,
            StockMovementType::RentalReturn,
            quantity,
            reference_id,
            None,
        )
        .await?;
        Ok(updated)
    }
}

/// A rental line's stock coming back from rent.
#[derive(Debug, Clone)]
pub struct RentalStockRelease {
    /// Return transaction or rental return event the release belongs to
    pub reference_id: Uuid,
    pub transaction_line_id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub inventory_unit_id: Option<Uuid>,
    pub quantity: i32,
    pub target_status: InventoryUnitStatus,
    pub condition: Option<String>,
}

async fn apply_release(
    ledger: &dyn InventoryLedger,
    txn: &DatabaseTransaction,
    release: &RentalStockRelease,
) -> Result<(), ServiceError> {
    ledger
        .move_from_rent(
            txn,
            release.item_id,
            release.location_id,
            release.quantity,
            release.target_status == InventoryUnitStatus::Available,
            Some(release.reference_id),
        )
        .await?;
    if let Some(unit_id) = release.inventory_unit_id {
        ledger
            .update_unit_status(txn, unit_id, release.target_status, release.condition.clone())
            .await?;
    }
    Ok(())
}

/// Applies a rental stock release inside a savepoint.
///
/// A failure rolls the savepoint back and queues a reconciliation task on the
/// outer transaction, so the return itself still commits.
pub async fn release_from_rent_or_queue(
    ledger: &dyn InventoryLedger,
    txn: &DatabaseTransaction,
    release: RentalStockRelease,
) -> Result<Option<Event>, ServiceError> {
    let savepoint = txn.begin().await?;
    match apply_release(ledger, &savepoint, &release).await {
        Ok(()) => {
            savepoint.commit().await?;
            Ok(None)
        }
        Err(err) => {
            savepoint.rollback().await?;
            warn!(
                reference_id = %release.reference_id,
                line_id = %release.transaction_line_id,
                error = %err,
                "Rental stock update failed, queued for reconciliation"
            );
            let task_id = queue_reconciliation(txn, &release, &err.to_string()).await?;
            Ok(Some(Event::StockReconciliationQueued {
                task_id,
                return_id: release.reference_id,
            }))
        }
    }
}

async fn queue_reconciliation(
    txn: &DatabaseTransaction,
    release: &RentalStockRelease,
    last_error: &str,
) -> Result<Uuid, ServiceError> {
    let now = Utc::now();
    let task = stock_reconciliation_task::ActiveModel {
        id: Set(Uuid::new_v4()),
        return_id: Set(release.reference_id),
        transaction_line_id: Set(release.transaction_line_id),
        item_id: Set(release.item_id),
        location_id: Set(release.location_id),
        inventory_unit_id: Set(release.inventory_unit_id),
        quantity: Set(release.quantity),
        target_status: Set(release.target_status),
        status: Set(ReconciliationStatus::Pending),
        attempts: Set(0),
        last_error: Set(Some(last_error.to_string())),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;
    Ok(task.id)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub processed: usize,
    pub resolved: usize,
    pub retried: usize,
    pub failed: usize,
}

/// One pass over pending reconciliation tasks, oldest first.
#[instrument(skip(db, ledger))]
pub async fn run_reconciliation_pass(
    db: &DatabaseConnection,
    ledger: &dyn InventoryLedger,
    max_attempts: i32,
    batch_size: u64,
) -> Result<(ReconciliationReport, Vec<Event>), ServiceError> {
    let tasks = ReconciliationTask::find()
        .filter(stock_reconciliation_task::Column::Status.eq(ReconciliationStatus::Pending))
        .order_by_asc(stock_reconciliation_task::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut report = ReconciliationReport::default();
    let mut events = Vec::new();

    for task in tasks {
        report.processed += 1;
        let release = RentalStockRelease {
            reference_id: task.return_id,
            transaction_line_id: task.transaction_line_id,
            item_id: task.item_id,
            location_id: task.location_id,
            inventory_unit_id: task.inventory_unit_id,
            quantity: task.quantity,
            target_status: task.target_status,
            condition: None,
        };

        let (txn, started) = db::begin(db).await?;
        let outcome = apply_release(ledger, &txn, &release).await;
        let attempts = task.attempts + 1;

        let mut active: stock_reconciliation_task::ActiveModel = task.clone().into();
        active.attempts = Set(attempts);
        active.updated_at = Set(Utc::now());

        match outcome {
            Ok(()) => {
                active.status = Set(ReconciliationStatus::Resolved);
                active.last_error = Set(None);
                active.update(&txn).await?;
                db::commit(txn, started).await?;
                report.resolved += 1;
                events.push(Event::StockReconciled { task_id: task.id });
                info!(task_id = %task.id, attempts, "Stock reconciliation resolved");
            }
            Err(err) => {
                // Discard partial stock writes before recording the failure.
                txn.rollback().await?;
                let exhausted = attempts >= max_attempts;
                let (txn, started) = db::begin(db).await?;
                active.status = Set(if exhausted {
                    ReconciliationStatus::Failed
                } else {
                    ReconciliationStatus::Pending
                });
                active.last_error = Set(Some(err.to_string()));
                active.update(&txn).await?;
                db::commit(txn, started).await?;

                if exhausted {
                    report.failed += 1;
                    error!(task_id = %task.id, attempts, error = %err, "Stock reconciliation gave up");
                } else {
                    report.retried += 1;
                    debug!(task_id = %task.id, attempts, error = %err, "Stock reconciliation will retry");
                }
            }
        }
    }

    Ok((report, events))
}

/// Background worker polling the reconciliation queue.
pub fn start_reconciliation_worker(
    db: Arc<DatabaseConnection>,
    ledger: Arc<dyn InventoryLedger>,
    sender: EventSender,
    interval: Duration,
    max_attempts: i32,
) {
    if interval.is_zero() {
        info!("Stock reconciliation worker disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match run_reconciliation_pass(&db, ledger.as_ref(), max_attempts, 50).await {
                Ok((report, events)) => {
                    if report.processed > 0 {
                        info!(?report, "Stock reconciliation pass finished");
                    }
                    sender.publish_all(events).await;
                }
                Err(e) => error!("stock reconciliation worker error: {}", e),
            }
        }
    });
}

/// Current stock row for an item at a location, if any.
pub async fn stock_level_for(
    db: &DatabaseConnection,
    item_id: Uuid,
    location_id: Uuid,
) -> Result<Option<stock_level::Model>, ServiceError> {
    Ok(stock_level::Entity::find()
        .filter(stock_level::Column::ItemId.eq(item_id))
        .filter(stock_level::Column::LocationId.eq(location_id))
        .one(db)
        .await?)
}

/// Registers a serialized unit; used when stock is received unit by unit.
pub async fn register_unit(
    txn: &DatabaseTransaction,
    item_id: Uuid,
    location_id: Option<Uuid>,
    serial_number: Option<String>,
    status: InventoryUnitStatus,
) -> Result<inventory_unit::Model, ServiceError> {
    let now = Utc::now();
    Ok(inventory_unit::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item_id),
        location_id: Set(location_id),
        serial_number: Set(serial_number),
        status: Set(status),
        condition: NotSet,
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?)
}
