use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, DbPool},
    entities::{
        transaction_header::{self, Entity as TransactionHeader},
        transaction_line::{self, Entity as TransactionLine},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        transaction::{CreateTransactionRequest, TransactionView},
        InventoryUnitStatus, RentalPeriodUnit, RentalStatus, StockMovementType, TransactionStatus,
        TransactionType,
    },
    services::inventory::{self, line_location, InventoryLedger, StockAdjustment},
};

/// `{PREFIX}-{yyyymmdd}-{8 hex}`, e.g. `RET-20240314-1a2b3c4d`.
pub fn generate_transaction_number(transaction_type: TransactionType, date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        transaction_type.number_prefix(),
        date.format("%Y%m%d"),
        &suffix[..8]
    )
}

pub async fn load_header<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<transaction_header::Model, ServiceError> {
    TransactionHeader::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Transaction", id))
}

/// Lines of a transaction in line-number order.
pub async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    transaction_id: Uuid,
) -> Result<Vec<transaction_line::Model>, ServiceError> {
    Ok(TransactionLine::find()
        .filter(transaction_line::Column::TransactionId.eq(transaction_id))
        .order_by_asc(transaction_line::Column::LineNumber)
        .all(conn)
        .await?)
}

/// Same as [`load_lines`], taking row locks where the backend supports them.
pub async fn load_lines_for_update(
    txn: &DatabaseTransaction,
    transaction_id: Uuid,
) -> Result<Vec<transaction_line::Model>, ServiceError> {
    let mut query = TransactionLine::find()
        .filter(transaction_line::Column::TransactionId.eq(transaction_id))
        .order_by_asc(transaction_line::Column::LineNumber);
    if db::supports_row_locks(txn) {
        query = query.lock_exclusive();
    }
    Ok(query.all(txn).await?)
}

/// Adds `quantity` to a line's returned quantity, guarded by its version.
///
/// A concurrent writer that bumped the version first makes this fail with
/// `ConcurrentModification`.
pub async fn record_returned_quantity(
    txn: &DatabaseTransaction,
    line: &transaction_line::Model,
    quantity: i32,
    condition: Option<String>,
) -> Result<transaction_line::Model, ServiceError> {
    let returned_quantity = line.returned_quantity + quantity;
    if returned_quantity > line.quantity {
        return Err(ServiceError::ValidationError(format!(
            "Line {} would be over-returned: {} of {}",
            line.id, returned_quantity, line.quantity
        )));
    }

    let now = Utc::now();
    let result = TransactionLine::update_many()
        .col_expr(
            transaction_line::Column::ReturnedQuantity,
            Expr::value(returned_quantity),
        )
        .col_expr(
            transaction_line::Column::ReturnCondition,
            Expr::value(condition.clone().or_else(|| line.return_condition.clone())),
        )
        .col_expr(transaction_line::Column::Version, Expr::value(line.version + 1))
        .col_expr(transaction_line::Column::UpdatedAt, Expr::value(now))
        .filter(transaction_line::Column::Id.eq(line.id))
        .filter(transaction_line::Column::Version.eq(line.version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(line.id));
    }

    Ok(transaction_line::Model {
        returned_quantity,
        return_condition: condition.or_else(|| line.return_condition.clone()),
        version: line.version + 1,
        updated_at: now,
        ..line.clone()
    })
}

/// Sets the rental status on a line; bumps its version.
pub async fn set_line_rental_status(
    txn: &DatabaseTransaction,
    line: &transaction_line::Model,
    status: RentalStatus,
    end_date: Option<NaiveDate>,
) -> Result<transaction_line::Model, ServiceError> {
    let mut active: transaction_line::ActiveModel = line.clone().into();
    active.rental_status = Set(Some(status));
    if end_date.is_some() {
        active.rental_end_date = Set(end_date);
    }
    active.version = Set(line.version + 1);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

#[derive(Clone)]
pub struct TransactionService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: Arc<dyn InventoryLedger>,
}

impl TransactionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            ledger,
        }
    }

    fn check_request(request: &CreateTransactionRequest) -> Result<(), ServiceError> {
        request.validate()?;
        for line in &request.lines {
            line.validate()?;
        }

        if request.transaction_type == TransactionType::Return {
            return Err(ServiceError::BadRequest(
                "Returns are created through the returns endpoint".to_string(),
            ));
        }

        if request.transaction_type == TransactionType::Rental {
            match (request.rental_start_date, request.rental_end_date) {
                (Some(start), Some(end)) if end > start => {}
                (Some(_), Some(_)) => {
                    return Err(ServiceError::validation(
                        "Rental end date must be after the start date",
                    ))
                }
                _ => {
                    return Err(ServiceError::validation(
                        "Rental start and end dates are required",
                    ))
                }
            }
            if matches!(request.rental_period, Some(p) if p <= 0) {
                return Err(ServiceError::validation("Rental period must be positive"));
            }
        }
        Ok(())
    }

    /// Creates a SALE, PURCHASE, RENTAL or ADJUSTMENT with its lines and stock effects.
    #[instrument(skip(self, request), fields(transaction_type = %request.transaction_type))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<TransactionView, ServiceError> {
        Self::check_request(&request)?;

        let now = Utc::now();
        let transaction_date = request.transaction_date.unwrap_or(now);
        let is_rental = request.transaction_type == TransactionType::Rental;

        let mut subtotal = Decimal::ZERO;
        let mut tax_amount = Decimal::ZERO;
        for line in &request.lines {
            subtotal += line.unit_price * Decimal::from(line.quantity) - line.discount_amount;
            tax_amount += line.tax_amount;
        }
        let total_amount = subtotal - request.discount_amount + tax_amount;
        if total_amount < Decimal::ZERO {
            return Err(ServiceError::validation("Total amount cannot be negative"));
        }
        if request.paid_amount > total_amount {
            return Err(ServiceError::validation(
                "Paid amount cannot exceed the total amount",
            ));
        }

        let (rental_period, rental_period_unit) = if is_rental {
            let days = match (request.rental_start_date, request.rental_end_date) {
                (Some(start), Some(end)) => Some((end - start).num_days() as i32),
                _ => None,
            };
            (
                request.rental_period.or(days),
                Some(request.rental_period_unit.unwrap_or(RentalPeriodUnit::Day)),
            )
        } else {
            (None, None)
        };

        let header_id = Uuid::new_v4();
        let (txn, started) = db::begin(&self.db_pool).await?;

        let header = transaction_header::ActiveModel {
            id: Set(header_id),
            transaction_number: Set(generate_transaction_number(
                request.transaction_type,
                transaction_date.date_naive(),
            )),
            transaction_type: Set(request.transaction_type),
            status: Set(request.status),
            transaction_date: Set(transaction_date),
            customer_id: Set(request.customer_id),
            supplier_id: Set(request.supplier_id),
            location_id: Set(request.location_id),
            reference_transaction_id: Set(None),
            subtotal: Set(subtotal),
            discount_amount: Set(request.discount_amount),
            tax_amount: Set(tax_amount),
            total_amount: Set(total_amount),
            paid_amount: Set(request.paid_amount),
            deposit_amount: Set(request.deposit_amount),
            customer_advance_balance: Set(request.customer_advance_balance),
            rental_start_date: Set(request.rental_start_date.filter(|_| is_rental)),
            rental_end_date: Set(request.rental_end_date.filter(|_| is_rental)),
            rental_period: Set(rental_period),
            rental_period_unit: Set(rental_period_unit),
            workflow_state: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let moves_stock = matches!(
            request.status,
            TransactionStatus::Completed | TransactionStatus::InProgress
        );
        let mut events = vec![Event::TransactionCreated {
            transaction_id: header_id,
            transaction_type: request.transaction_type,
        }];

        let mut lines = Vec::with_capacity(request.lines.len());
        for (idx, line) in request.lines.iter().enumerate() {
            let mut unit_id = line.inventory_unit_id;
            if request.transaction_type == TransactionType::Purchase && unit_id.is_none() {
                if let Some(serial) = &line.serial_number {
                    let unit = inventory::register_unit(
                        &txn,
                        line.item_id,
                        line.location_id.or(request.location_id),
                        Some(serial.clone()),
                        InventoryUnitStatus::Available,
                    )
                    .await?;
                    unit_id = Some(unit.id);
                }
            }

            let gross = line.unit_price * Decimal::from(line.quantity);
            let model = transaction_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(header_id),
                line_number: Set(idx as i32 + 1),
                item_id: Set(line.item_id),
                inventory_unit_id: Set(unit_id),
                location_id: Set(line.location_id),
                description: Set(line.description.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                discount_amount: Set(line.discount_amount),
                tax_amount: Set(line.tax_amount),
                line_total: Set(gross - line.discount_amount + line.tax_amount),
                rental_start_date: Set(if is_rental {
                    line.rental_start_date.or(request.rental_start_date)
                } else {
                    None
                }),
                rental_end_date: Set(if is_rental {
                    line.rental_end_date.or(request.rental_end_date)
                } else {
                    None
                }),
                rental_period: Set(if is_rental {
                    line.rental_period.or(rental_period)
                } else {
                    None
                }),
                rental_status: Set(is_rental.then_some(RentalStatus::Active)),
                returned_quantity: Set(0),
                return_condition: Set(None),
                original_line_id: Set(None),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;

            if moves_stock {
                self.apply_stock_effect(&txn, &header, &model, &mut events)
                    .await?;
            }
            lines.push(model);
        }

        db::commit(txn, started).await?;
        info!(
            transaction_id = %header.id,
            transaction_number = %header.transaction_number,
            "Transaction created"
        );
        self.event_sender.publish_all(events).await;

        Ok(TransactionView::new(header, lines))
    }

    async fn apply_stock_effect(
        &self,
        txn: &DatabaseTransaction,
        header: &transaction_header::Model,
        line: &transaction_line::Model,
        events: &mut Vec<Event>,
    ) -> Result<(), ServiceError> {
        let location_id = line_location(line, header);
        let (delta, movement_type, unit_status) = match header.transaction_type {
            TransactionType::Sale => (-line.quantity, StockMovementType::Sale, InventoryUnitStatus::Sold),
            TransactionType::Purchase => (
                line.quantity,
                StockMovementType::Purchase,
                InventoryUnitStatus::Available,
            ),
            TransactionType::Adjustment => (
                line.quantity,
                StockMovementType::Adjustment,
                InventoryUnitStatus::Available,
            ),
            TransactionType::Rental => {
                self.ledger
                    .move_to_rent(txn, line.item_id, location_id, line.quantity, Some(header.id))
                    .await?;
                if let Some(unit_id) = line.inventory_unit_id {
                    self.ledger
                        .update_unit_status(txn, unit_id, InventoryUnitStatus::OnRent, None)
                        .await?;
                }
                events.push(Event::StockAdjusted {
                    item_id: line.item_id,
                    location_id,
                    delta: -line.quantity,
                    movement_type: StockMovementType::RentalOut,
                });
                return Ok(());
            }
            TransactionType::Return => return Ok(()),
        };

        self.ledger
            .adjust_stock(
                txn,
                StockAdjustment {
                    item_id: line.item_id,
                    location_id,
                    delta,
                    movement_type,
                    affects_available: true,
                    reference_id: Some(header.id),
                    notes: None,
                },
            )
            .await?;
        if let Some(unit_id) = line.inventory_unit_id {
            self.ledger
                .update_unit_status(txn, unit_id, unit_status, None)
                .await?;
        }
        events.push(Event::StockAdjusted {
            item_id: line.item_id,
            location_id,
            delta,
            movement_type,
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_transaction(&self, id: Uuid) -> Result<TransactionView, ServiceError> {
        let db = self.db_pool.as_ref();
        let header = load_header(db, id).await?;
        let lines = load_lines(db, id).await?;
        Ok(TransactionView::new(header, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_number_has_prefix_date_and_hex_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let number = generate_transaction_number(TransactionType::Return, date);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RET");
        assert_eq!(parts[1], "20240314");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_numbers_are_distinct() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_ne!(
            generate_transaction_number(TransactionType::Sale, date),
            generate_transaction_number(TransactionType::Sale, date)
        );
    }
}
