//! Unified return service: one entry point for sale, purchase and rental
//! returns, with the per-type work delegated to a [`ReturnProcessorKind`].

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Query},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::ReturnPolicyConfig,
    db::{self, DbPool},
    entities::{
        return_task::{self, Entity as ReturnTask},
        return_workflow_history::{self, Entity as ReturnWorkflowHistory},
        supplier_credit_memo::{self, Entity as SupplierCreditMemo},
        transaction_header::{self, Entity as TransactionHeader},
        transaction_line, transaction_metadata::{self, Entity as TransactionMetadata},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        returns::{
            CreditMemoView, ReturnLineView, ReturnListFilter, ReturnSummary, ReturnTaskView,
            SupplierCreditRequest, WorkflowHistoryView, WorkflowTransitionRequest, WorkflowView,
        },
        CreateReturnRequest, ReturnDetailsView, ReturnFinancials, ReturnMetadata, ReturnType,
        ReturnValidationResult, ReturnWorkflowState, TransactionStatus, TransactionType,
        WorkflowAction,
    },
    services::{
        inventory::InventoryLedger,
        return_processors::{ReturnContext, ReturnProcessor, ReturnProcessorKind},
        return_workflow::{record_history, ReturnWorkflowManager, WorkflowContext},
        transactions::{
            generate_transaction_number, load_header, load_lines, load_lines_for_update,
            record_returned_quantity,
        },
    },
};

impl From<transaction_line::Model> for ReturnLineView {
    fn from(line: transaction_line::Model) -> Self {
        Self {
            id: line.id,
            original_line_id: line.original_line_id,
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
            return_condition: line.return_condition,
        }
    }
}

fn ensure_return(header: &transaction_header::Model) -> Result<(), ServiceError> {
    if header.transaction_type != TransactionType::Return {
        return Err(ServiceError::not_found("Return", header.id));
    }
    Ok(())
}

/// Loads and decodes the metadata row of a return.
async fn load_return_metadata<C: ConnectionTrait>(
    conn: &C,
    header: &transaction_header::Model,
) -> Result<(ReturnType, ReturnMetadata), ServiceError> {
    ensure_return(header)?;
    let row = TransactionMetadata::find()
        .filter(transaction_metadata::Column::TransactionId.eq(header.id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Return metadata for", header.id))?;
    let return_type = ReturnType::from_metadata_type(&row.metadata_type).ok_or_else(|| {
        warn!(return_id = %header.id, metadata_type = %row.metadata_type, "Unrecognized return metadata");
        ServiceError::not_found("Return", header.id)
    })?;
    let metadata: ReturnMetadata = serde_json::from_str(&row.metadata_content)?;
    Ok((return_type, metadata))
}

fn details_view(
    header: transaction_header::Model,
    return_type: ReturnType,
    metadata: ReturnMetadata,
    lines: Vec<transaction_line::Model>,
) -> ReturnDetailsView {
    ReturnDetailsView {
        return_id: header.id,
        transaction_number: header.transaction_number,
        original_transaction_id: header.reference_transaction_id,
        return_type,
        workflow_state: header.workflow_state,
        return_date: header.transaction_date,
        reason_code: metadata.reason_code,
        total_amount: header.total_amount,
        lines: lines.into_iter().map(ReturnLineView::from).collect(),
        specific_details: metadata.details,
        financials: metadata.financials,
    }
}

#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    policy: ReturnPolicyConfig,
    ledger: Arc<dyn InventoryLedger>,
    workflow: ReturnWorkflowManager,
}

impl ReturnService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        policy: ReturnPolicyConfig,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            policy,
            ledger,
            workflow: ReturnWorkflowManager::new(),
        }
    }

    /// Dry run of a return: every problem found, plus estimated money when clean.
    #[instrument(skip(self, request), fields(original_id = %request.original_transaction_id))]
    pub async fn validate_return(
        &self,
        request: &CreateReturnRequest,
    ) -> Result<ReturnValidationResult, ServiceError> {
        request.validate()?;
        let db = self.db_pool.as_ref();
        let original = load_header(db, request.original_transaction_id).await?;
        let lines = load_lines(db, original.id).await?;

        let processor =
            ReturnProcessorKind::select(&request.details, &self.policy, self.ledger.as_ref());
        let ctx = ReturnContext {
            original: &original,
            original_lines: &lines,
            return_date: request.return_date,
            processed_by: request.processed_by,
            today: Utc::now().date_naive(),
        };
        let outcome = processor.validate_return(&ctx);
        let financials = outcome
            .is_valid()
            .then(|| processor.calculate_financials(&ctx));

        Ok(ReturnValidationResult {
            is_valid: outcome.is_valid(),
            errors: outcome.errors,
            warnings: outcome.warnings,
            estimated_refund: financials.as_ref().map(|f| f.estimated_refund),
            estimated_fees: financials.as_ref().map(|f| f.estimated_fees),
        })
    }

    /// Records a return in one transaction; nothing is written if any step fails.
    #[instrument(skip(self, request), fields(original_id = %request.original_transaction_id, return_type = %request.details.return_type()))]
    pub async fn create_return(
        &self,
        request: CreateReturnRequest,
    ) -> Result<ReturnDetailsView, ServiceError> {
        request.validate()?;
        let return_type = request.details.return_type();
        let (txn, started) = db::begin(&self.db_pool).await?;

        let original = load_header(&txn, request.original_transaction_id).await?;
        let original_lines = load_lines_for_update(&txn, original.id).await?;
        let processor =
            ReturnProcessorKind::select(&request.details, &self.policy, self.ledger.as_ref());
        let ctx = ReturnContext {
            original: &original,
            original_lines: &original_lines,
            return_date: request.return_date,
            processed_by: request.processed_by,
            today: Utc::now().date_naive(),
        };

        let outcome = processor.validate_return(&ctx);
        if !outcome.is_valid() {
            return Err(ServiceError::ValidationErrors(outcome.errors));
        }
        let financials = processor.calculate_financials(&ctx);

        let now = Utc::now();
        let return_id = Uuid::new_v4();
        let header = transaction_header::ActiveModel {
            id: Set(return_id),
            transaction_number: Set(generate_transaction_number(
                TransactionType::Return,
                request.return_date,
            )),
            transaction_type: Set(TransactionType::Return),
            status: Set(TransactionStatus::Processing),
            transaction_date: Set(Utc.from_utc_datetime(&request.return_date.and_time(NaiveTime::MIN))),
            customer_id: Set(original.customer_id),
            supplier_id: Set(original.supplier_id),
            location_id: Set(original.location_id),
            reference_transaction_id: Set(Some(original.id)),
            subtotal: Set(-financials.return_value),
            discount_amount: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            total_amount: Set(-financials.estimated_refund),
            paid_amount: Set(Decimal::ZERO),
            deposit_amount: Set(Decimal::ZERO),
            customer_advance_balance: Set(Decimal::ZERO),
            rental_start_date: Set(None),
            rental_end_date: Set(None),
            rental_period: Set(None),
            rental_period_unit: Set(None),
            workflow_state: Set(Some(ReturnWorkflowState::Initiated)),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::new();
        for (idx, (line_id, quantity, condition)) in request.details.line_refs().into_iter().enumerate() {
            let original_line = ctx
                .line(line_id)
                .ok_or_else(|| ServiceError::not_found("Transaction line", line_id))?;
            let line_total = original_line.unit_price * Decimal::from(quantity);
            let line = transaction_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(return_id),
                line_number: Set(idx as i32 + 1),
                item_id: Set(original_line.item_id),
                inventory_unit_id: Set(original_line.inventory_unit_id),
                location_id: Set(original_line.location_id),
                description: Set(original_line.description.clone()),
                quantity: Set(-quantity),
                unit_price: Set(original_line.unit_price),
                discount_amount: Set(Decimal::ZERO),
                tax_amount: Set(Decimal::ZERO),
                line_total: Set(-line_total),
                rental_start_date: Set(None),
                rental_end_date: Set(None),
                rental_period: Set(None),
                rental_status: Set(None),
                returned_quantity: Set(0),
                return_condition: Set(condition.clone()),
                original_line_id: Set(Some(line_id)),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
            lines.push(line);

            record_returned_quantity(&txn, original_line, quantity, condition).await?;
        }

        let mut events = vec![Event::ReturnCreated {
            return_id,
            original_transaction_id: original.id,
            return_type,
        }];
        events.extend(processor.process_inventory(&txn, &ctx, return_id).await?);

        let note = format!("Return {} recorded", header.transaction_number);
        let original_notes = match &original.notes {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note,
        };
        TransactionHeader::update_many()
            .col_expr(transaction_header::Column::Notes, Expr::value(original_notes))
            .col_expr(transaction_header::Column::UpdatedAt, Expr::value(now))
            .filter(transaction_header::Column::Id.eq(original.id))
            .exec(&txn)
            .await?;

        events.extend(
            processor
                .post_process(&txn, &ctx, return_id, &financials)
                .await?,
        );

        let metadata = ReturnMetadata {
            reason_code: request.reason_code.clone(),
            details: request.details.clone(),
            financials: financials.clone(),
            recorded_at: now,
        };
        transaction_metadata::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(return_id),
            metadata_type: Set(return_type.metadata_type().to_string()),
            metadata_content: Set(serde_json::to_string(&metadata)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_history(
            &txn,
            return_id,
            None,
            ReturnWorkflowState::Initiated,
            &[],
            request.processed_by,
            None,
        )
        .await?;

        db::commit(txn, started).await?;
        counter!("rentops_returns.created", 1, "return_type" => return_type.to_string());
        info!(
            return_id = %return_id,
            transaction_number = %header.transaction_number,
            refund = %financials.estimated_refund,
            "Return created"
        );
        self.event_sender.publish_all(events).await;

        Ok(details_view(header, return_type, metadata, lines))
    }

    #[instrument(skip(self))]
    pub async fn get_return_details(&self, id: Uuid) -> Result<ReturnDetailsView, ServiceError> {
        let db = self.db_pool.as_ref();
        let header = TransactionHeader::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", id))?;
        let (return_type, metadata) = load_return_metadata(db, &header).await?;
        let lines = load_lines(db, id).await?;
        Ok(details_view(header, return_type, metadata, lines))
    }

    /// Newest first; `page` starts at 1.
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        filter: ReturnListFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ReturnSummary>, u64), ServiceError> {
        let db = self.db_pool.as_ref();
        let mut query = TransactionHeader::find()
            .filter(transaction_header::Column::TransactionType.eq(TransactionType::Return));
        if let Some(state) = filter.workflow_state {
            query = query.filter(transaction_header::Column::WorkflowState.eq(state));
        }
        if let Some(return_type) = filter.return_type {
            query = query.filter(
                transaction_header::Column::Id.in_subquery(
                    Query::select()
                        .column(transaction_metadata::Column::TransactionId)
                        .from(TransactionMetadata)
                        .and_where(
                            transaction_metadata::Column::MetadataType
                                .eq(return_type.metadata_type()),
                        )
                        .to_owned(),
                ),
            );
        }

        let paginator = query
            .order_by_desc(transaction_header::Column::CreatedAt)
            .paginate(db, limit.max(1));
        let total = paginator.num_items().await?;
        let headers = paginator.fetch_page(page.max(1) - 1).await?;

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let types: HashMap<Uuid, ReturnType> = TransactionMetadata::find()
            .filter(transaction_metadata::Column::TransactionId.is_in(ids))
            .all(db)
            .await?
            .into_iter()
            .filter_map(|m| {
                ReturnType::from_metadata_type(&m.metadata_type).map(|t| (m.transaction_id, t))
            })
            .collect();

        let summaries = headers
            .into_iter()
            .map(|h| ReturnSummary {
                return_type: types.get(&h.id).copied(),
                id: h.id,
                transaction_number: h.transaction_number,
                original_transaction_id: h.reference_transaction_id,
                workflow_state: h.workflow_state,
                total_amount: h.total_amount,
                created_at: h.created_at,
            })
            .collect();
        Ok((summaries, total))
    }

    /// Moves a return one workflow step, persisting state, history and tasks together.
    #[instrument(skip(self, request), fields(to = %request.to_state))]
    pub async fn advance_workflow(
        &self,
        return_id: Uuid,
        request: WorkflowTransitionRequest,
    ) -> Result<WorkflowView, ServiceError> {
        request.validate()?;
        let (txn, started) = db::begin(&self.db_pool).await?;

        let header = TransactionHeader::find_by_id(return_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", return_id))?;
        let (_, metadata) = load_return_metadata(&txn, &header).await?;
        let from = header
            .workflow_state
            .unwrap_or(ReturnWorkflowState::Initiated);

        let ctx = WorkflowContext {
            details: &metadata.details,
            inspection_completed: request.inspection_completed,
            refund_reference: request.refund_reference.as_deref(),
        };
        let plan = self.workflow.plan_transition(&ctx, from, request.to_state)?;

        let now = Utc::now();
        let mut update = TransactionHeader::update_many()
            .col_expr(
                transaction_header::Column::WorkflowState,
                Expr::value(plan.to),
            )
            .col_expr(transaction_header::Column::UpdatedAt, Expr::value(now));
        match plan.to {
            ReturnWorkflowState::Completed => {
                update = update.col_expr(
                    transaction_header::Column::Status,
                    Expr::value(TransactionStatus::Completed),
                );
            }
            ReturnWorkflowState::Cancelled => {
                update = update.col_expr(
                    transaction_header::Column::Status,
                    Expr::value(TransactionStatus::Cancelled),
                );
            }
            _ => {}
        }
        let mut update = update.filter(transaction_header::Column::Id.eq(return_id));
        update = match header.workflow_state {
            Some(state) => update.filter(transaction_header::Column::WorkflowState.eq(state)),
            None => update.filter(transaction_header::Column::WorkflowState.is_null()),
        };
        if update.exec(&txn).await?.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(return_id));
        }

        let events = self
            .workflow
            .execute_actions(&txn, return_id, &plan, request.performed_by, request.notes)
            .await?;
        db::commit(txn, started).await?;

        counter!("rentops_returns.workflow_transitions", 1, "to" => plan.to.to_string());
        info!(return_id = %return_id, from = %plan.from, to = %plan.to, "Return workflow advanced");
        self.event_sender.publish_all(events).await;

        self.get_workflow(return_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_workflow(&self, return_id: Uuid) -> Result<WorkflowView, ServiceError> {
        let db = self.db_pool.as_ref();
        let header = TransactionHeader::find_by_id(return_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", return_id))?;
        let (return_type, metadata) = load_return_metadata(db, &header).await?;
        let current_state = header
            .workflow_state
            .unwrap_or(ReturnWorkflowState::Initiated);

        let history = ReturnWorkflowHistory::find()
            .filter(return_workflow_history::Column::ReturnId.eq(return_id))
            .order_by_asc(return_workflow_history::Column::CreatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(|h| -> Result<WorkflowHistoryView, ServiceError> {
                let actions: Vec<WorkflowAction> = serde_json::from_str(&h.actions)?;
                Ok(WorkflowHistoryView {
                    from_state: h.from_state,
                    to_state: h.to_state,
                    actions,
                    performed_by: h.performed_by,
                    notes: h.notes,
                    created_at: h.created_at,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let tasks = ReturnTask::find()
            .filter(return_task::Column::ReturnId.eq(return_id))
            .order_by_asc(return_task::Column::CreatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(ReturnTaskView::from)
            .collect();

        Ok(WorkflowView {
            return_id,
            return_type,
            current_state,
            allowed_next_states: self
                .workflow
                .allowed_next_states(&metadata.details, current_state),
            history,
            tasks,
        })
    }

    /// Records the supplier's credit memo against a purchase return.
    #[instrument(skip(self, request))]
    pub async fn record_supplier_credit(
        &self,
        return_id: Uuid,
        request: SupplierCreditRequest,
    ) -> Result<CreditMemoView, ServiceError> {
        request.validate()?;

        let (txn, started) = db::begin(&self.db_pool).await?;
        let header = TransactionHeader::find_by_id(return_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", return_id))?;
        let (return_type, metadata) = load_return_metadata(&txn, &header).await?;
        if return_type != ReturnType::Purchase {
            return Err(ServiceError::validation(
                "Credit memos can only be recorded for purchase returns",
            ));
        }
        if SupplierCreditMemo::find()
            .filter(supplier_credit_memo::Column::ReturnId.eq(return_id))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "A credit memo already exists for return {}",
                return_id
            )));
        }

        let expected_amount = expected_credit(&metadata.financials);
        let memo = supplier_credit_memo::ActiveModel {
            id: Set(Uuid::new_v4()),
            return_id: Set(return_id),
            memo_number: Set(request.memo_number.trim().to_string()),
            credit_amount: Set(request.credit_amount),
            expected_amount: Set(expected_amount),
            received_date: Set(request.received_date.unwrap_or_else(today)),
            notes: Set(request.notes),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
                "A credit memo already exists for return {}",
                return_id
            )),
            _ => ServiceError::from(err),
        })?;
        db::commit(txn, started).await?;

        if memo.credit_amount != expected_amount {
            warn!(
                return_id = %return_id,
                expected = %expected_amount,
                credited = %memo.credit_amount,
                "Supplier credit differs from expected credit"
            );
        }
        self.event_sender
            .publish_all(vec![Event::SupplierCreditRecorded {
                return_id,
                memo_id: memo.id,
            }])
            .await;
        Ok(CreditMemoView::from(memo))
    }
}

fn expected_credit(financials: &ReturnFinancials) -> Decimal {
    financials.estimated_refund
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
