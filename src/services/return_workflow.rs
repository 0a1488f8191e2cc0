//! Per-type return workflow: transition table, guards and the side effects
//! each transition schedules.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        return_task::{self, Entity as ReturnTask},
        return_workflow_history,
    },
    errors::ServiceError,
    events::Event,
    models::{ReturnDetails, ReturnTaskKind, ReturnType, ReturnWorkflowState, WorkflowAction},
};

use ReturnWorkflowState::*;

/// Facts the guards look at for one transition request.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowContext<'a> {
    pub details: &'a ReturnDetails,
    pub inspection_completed: bool,
    pub refund_reference: Option<&'a str>,
}

impl<'a> WorkflowContext<'a> {
    /// Context without request-supplied facts, used to list reachable states.
    pub fn of(details: &'a ReturnDetails) -> Self {
        Self {
            details,
            inspection_completed: false,
            refund_reference: None,
        }
    }

    pub fn return_type(&self) -> ReturnType {
        self.details.return_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: ReturnWorkflowState,
    pub to: ReturnWorkflowState,
    pub actions: Vec<WorkflowAction>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnWorkflowManager;

impl ReturnWorkflowManager {
    pub fn new() -> Self {
        Self
    }

    /// Whether the transition table for `return_type` has the edge at all.
    pub fn is_listed(return_type: ReturnType, from: ReturnWorkflowState, to: ReturnWorkflowState) -> bool {
        match (from, to) {
            (Initiated, Validated)
            | (Validated, ItemsReceived)
            | (ItemsReceived, InspectionPending)
            | (InspectionPending, InspectionComplete)
            | (InspectionComplete, RefundApproved)
            | (RefundApproved, RefundProcessed)
            | (RefundProcessed, Completed) => true,
            (ItemsReceived, RefundApproved) => return_type != ReturnType::Rental,
            (from, Cancelled) => Self::can_cancel(return_type, from),
            _ => false,
        }
    }

    fn can_cancel(return_type: ReturnType, from: ReturnWorkflowState) -> bool {
        match return_type {
            ReturnType::Sale => !from.is_terminal(),
            ReturnType::Purchase => matches!(
                from,
                Initiated
                    | Validated
                    | ItemsReceived
                    | InspectionPending
                    | InspectionComplete
                    | RefundApproved
            ),
            ReturnType::Rental => from == Initiated,
        }
    }

    /// Guard for a listed edge; `Err` carries the reason.
    fn check_guard(
        ctx: &WorkflowContext<'_>,
        from: ReturnWorkflowState,
        to: ReturnWorkflowState,
    ) -> Result<(), &'static str> {
        let quality_check = ctx.details.quality_check_required();
        match (from, to) {
            (Initiated, Validated) if ctx.return_type() == ReturnType::Purchase => {
                if ctx.details.rma_number().is_none() {
                    return Err("supplier RMA number is missing");
                }
            }
            (ItemsReceived, InspectionPending) if ctx.return_type() != ReturnType::Rental => {
                if !quality_check {
                    return Err("no quality check is required");
                }
            }
            (ItemsReceived, RefundApproved) => {
                if quality_check {
                    return Err("quality check is required");
                }
            }
            (InspectionPending, InspectionComplete) => {
                if !ctx.inspection_completed {
                    return Err("inspection has not been completed");
                }
            }
            (RefundApproved, RefundProcessed) => {
                if ctx.refund_reference.map_or(true, |r| r.trim().is_empty()) {
                    return Err("refund reference is missing");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Ordered side effects of entering `to`.
    ///
    /// Returned stock is booked by `create_return`, or queued for
    /// reconciliation there. `UpdateInventory` on completion only announces
    /// that the return's stock is final and never moves quantities.
    pub fn actions_for(return_type: ReturnType, to: ReturnWorkflowState) -> Vec<WorkflowAction> {
        let notify = |template: &str| WorkflowAction::SendNotification {
            template: template.to_string(),
        };
        match to {
            Initiated => Vec::new(),
            Validated => vec![notify("return_validated")],
            ItemsReceived => vec![notify("return_items_received")],
            InspectionPending => vec![WorkflowAction::CreateTask {
                kind: ReturnTaskKind::Inspection,
            }],
            InspectionComplete => vec![notify("return_inspection_complete")],
            RefundApproved => {
                let kind = match return_type {
                    ReturnType::Sale => ReturnTaskKind::Refund,
                    ReturnType::Purchase => ReturnTaskKind::SupplierFollowUp,
                    ReturnType::Rental => ReturnTaskKind::DepositRefund,
                };
                vec![WorkflowAction::CreateTask { kind }]
            }
            RefundProcessed => vec![notify("return_refund_processed")],
            Completed => vec![WorkflowAction::UpdateInventory, notify("return_completed")],
            Cancelled => vec![notify("return_cancelled")],
        }
    }

    /// Checks the table and guards, yielding the actions to run.
    pub fn plan_transition(
        &self,
        ctx: &WorkflowContext<'_>,
        from: ReturnWorkflowState,
        to: ReturnWorkflowState,
    ) -> Result<TransitionPlan, ServiceError> {
        let return_type = ctx.return_type();
        if !Self::is_listed(return_type, from, to) {
            return Err(ServiceError::ValidationError(format!(
                "Invalid {} return workflow transition {} → {}",
                return_type, from, to
            )));
        }
        Self::check_guard(ctx, from, to).map_err(|reason| {
            ServiceError::ValidationError(format!(
                "Return workflow transition {} → {} not allowed: {}",
                from, to, reason
            ))
        })?;

        Ok(TransitionPlan {
            from,
            to,
            actions: Self::actions_for(return_type, to),
        })
    }

    /// States reachable from `from` under the guards that depend only on the
    /// stored return. Request-supplied facts (inspection done, refund
    /// reference) are assumed to be provided.
    pub fn allowed_next_states(
        &self,
        details: &ReturnDetails,
        from: ReturnWorkflowState,
    ) -> Vec<ReturnWorkflowState> {
        let ctx = WorkflowContext {
            details,
            inspection_completed: true,
            refund_reference: Some("pending"),
        };
        [
            Validated,
            ItemsReceived,
            InspectionPending,
            InspectionComplete,
            RefundApproved,
            RefundProcessed,
            Completed,
            Cancelled,
        ]
        .into_iter()
        .filter(|to| self.plan_transition(&ctx, from, *to).is_ok())
        .collect()
    }

    /// Persists the plan's tasks and history row on `txn`; returns the events
    /// to publish once the transaction commits.
    #[instrument(skip(self, txn, plan), fields(from = %plan.from, to = %plan.to))]
    pub async fn execute_actions(
        &self,
        txn: &DatabaseTransaction,
        return_id: Uuid,
        plan: &TransitionPlan,
        performed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<Vec<Event>, ServiceError> {
        let now = Utc::now();
        let mut events = Vec::new();

        // Leaving an inspection or refund stage closes its open tasks.
        let closes = match plan.to {
            InspectionComplete => vec![ReturnTaskKind::Inspection],
            RefundProcessed => vec![
                ReturnTaskKind::Refund,
                ReturnTaskKind::DepositRefund,
                ReturnTaskKind::SupplierFollowUp,
            ],
            Cancelled => vec![
                ReturnTaskKind::Inspection,
                ReturnTaskKind::Refund,
                ReturnTaskKind::DepositRefund,
                ReturnTaskKind::SupplierFollowUp,
            ],
            _ => Vec::new(),
        };
        if !closes.is_empty() {
            ReturnTask::update_many()
                .col_expr(return_task::Column::Status, Expr::value(return_task::STATUS_DONE))
                .col_expr(return_task::Column::UpdatedAt, Expr::value(now))
                .filter(return_task::Column::ReturnId.eq(return_id))
                .filter(return_task::Column::Status.eq(return_task::STATUS_OPEN))
                .filter(return_task::Column::Kind.is_in(closes))
                .exec(txn)
                .await?;
        }

        for action in &plan.actions {
            match action {
                WorkflowAction::CreateTask { kind } => {
                    let task = return_task::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        return_id: Set(return_id),
                        kind: Set(*kind),
                        status: Set(return_task::STATUS_OPEN.to_string()),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await?;
                    debug!(task_id = %task.id, kind = %kind, "Return task created");
                    events.push(Event::ReturnTaskCreated {
                        return_id,
                        task_id: task.id,
                        kind: *kind,
                    });
                }
                WorkflowAction::UpdateInventory => {
                    events.push(Event::ReturnInventoryReleased { return_id });
                }
                WorkflowAction::SendNotification { template } => {
                    events.push(Event::ReturnNotificationRequested {
                        return_id,
                        template: template.clone(),
                    });
                }
            }
        }

        record_history(
            txn,
            return_id,
            Some(plan.from),
            plan.to,
            &plan.actions,
            performed_by,
            notes,
        )
        .await?;

        events.insert(
            0,
            Event::ReturnWorkflowAdvanced {
                return_id,
                from: plan.from,
                to: plan.to,
            },
        );
        Ok(events)
    }
}

pub async fn record_history(
    txn: &DatabaseTransaction,
    return_id: Uuid,
    from_state: Option<ReturnWorkflowState>,
    to_state: ReturnWorkflowState,
    actions: &[WorkflowAction],
    performed_by: Option<Uuid>,
    notes: Option<String>,
) -> Result<return_workflow_history::Model, ServiceError> {
    Ok(return_workflow_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        return_id: Set(return_id),
        from_state: Set(from_state),
        to_state: Set(to_state),
        actions: Set(serde_json::to_string(actions)?),
        performed_by: Set(performed_by),
        notes: Set(notes),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?)
}
