use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    ReturnEventType, ReturnTaskKind, ReturnType, ReturnWorkflowState, RentalStatus,
    StockMovementType, TransactionType,
};

/// Domain events published after a database transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TransactionCreated {
        transaction_id: Uuid,
        transaction_type: TransactionType,
    },
    ReturnCreated {
        return_id: Uuid,
        original_transaction_id: Uuid,
        return_type: ReturnType,
    },
    ReturnWorkflowAdvanced {
        return_id: Uuid,
        from: ReturnWorkflowState,
        to: ReturnWorkflowState,
    },
    ReturnTaskCreated {
        return_id: Uuid,
        task_id: Uuid,
        kind: ReturnTaskKind,
    },
    ReturnNotificationRequested {
        return_id: Uuid,
        template: String,
    },
    ReturnInventoryReleased {
        return_id: Uuid,
    },
    SupplierCreditRecorded {
        return_id: Uuid,
        memo_id: Uuid,
    },
    RentalStatusChanged {
        transaction_id: Uuid,
        from: RentalStatus,
        to: RentalStatus,
    },
    RentalReturnRecorded {
        transaction_id: Uuid,
        event_id: Uuid,
        event_type: ReturnEventType,
    },
    RentalExtended {
        transaction_id: Uuid,
        new_end_date: NaiveDate,
    },
    StockAdjusted {
        item_id: Uuid,
        location_id: Uuid,
        delta: i32,
        movement_type: StockMovementType,
    },
    StockReconciliationQueued {
        task_id: Uuid,
        return_id: Uuid,
    },
    StockReconciled {
        task_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends every event, logging failures. Used once the owning write is committed.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.send(event).await {
                error!("{}", e);
            }
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ReturnCreated {
                return_id,
                original_transaction_id,
                return_type,
            } => {
                info!(%return_id, %original_transaction_id, %return_type, "Return created");
            }
            Event::ReturnWorkflowAdvanced { return_id, from, to } => {
                info!(%return_id, %from, %to, "Return workflow advanced");
            }
            Event::ReturnNotificationRequested { return_id, template } => {
                info!(%return_id, template = %template, "Return notification queued");
            }
            Event::RentalStatusChanged {
                transaction_id,
                from,
                to,
            } => {
                info!(%transaction_id, %from, %to, "Rental status changed");
            }
            Event::ReturnInventoryReleased { return_id } => {
                info!(%return_id, "Return stock finalized");
            }
            Event::StockReconciliationQueued { task_id, return_id } => {
                warn!(%task_id, %return_id, "Stock update deferred to reconciliation");
            }
            other => {
                info!(event = ?other, "Event processed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_all_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        sender
            .publish_all(vec![
                Event::StockReconciled { task_id: a },
                Event::StockReconciled { task_id: b },
            ])
            .await;

        assert_eq!(rx.recv().await, Some(Event::StockReconciled { task_id: a }));
        assert_eq!(rx.recv().await, Some(Event::StockReconciled { task_id: b }));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let err = sender
            .send(Event::StockReconciled {
                task_id: Uuid::nil(),
            })
            .await
            .unwrap_err();
        assert!(err.starts_with("Failed to send event"));
    }
}
