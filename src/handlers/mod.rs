pub mod health;
pub mod rentals;
pub mod returns;
pub mod transactions;

use crate::{
    config::ReturnPolicyConfig,
    db::DbPool,
    events::EventSender,
    services::{
        fee_calculator::{FeeCalculator, FeePolicy},
        inventory::{InventoryLedger, SeaOrmInventoryLedger},
        rental_lifecycle::RentalLifecycleService,
        returns::ReturnService,
        transactions::TransactionService,
    },
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub transactions: Arc<TransactionService>,
    pub rentals: Arc<RentalLifecycleService>,
    pub returns: Arc<ReturnService>,
    pub ledger: Arc<dyn InventoryLedger>,
}

impl AppServices {
    /// Services backed by the database stock ledger.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        policy: &ReturnPolicyConfig,
    ) -> Self {
        Self::with_ledger(db_pool, event_sender, policy, Arc::new(SeaOrmInventoryLedger))
    }

    pub fn with_ledger(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        policy: &ReturnPolicyConfig,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Self {
        let transactions = Arc::new(TransactionService::new(
            db_pool.clone(),
            event_sender.clone(),
            ledger.clone(),
        ));
        let rentals = Arc::new(RentalLifecycleService::new(
            db_pool.clone(),
            event_sender.clone(),
            ledger.clone(),
            FeeCalculator::new(FeePolicy::from(policy)),
        ));
        let returns = Arc::new(ReturnService::new(
            db_pool,
            event_sender,
            policy.clone(),
            ledger.clone(),
        ));

        Self {
            transactions,
            rentals,
            returns,
            ledger,
        }
    }
}

/// `?as_of=YYYY-MM-DD`, defaulting to today.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

impl AsOfQuery {
    pub fn date(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}
