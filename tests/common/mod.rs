#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use rentops_api::{
    config::AppConfig,
    db,
    events::{self, EventSender},
    models::transaction::{CreateTransactionLine, CreateTransactionRequest, TransactionView},
    models::{RentalPeriodUnit, TransactionStatus, TransactionType},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application state and router backed by a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection so every query sees the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let router = rentops_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// A completed sale of `quantity` units at `unit_price`, dated `days_ago`.
    pub async fn seed_sale(&self, unit_price: Decimal, quantity: i32, days_ago: i64) -> TransactionView {
        let mut request = base_request(TransactionType::Sale, unit_price, quantity);
        request.transaction_date = Some(Utc::now() - Duration::days(days_ago));
        request.customer_id = Some(Uuid::new_v4());
        self.create(request).await
    }

    pub async fn seed_purchase(&self, unit_price: Decimal, quantity: i32) -> TransactionView {
        let mut request = base_request(TransactionType::Purchase, unit_price, quantity);
        request.supplier_id = Some(Uuid::new_v4());
        self.create(request).await
    }

    /// An in-progress rental with one line per `(unit_price, quantity)` pair.
    pub async fn seed_rental(
        &self,
        lines: &[(Decimal, i32)],
        start: NaiveDate,
        end: NaiveDate,
        deposit: Decimal,
    ) -> TransactionView {
        let mut request = base_request(TransactionType::Rental, Decimal::ZERO, 1);
        request.status = TransactionStatus::InProgress;
        request.customer_id = Some(Uuid::new_v4());
        request.rental_start_date = Some(start);
        request.rental_end_date = Some(end);
        request.rental_period_unit = Some(RentalPeriodUnit::Day);
        request.deposit_amount = deposit;
        request.lines = lines
            .iter()
            .enumerate()
            .map(|(idx, (price, qty))| line(format!("Rental item {}", idx + 1), *price, *qty))
            .collect();
        self.create(request).await
    }

    async fn create(&self, request: CreateTransactionRequest) -> TransactionView {
        self.state
            .services
            .transactions
            .create_transaction(request)
            .await
            .expect("seed transaction")
    }
}

fn line(description: String, unit_price: Decimal, quantity: i32) -> CreateTransactionLine {
    CreateTransactionLine {
        item_id: Uuid::new_v4(),
        inventory_unit_id: None,
        serial_number: None,
        location_id: None,
        description,
        quantity,
        unit_price,
        discount_amount: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        rental_start_date: None,
        rental_end_date: None,
        rental_period: None,
    }
}

fn base_request(
    transaction_type: TransactionType,
    unit_price: Decimal,
    quantity: i32,
) -> CreateTransactionRequest {
    CreateTransactionRequest {
        transaction_type,
        status: TransactionStatus::Completed,
        transaction_date: None,
        customer_id: None,
        supplier_id: None,
        location_id: None,
        discount_amount: Decimal::ZERO,
        paid_amount: Decimal::ZERO,
        deposit_amount: Decimal::ZERO,
        customer_advance_balance: Decimal::ZERO,
        rental_start_date: None,
        rental_end_date: None,
        rental_period: None,
        rental_period_unit: None,
        notes: None,
        lines: vec![line("Test item".to_string(), unit_price, quantity)],
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized as a JSON string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
