use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use utoipa::ToSchema;

use crate::{
    entities::stock_reconciliation_task,
    handlers::AppState,
    models::ReconciliationStatus,
};

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Degraded,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    /// Rental stock updates waiting for the reconciliation worker
    pub stock_reconciliation: ComponentHealth,
}

/// Full health check response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub details: HealthDetails,
    pub response_time_ms: u64,
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Call once on startup so uptime is measured from boot.
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/ready", get(readiness_check))
}

/// Liveness probe; only proves the process answers.
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe; the database must answer.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    match crate::db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "database": { "status": "up" } },
                "response_time_ms": start.elapsed().as_millis() as u64
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "database": { "status": "down", "error": e.to_string() } },
                "response_time_ms": start.elapsed().as_millis() as u64
            })),
        ),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "Health check",
    description = "Database connectivity and the depth of the stock reconciliation queue",
    responses(
        (status = 200, description = "Service up or degraded", body = HealthResponse),
        (status = 503, description = "Database unavailable", body = HealthResponse),
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let db_started = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let database = ComponentHealth {
        status: if db_result.is_ok() {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        message: db_result.as_ref().map_or_else(
            |e| format!("Connection failed: {}", e),
            |_| "Connection successful".to_string(),
        ),
        latency_ms: Some(db_started.elapsed().as_millis() as u64),
    };

    let stock_reconciliation = if db_result.is_ok() {
        reconciliation_health(&state).await
    } else {
        ComponentHealth {
            status: ComponentStatus::Down,
            message: "Database unavailable".to_string(),
            latency_ms: None,
        }
    };

    let status = match (database.status, stock_reconciliation.status) {
        (ComponentStatus::Down, _) => ComponentStatus::Down,
        (_, ComponentStatus::Up) => ComponentStatus::Up,
        _ => ComponentStatus::Degraded,
    };
    let code = if status == ComponentStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        details: HealthDetails {
            database,
            stock_reconciliation,
        },
        response_time_ms: start.elapsed().as_millis() as u64,
    };

    (code, Json(response))
}

async fn reconciliation_health(state: &AppState) -> ComponentHealth {
    let started = Instant::now();
    let counts = futures::try_join!(
        stock_reconciliation_task::Entity::find()
            .filter(stock_reconciliation_task::Column::Status.eq(ReconciliationStatus::Pending))
            .count(state.db.as_ref()),
        stock_reconciliation_task::Entity::find()
            .filter(stock_reconciliation_task::Column::Status.eq(ReconciliationStatus::Failed))
            .count(state.db.as_ref()),
    );
    let latency_ms = Some(started.elapsed().as_millis() as u64);

    match counts {
        Ok((pending, 0)) => ComponentHealth {
            status: ComponentStatus::Up,
            message: format!("{} pending", pending),
            latency_ms,
        },
        Ok((pending, failed)) => ComponentHealth {
            status: ComponentStatus::Degraded,
            message: format!("{} pending, {} failed", pending, failed),
            latency_ms,
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Degraded,
            message: format!("Queue check failed: {}", e),
            latency_ms,
        },
    }
}
