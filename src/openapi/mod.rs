use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RentOps API",
        version = "0.3.0",
        description = r#"
# RentOps Rental & Returns API

Transactions, rental lifecycles and returns for a rental-and-retail inventory system.

## Features

- **Transactions**: Sales, purchases, rentals and stock adjustments
- **Rental Lifecycle**: Status tracking, overdue detection, extensions, partial returns and inspections
- **Returns**: Sale, purchase and rental returns with type-specific validation, refunds and fees
- **Return Workflow**: Per-type state machine with tasks, notifications and audit history
- **Inventory**: Stock movements with background reconciliation of failed rental restocks

## Error Handling

Errors share one envelope and carry the request id from the `X-Request-Id` header:

```json
{
  "error": "Unprocessable Entity",
  "message": "Return window of 30 days has expired (45 days since sale)",
  "request_id": "req-abc123xyz",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, capped by configuration).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Transactions", description = "Transaction records and stock effects"),
        (name = "Rentals", description = "Rental lifecycle endpoints"),
        (name = "Returns", description = "Return processing and workflow endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Transactions
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::get_transaction,

        // Rentals
        crate::handlers::rentals::get_rental_status,
        crate::handlers::rentals::update_rental_status,
        crate::handlers::rentals::calculate_fees,
        crate::handlers::rentals::estimate_extension,
        crate::handlers::rentals::extend_rental,
        crate::handlers::rentals::list_return_events,
        crate::handlers::rentals::process_rental_return,
        crate::handlers::rentals::record_inspection,
        crate::handlers::rentals::complete_return_event,
        crate::handlers::rentals::scan_overdue,

        // Returns
        crate::handlers::returns::validate_return,
        crate::handlers::returns::create_return,
        crate::handlers::returns::list_returns,
        crate::handlers::returns::get_return,
        crate::handlers::returns::get_workflow,
        crate::handlers::returns::advance_workflow,
        crate::handlers::returns::record_supplier_credit,

        // Health
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::models::ReturnDetails,
            crate::models::FinancialBreakdown,
            crate::models::WorkflowAction,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
