use super::AsOfQuery;
use crate::{
    errors::ServiceError,
    models::rental::{
        CompleteReturnEventRequest, ExtendRentalRequest, InspectionRequest, RentalReturnRequest,
        UpdateRentalStatusRequest,
    },
    services::{
        fee_calculator::{ExtensionEstimate, RentalFeeSummary},
        rental_lifecycle::{
            ExtensionResult, InspectionView, OverdueScanReport, RentalReturnEventView,
            RentalStatusView,
        },
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExtensionEstimateQuery {
    /// Proposed new end date
    pub new_end_date: NaiveDate,
}

pub fn rentals_routes() -> Router<AppState> {
    Router::new()
        .route("/overdue-scan", post(scan_overdue))
        .route("/return-events/:event_id/inspections", post(record_inspection))
        .route("/return-events/:event_id/complete", post(complete_return_event))
        .route("/:id/status", get(get_rental_status).put(update_rental_status))
        .route("/:id/fees", get(calculate_fees))
        .route("/:id/extension-estimate", get(estimate_extension))
        .route("/:id/extend", post(extend_rental))
        .route(
            "/:id/return-events",
            get(list_return_events).post(process_rental_return),
        )
}

#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}/status",
    summary = "Get rental status",
    description = "Lifecycle status together with the aggregate derived from the rental lines",
    params(
        ("id" = Uuid, Path, description = "Rental transaction id"),
        AsOfQuery
    ),
    responses(
        (status = 200, description = "Rental status", body = ApiResponse<RentalStatusView>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not a rental", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn get_rental_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<RentalStatusView> {
    let view = state
        .services
        .rentals
        .get_rental_status(id, query.date())
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    put,
    path = "/api/v1/rentals/{id}/status",
    summary = "Change rental status",
    params(("id" = Uuid, Path, description = "Rental transaction id")),
    request_body = UpdateRentalStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<RentalStatusView>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn update_rental_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRentalStatusRequest>,
) -> ApiResult<RentalStatusView> {
    let view = state
        .services
        .rentals
        .update_rental_status(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}/fees",
    summary = "Calculate rental fees",
    params(
        ("id" = Uuid, Path, description = "Rental transaction id"),
        AsOfQuery
    ),
    responses(
        (status = 200, description = "Fee summary", body = ApiResponse<RentalFeeSummary>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn calculate_fees(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<RentalFeeSummary> {
    let summary = state
        .services
        .rentals
        .calculate_fees(id, query.date())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}/extension-estimate",
    summary = "Estimate an extension",
    params(
        ("id" = Uuid, Path, description = "Rental transaction id"),
        ExtensionEstimateQuery
    ),
    responses(
        (status = 200, description = "Extension estimate", body = ApiResponse<ExtensionEstimate>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invalid end date", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn estimate_extension(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExtensionEstimateQuery>,
) -> ApiResult<ExtensionEstimate> {
    let estimate = state
        .services
        .rentals
        .estimate_extension(id, query.new_end_date)
        .await?;
    Ok(Json(ApiResponse::success(estimate)))
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/{id}/extend",
    summary = "Extend a rental",
    params(("id" = Uuid, Path, description = "Rental transaction id")),
    request_body = ExtendRentalRequest,
    responses(
        (status = 200, description = "Rental extended", body = ApiResponse<ExtensionResult>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Extension not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn extend_rental(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExtendRentalRequest>,
) -> ApiResult<ExtensionResult> {
    let result = state.services.rentals.extend_rental(id, payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}/return-events",
    summary = "List rental return events",
    params(("id" = Uuid, Path, description = "Rental transaction id")),
    responses(
        (status = 200, description = "Return events", body = ApiResponse<Vec<RentalReturnEventView>>),
    ),
    tag = "Rentals"
)]
pub async fn list_return_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<RentalReturnEventView>> {
    let events = state.services.rentals.list_return_events(id).await?;
    Ok(Json(ApiResponse::success(events)))
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/{id}/return-events",
    summary = "Record a rental return",
    description = "Records a full or partial return of rented items",
    params(("id" = Uuid, Path, description = "Rental transaction id")),
    request_body = RentalReturnRequest,
    responses(
        (status = 201, description = "Return event recorded", body = ApiResponse<RentalReturnEventView>),
        (status = 404, description = "Rental not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Return rejected", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn process_rental_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RentalReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RentalReturnEventView>>), ServiceError> {
    let event = state
        .services
        .rentals
        .process_rental_return(id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/return-events/{event_id}/inspections",
    summary = "Record an item inspection",
    params(("event_id" = Uuid, Path, description = "Return event id")),
    request_body = InspectionRequest,
    responses(
        (status = 201, description = "Inspection recorded", body = ApiResponse<InspectionView>),
        (status = 404, description = "Return event not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Inspection rejected", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn record_inspection(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<InspectionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InspectionView>>), ServiceError> {
    let inspection = state
        .services
        .rentals
        .record_inspection(event_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(inspection))))
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/return-events/{event_id}/complete",
    summary = "Complete a return event",
    description = "Settles payment, restocks inspected items and updates the rental",
    params(("event_id" = Uuid, Path, description = "Return event id")),
    request_body = CompleteReturnEventRequest,
    responses(
        (status = 200, description = "Return event completed", body = ApiResponse<RentalReturnEventView>),
        (status = 404, description = "Return event not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already completed", body = crate::errors::ErrorResponse),
    ),
    tag = "Rentals"
)]
pub async fn complete_return_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<CompleteReturnEventRequest>,
) -> ApiResult<RentalReturnEventView> {
    let event = state
        .services
        .rentals
        .complete_return_event(event_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(event)))
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/overdue-scan",
    summary = "Mark overdue rentals",
    params(AsOfQuery),
    responses(
        (status = 200, description = "Scan report", body = ApiResponse<OverdueScanReport>),
    ),
    tag = "Rentals"
)]
pub async fn scan_overdue(
    State(state): State<AppState>,
    Query(query): Query<AsOfQuery>,
) -> ApiResult<OverdueScanReport> {
    let report = state
        .services
        .rentals
        .mark_overdue_rentals(query.date())
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
