use crate::{
    errors::ServiceError,
    models::{
        returns::{
            CreditMemoView, ReturnListFilter, ReturnSummary, SupplierCreditRequest,
            WorkflowTransitionRequest, WorkflowView,
        },
        CreateReturnRequest, ReturnDetailsView, ReturnType, ReturnValidationResult,
        ReturnWorkflowState,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default, IntoParams)]
pub struct ReturnListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (clamped to the configured maximum)
    pub limit: Option<u64>,
    pub return_type: Option<ReturnType>,
    pub workflow_state: Option<ReturnWorkflowState>,
}

pub fn returns_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_returns).post(create_return))
        .route("/validate", post(validate_return))
        .route("/:id", get(get_return))
        .route("/:id/workflow", get(get_workflow).post(advance_workflow))
        .route("/:id/credit-memo", post(record_supplier_credit))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/validate",
    summary = "Validate a return",
    description = "Runs every check for a return without writing anything and estimates refund and fees",
    request_body = CreateReturnRequest,
    responses(
        (status = 200, description = "Validation result", body = ApiResponse<ReturnValidationResult>),
        (status = 404, description = "Original transaction not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Malformed request", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn validate_return(
    State(state): State<AppState>,
    Json(payload): Json<CreateReturnRequest>,
) -> ApiResult<ReturnValidationResult> {
    let result = state.return_service().validate_return(&payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns",
    summary = "Create return",
    description = "Records a sale, purchase or rental return against its original transaction",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return created", body = ApiResponse<ReturnDetailsView>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Original transaction not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Return rejected", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    Json(payload): Json<CreateReturnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnDetailsView>>), ServiceError> {
    let created = state.return_service().create_return(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns",
    summary = "List returns",
    params(ReturnListQuery),
    responses(
        (status = 200, description = "Returns retrieved", body = ApiResponse<PaginatedResponse<ReturnSummary>>),
    ),
    tag = "Returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<PaginatedResponse<ReturnSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.page_size(query.limit);
    let filter = ReturnListFilter {
        return_type: query.return_type,
        workflow_state: query.workflow_state,
    };

    let (items, total) = state
        .return_service()
        .list_returns(filter, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns/{id}",
    summary = "Get return",
    params(("id" = Uuid, Path, description = "Return transaction id")),
    responses(
        (status = 200, description = "Return retrieved", body = ApiResponse<ReturnDetailsView>),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnDetailsView> {
    let details = state.return_service().get_return_details(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns/{id}/workflow",
    summary = "Get return workflow",
    description = "Current state, allowed next states, history and open tasks",
    params(("id" = Uuid, Path, description = "Return transaction id")),
    responses(
        (status = 200, description = "Workflow retrieved", body = ApiResponse<WorkflowView>),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkflowView> {
    let workflow = state.return_service().get_workflow(id).await?;
    Ok(Json(ApiResponse::success(workflow)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/workflow",
    summary = "Advance return workflow",
    params(("id" = Uuid, Path, description = "Return transaction id")),
    request_body = WorkflowTransitionRequest,
    responses(
        (status = 200, description = "Transition applied", body = ApiResponse<WorkflowView>),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn advance_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowTransitionRequest>,
) -> ApiResult<WorkflowView> {
    let workflow = state.return_service().advance_workflow(id, payload).await?;
    Ok(Json(ApiResponse::success(workflow)))
}

#[utoipa::path(
    post,
    path = "/api/v1/returns/{id}/credit-memo",
    summary = "Record supplier credit memo",
    params(("id" = Uuid, Path, description = "Purchase return id")),
    request_body = SupplierCreditRequest,
    responses(
        (status = 201, description = "Credit memo recorded", body = ApiResponse<CreditMemoView>),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Credit memo already recorded", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not a purchase return", body = crate::errors::ErrorResponse),
    ),
    tag = "Returns"
)]
pub async fn record_supplier_credit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierCreditRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreditMemoView>>), ServiceError> {
    let memo = state
        .return_service()
        .record_supplier_credit(id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(memo))))
}
