use crate::{
    errors::ServiceError,
    models::transaction::{CreateTransactionRequest, TransactionView},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

pub fn transactions_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_transaction))
        .route("/:id", get(get_transaction))
}

#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    summary = "Create transaction",
    description = "Records a sale, purchase, rental or adjustment and applies its stock movements",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created", body = ApiResponse<TransactionView>),
        (status = 400, description = "Unsupported transaction type", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionView>>), ServiceError> {
    let created = state
        .services
        .transactions
        .create_transaction(payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    summary = "Get transaction",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction with its lines", body = ApiResponse<TransactionView>),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TransactionView> {
    let view = state.services.transactions.get_transaction(id).await?;
    Ok(Json(ApiResponse::success(view)))
}
