//! HTTP surface tests: health probes, OpenAPI document, request ids, the
//! error envelope and transaction endpoints.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn health_reports_database_and_reconciliation_queue() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["details"]["database"]["status"], "up");
    assert_eq!(body["details"]["stock_reconciliation"]["status"], "up");
    assert_eq!(body["details"]["stock_reconciliation"]["message"], "0 pending");

    let response = app.request(Method::GET, "/health/ready", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.request(Method::GET, "/health/live", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["info"]["title"], "RentOps API");
    assert!(body["paths"]["/api/v1/returns"].is_object());
    assert!(body["paths"]["/api/v1/rentals/{id}/extend"].is_object());
}

#[tokio::test]
async fn request_id_is_echoed_into_errors() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/transactions/{}", missing))
        .header("x-request-id", "req-test-42")
        .body(Body::empty())
        .expect("request");
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-test-42")
    );
    let body = response_json(response).await;
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["request_id"], "req-test-42");
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains(&missing.to_string()));
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    assert!(generated.is_some_and(|id| !id.is_empty()));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "rentops-api");
}

#[tokio::test]
async fn transaction_can_be_created_and_fetched() {
    let app = TestApp::new().await;
    let item_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "transaction_type": "SALE",
                "status": "COMPLETED",
                "customer_id": Uuid::new_v4(),
                "lines": [
                    { "item_id": item_id, "description": "Drill", "quantity": 2, "unit_price": "12.50" },
                    { "item_id": Uuid::new_v4(), "description": "Bits", "quantity": 1, "unit_price": "5.00" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let id = body["data"]["id"].as_str().expect("id").to_string();
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(30.00));
    assert!(body["data"]["transaction_number"]
        .as_str()
        .unwrap_or_default()
        .starts_with("SAL-"));

    let response = app
        .request(Method::GET, &format!("/api/v1/transactions/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"]["lines"][0]["item_id"], item_id.to_string());
}

#[tokio::test]
async fn transaction_without_lines_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({ "transaction_type": "SALE", "lines": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unprocessable Entity");
}

#[tokio::test]
async fn oversized_money_and_quantities_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "transaction_type": "SALE",
                "lines": [
                    { "item_id": Uuid::new_v4(), "description": "Crane", "quantity": 2, "unit_price": "79228162514264337593543950335" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    let details = body["details"].to_string();
    assert!(details.contains("unit_price: Amount cannot exceed"), "{}", details);

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "transaction_type": "SALE",
                "lines": [
                    { "item_id": Uuid::new_v4(), "description": "Crane", "quantity": 2147483647, "unit_price": "1000000000000000" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
