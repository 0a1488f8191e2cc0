//! Integration tests for the rental lifecycle endpoints and rental check-in
//! through the unified return flow.

mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use common::{decimal, response_json, today, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn call(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = app.request(method, uri, body).await;
    let status = response.status();
    (status, response_json(response).await)
}

#[tokio::test]
async fn new_rental_starts_active() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(100.00), 1)],
            today() - Duration::days(2),
            today() + Duration::days(3),
            dec!(50.00),
        )
        .await;

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let view = &body["data"];
    assert_eq!(view["status"], "ACTIVE");
    assert_eq!(view["aggregate"]["current_rental_status"], "ACTIVE");
    assert_eq!(view["aggregate"]["is_overdue"], false);
    assert_eq!(view["aggregate"]["days_overdue"], 0);
    assert_eq!(decimal(&view["total_fees"]), dec!(0));
}

#[tokio::test]
async fn status_of_a_sale_is_rejected() {
    let app = TestApp::new().await;
    let sale = app.seed_sale(dec!(10.00), 1, 0).await;

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", sale.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn partial_then_full_return_completes_after_inspection() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(100.00), 1), (dec!(50.00), 2)],
            today() - Duration::days(2),
            today() + Duration::days(3),
            dec!(100.00),
        )
        .await;
    let first_line = rental.lines[0].id.to_string();
    let second_line = rental.lines[1].id.to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        Some(json!({
            "return_date": today().to_string(),
            "items": [{ "line_id": first_line, "quantity": 1, "condition": "GOOD" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["event_type"], "PARTIAL_RETURN");
    assert_eq!(body["data"]["total_quantity_returned"], 1);

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "PARTIAL_RETURN");
    assert_eq!(body["data"]["aggregate"]["current_rental_status"], "PARTIAL_RETURN");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        Some(json!({
            "return_date": today().to_string(),
            "items": [{ "line_id": second_line, "quantity": 2, "condition": "FAIR" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["event_type"], "FULL_RETURN");
    let event_id = body["data"]["id"].as_str().expect("event id").to_string();

    // Moderate damage on 2 x 50.00: a quarter of the value plus the cleaning fee.
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/return-events/{}/inspections", event_id),
        Some(json!({
            "transaction_line_id": second_line,
            "condition": "FAIR",
            "damage_severity": "MODERATE",
            "damage_description": "Scratched casing"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["has_damage"], true);
    assert_eq!(decimal(&body["data"]["damage_fee_assessed"]), dec!(25.00));
    assert_eq!(decimal(&body["data"]["cleaning_fee_assessed"]), dec!(25.00));

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/return-events/{}/inspections", event_id),
        Some(json!({ "transaction_line_id": second_line, "condition": "FAIR" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/return-events/{}/complete", event_id),
        Some(json!({ "payment_collected": "0", "refund_issued": "50.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["completed"], true);
    assert_eq!(decimal(&body["data"]["damage_fees_charged"]), dec!(25.00));

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    let view = &body["data"];
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["aggregate"]["current_rental_status"], "COMPLETED");
    assert_eq!(view["actual_return_date"], today().to_string());
    assert_eq!(decimal(&view["total_damage_fees"]), dec!(25.00));
    assert_eq!(decimal(&view["total_other_fees"]), dec!(25.00));

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/return-events/{}/complete", event_id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let original = app
        .state
        .services
        .transactions
        .get_transaction(rental.id)
        .await
        .expect("rental");
    assert_eq!(original.status.to_string(), "COMPLETED");

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn returning_more_than_rented_is_rejected() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(20.00), 1)],
            today() - Duration::days(1),
            today() + Duration::days(1),
            dec!(0),
        )
        .await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        Some(json!({
            "return_date": today().to_string(),
            "items": [{ "line_id": rental.lines[0].id, "quantity": 3 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"][0]
        .as_str()
        .unwrap_or_default()
        .contains("exceeds remaining quantity 1"));
}

#[tokio::test]
async fn extension_moves_rental_to_extended_and_charges_fee() {
    let app = TestApp::new().await;
    let start = today() - Duration::days(2);
    let end = today() + Duration::days(3);
    // 100.00 over five days is 20.00 a day.
    let rental = app.seed_rental(&[(dec!(100.00), 1)], start, end, dec!(0)).await;
    let new_end = end + Duration::days(2);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!(
            "/api/v1/rentals/{}/extension-estimate?new_end_date={}",
            rental.id, new_end
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let estimate = &body["data"];
    assert_eq!(estimate["extension_days"], 2);
    assert_eq!(decimal(&estimate["daily_rate"]), dec!(20.00));
    assert_eq!(decimal(&estimate["extension_cost"]), dec!(40.00));
    assert_eq!(decimal(&estimate["extension_fee"]), dec!(4.00));

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/extend", rental.id),
        Some(json!({ "new_end_date": new_end.to_string(), "reason": "Project overrun" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "EXTENDED");

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["expected_return_date"], new_end.to_string());
    assert_eq!(body["data"]["aggregate"]["current_rental_status"], "EXTENDED");
    assert_eq!(decimal(&body["data"]["total_other_fees"]), dec!(4.00));

    // An end date that does not move forward is rejected.
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/extend", rental.id),
        Some(json!({ "new_end_date": end.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn overdue_scan_marks_only_past_due_rentals() {
    let app = TestApp::new().await;
    let overdue = app
        .seed_rental(
            &[(dec!(60.00), 1)],
            today() - Duration::days(10),
            today() - Duration::days(2),
            dec!(0),
        )
        .await;
    let current = app
        .seed_rental(
            &[(dec!(60.00), 1)],
            today() - Duration::days(1),
            today() + Duration::days(5),
            dec!(0),
        )
        .await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/overdue-scan?as_of={}", today()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report = &body["data"];
    assert_eq!(report["scanned"], 1);
    assert_eq!(report["marked"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["marked"][0]["transaction_id"], overdue.id.to_string());
    assert_eq!(report["marked"][0]["from"], "ACTIVE");
    assert_eq!(report["marked"][0]["to"], "LATE");

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", overdue.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "LATE");
    assert_eq!(body["data"]["aggregate"]["is_overdue"], true);
    assert_eq!(body["data"]["aggregate"]["days_overdue"], 2);

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", current.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "ACTIVE");

    // A second scan leaves a rental that is already late alone.
    let report = app
        .state
        .services
        .rentals
        .mark_overdue_rentals(today())
        .await
        .expect("scan");
    assert!(report.marked.is_empty());
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn rental_returned_on_time_is_not_marked_overdue() {
    let app = TestApp::new().await;
    let end = today() - Duration::days(2);
    let rental = app
        .seed_rental(&[(dec!(60.00), 1)], today() - Duration::days(10), end, dec!(0))
        .await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        Some(json!({
            "return_date": end.to_string(),
            "items": [{ "line_id": rental.lines[0].id, "quantity": 1, "condition": "GOOD" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["event_type"], "FULL_RETURN");

    // The event is still waiting for inspection when the scan runs.
    let report = app
        .state
        .services
        .rentals
        .mark_overdue_rentals(today())
        .await
        .expect("scan");
    assert_eq!(report.scanned, 1);
    assert!(report.marked.is_empty());
    assert_eq!(report.skipped, 1);

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "ACTIVE");
}

#[tokio::test]
async fn late_fees_stop_at_the_return_date() {
    let app = TestApp::new().await;
    let end = today() - Duration::days(20);
    let rental = app
        .seed_rental(&[(dec!(100.00), 1)], end - Duration::days(10), end, dec!(0))
        .await;
    let fees_uri = format!("/api/v1/rentals/{}/fees?as_of={}", rental.id, today());

    // Still out: 20 days at 5 % of the 10.00 daily amount.
    let (status, body) = call(&app, Method::GET, &fees_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["total_fees"]), dec!(10.00));

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/{}/return-events", rental.id),
        Some(json!({
            "return_date": end.to_string(),
            "items": [{ "line_id": rental.lines[0].id, "quantity": 1, "condition": "GOOD" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = body["data"]["id"].as_str().expect("event id").to_string();

    let (_, body) = call(&app, Method::GET, &fees_uri, None).await;
    assert_eq!(body["data"]["days_overdue"], 0);
    assert_eq!(decimal(&body["data"]["total_fees"]), dec!(0));

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/v1/rentals/return-events/{}/complete", event_id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, Method::GET, &fees_uri, None).await;
    assert_eq!(body["data"]["days_overdue"], 0);
    assert_eq!(decimal(&body["data"]["new_late_fees"]), dec!(0));
    assert_eq!(decimal(&body["data"]["total_fees"]), dec!(0));
    assert_eq!(decimal(&body["data"]["amount_due"]), dec!(0));
}

#[tokio::test]
async fn manual_status_change_follows_transition_table() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(30.00), 1)],
            today() - Duration::days(1),
            today() + Duration::days(4),
            dec!(0),
        )
        .await;
    let uri = format!("/api/v1/rentals/{}/status", rental.id);

    let (status, body) = call(&app, Method::PUT, &uri, Some(json!({ "status": "LATE" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "LATE");

    let (status, body) = call(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "status": "PARTIAL_RETURN" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Invalid rental status transition from LATE to PARTIAL_RETURN"));
}

// ==================== Rental Returns via /returns ====================

fn rental_return_payload(original_id: &str, lines: Value) -> Value {
    json!({
        "original_transaction_id": original_id,
        "return_date": today().to_string(),
        "reason_code": "RENTAL_END",
        "details": {
            "return_type": "RENTAL",
            "lines": lines
        }
    })
}

#[tokio::test]
async fn late_rental_return_deducts_fees_from_deposit() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(50.00), 2)],
            today() - Duration::days(10),
            today() - Duration::days(3),
            dec!(100.00),
        )
        .await;

    let payload = rental_return_payload(
        &rental.id.to_string(),
        json!([{
            "original_line_id": rental.lines[0].id,
            "return_quantity": 2,
            "condition": "GOOD",
            "cleaning_required": "MINOR"
        }]),
    );
    let (status, body) = call(&app, Method::POST, "/api/v1/returns", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    // 3 days x 10% x 100.00 / 30 = 1.00 late, plus 25.00 minor cleaning.
    let breakdown = &body["data"]["financials"]["breakdown"];
    assert_eq!(breakdown["return_type"], "RENTAL");
    assert_eq!(breakdown["late_fee_days"], 3);
    assert_eq!(decimal(&breakdown["late_fee"]), dec!(1.00));
    assert_eq!(decimal(&breakdown["cleaning_fee"]), dec!(25.00));
    assert_eq!(decimal(&breakdown["total_deductions"]), dec!(26.00));
    assert_eq!(decimal(&breakdown["deposit_refund"]), dec!(74.00));
    assert_eq!(decimal(&breakdown["amount_due"]), dec!(0));

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["aggregate"]["current_rental_status"], "COMPLETED");
}

#[tokio::test]
async fn damaged_rental_return_can_exceed_deposit() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(40.00), 1)],
            today() - Duration::days(4),
            today() + Duration::days(1),
            dec!(50.00),
        )
        .await;

    let payload = rental_return_payload(
        &rental.id.to_string(),
        json!([{
            "original_line_id": rental.lines[0].id,
            "return_quantity": 1,
            "condition": "DAMAGED",
            "photos": ["https://img.example/1.jpg"],
            "repair_cost_estimate": "120.00"
        }]),
    );
    let (status, body) = call(&app, Method::POST, "/api/v1/returns", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    let breakdown = &body["data"]["financials"]["breakdown"];
    assert_eq!(decimal(&breakdown["damage_fee"]), dec!(120.00));
    assert_eq!(decimal(&breakdown["deposit_refund"]), dec!(0));
    assert_eq!(decimal(&breakdown["amount_due"]), dec!(70.00));
}

#[tokio::test]
async fn rental_return_must_cover_every_item() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(50.00), 2)],
            today() - Duration::days(3),
            today() + Duration::days(3),
            dec!(100.00),
        )
        .await;

    let payload = rental_return_payload(
        &rental.id.to_string(),
        json!([{
            "original_line_id": rental.lines[0].id,
            "return_quantity": 1,
            "condition": "GOOD"
        }]),
    );
    let (status, body) = call(&app, Method::POST, "/api/v1/returns", Some(payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details: Vec<&str> = body["details"]
        .as_array()
        .expect("details")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(details.contains(&"All rental items must be returned"));

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/api/v1/rentals/{}/status", rental.id),
        None,
    )
    .await;
    assert_eq!(body["data"]["status"], "ACTIVE");
}

#[tokio::test]
async fn damaged_rental_item_needs_photos() {
    let app = TestApp::new().await;
    let rental = app
        .seed_rental(
            &[(dec!(50.00), 1)],
            today() - Duration::days(3),
            today() + Duration::days(3),
            dec!(100.00),
        )
        .await;

    let payload = rental_return_payload(
        &rental.id.to_string(),
        json!([{
            "original_line_id": rental.lines[0].id,
            "return_quantity": 1,
            "condition": "POOR"
        }]),
    );
    let (status, body) = call(&app, Method::POST, "/api/v1/returns", Some(payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"][0]
        .as_str()
        .unwrap_or_default()
        .starts_with("Photos are required"));
}
