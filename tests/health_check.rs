//! Health check endpoint integration tests.

mod common;

use common::TestApp;
use serde_json::Value;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn health_check_reports_service() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "issuehub-test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
#[serial]
async fn readiness_checks_database() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/ready").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
#[serial]
async fn responses_carry_request_id() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.api("/health"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}

#[tokio::test]
#[serial]
async fn unknown_route_returns_json_404() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/nonexistent-endpoint").await;

    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn openapi_document_is_served() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/api-docs/openapi.json", app.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["info"]["title"], "Issue Hub API");
}
