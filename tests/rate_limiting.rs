//! Integration tests for rate limiting of the credential endpoints.

mod common;

use common::*;
use issuehub::Config;
use reqwest::StatusCode;
use serde_json::json;
use serial_test::serial;

fn limited_config(per_minute: u32) -> Config {
    let mut config = Config::default_for_testing();
    config.security.rate_limiting_enabled = true;
    config.security.auth_requests_per_minute = per_minute;
    config
}

#[tokio::test]
#[serial]
async fn login_is_throttled_after_quota() {
    let app = TestApp::spawn_with(limited_config(3)).await;

    for _ in 0..3 {
        let response = app.login("nobody@example.com", "wrongpassword").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.login("nobody@example.com", "wrongpassword").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
#[serial]
async fn signup_and_login_share_the_quota() {
    let app = TestApp::spawn_with(limited_config(2)).await;

    let response = app
        .signup("Quota User", &TestApp::unique_email(), PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.login("nobody@example.com", "wrongpassword").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .signup("Quota User", &TestApp::unique_email(), PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
#[serial]
async fn other_routes_are_not_throttled() {
    let app = TestApp::spawn_with(limited_config(1)).await;

    for _ in 0..5 {
        let response = app.get_public("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let user_response = app
        .post_public("/auth/login", json!({ "email": "a@example.com", "password": "x" }))
        .await;
    assert_eq!(user_response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn disabled_limiter_never_throttles() {
    let app = TestApp::spawn().await;

    for _ in 0..10 {
        let response = app.login("nobody@example.com", "wrongpassword").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
