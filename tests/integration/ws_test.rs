//! Integration tests for the HTTP surface: upgrades and health endpoints.

mod helpers;

use axum::http::StatusCode;

#[tokio::test]
async fn test_ws_upgrade_without_upgrade_headers() {
    let app = helpers::TestApp::new().await;

    let response = app.get("/ws?type=player").await;

    assert!(
        response.status == StatusCode::BAD_REQUEST
            || response.status == StatusCode::UPGRADE_REQUIRED
            || response.status == StatusCode::METHOD_NOT_ALLOWED,
        "Expected an upgrade rejection, got {}",
        response.status
    );
}

#[tokio::test]
async fn test_ws_upgrade_without_type_is_rejected() {
    let app = helpers::TestApp::new().await;

    let url = format!("ws://{}/ws?id=s1", app.addr);
    let result = tokio_tungstenite::connect_async(url.as_str()).await;

    assert!(result.is_err(), "Handshake without a type must fail");
    assert_eq!(app.engine.registry.len(), 0);
}

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new().await;

    let response = app.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
    assert_eq!(response.body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_detailed_health_counts_live_connections() {
    let app = helpers::TestApp::new().await;
    let _s1 = helpers::streamer(&app, "s1").await;
    let _p1 = helpers::player(&app).await;

    let response = app.get("/api/health/detailed").await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["connections"]["streamers"], 1);
    assert_eq!(data["connections"]["players"], 1);
    assert_eq!(data["streaming"], serde_json::json!(["s1"]));
    assert_eq!(data["metrics"]["connections_active"], 2);
}

#[tokio::test]
async fn test_plain_health_check() {
    let app = helpers::TestApp::new().await;

    let response = app.get("/health-check").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text, "OK");
}
