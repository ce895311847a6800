//! Route definitions for the relay's HTTP surface.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed));

    let ws_routes = Router::new()
        .route("/", get(handlers::ws::ws_upgrade))
        .route("/ws", get(handlers::ws::ws_upgrade))
        .route("/{*attributes}", get(handlers::ws::ws_upgrade_path));

    Router::new()
        .nest("/api", api_routes)
        .route("/health-check", get(handlers::health::health_check))
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use sigrelay_core::config::AppConfig;
    use sigrelay_realtime::SignallingEngine;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let config = AppConfig::default();
        let engine = SignallingEngine::new(config.signalling.clone());
        build_router(AppState::new(Arc::new(config), engine))
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let resp = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let (status, body) = get_body("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["data"]["status"], "ok");

        let (status, body) = get_body("/api/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["data"]["connections"]["players"], 0);
        assert_eq!(v["data"]["metrics"]["connections_total"], 0);

        let (status, body) = get_body("/health-check").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
