//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use sigrelay_api::{AppState, build_router};
use sigrelay_core::config::AppConfig;
use sigrelay_realtime::SignallingEngine;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Test application context
pub struct TestApp {
    /// The Axum router for in-process requests
    pub router: Router,
    /// Signalling engine behind the router
    pub engine: SignallingEngine,
    /// Address of the spawned server
    pub addr: SocketAddr,
}

/// Response from a test request
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Raw body
    pub text: String,
    /// Parsed JSON body, `Null` when the body is not JSON
    pub body: Value,
}

impl TestApp {
    /// Start the relay with default configuration on a random port
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Start the relay with the given configuration on a random port
    pub async fn with_config(config: AppConfig) -> Self {
        let engine = SignallingEngine::new(config.signalling.clone());
        let router = build_router(AppState::new(Arc::new(config), engine.clone()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let server = router.clone();
        tokio::spawn(async move {
            axum::serve(listener, server).await.expect("Test server failed");
        });

        Self {
            router,
            engine,
            addr,
        }
    }

    /// Send an in-process GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");
        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, text, body }
    }

    /// Open a WebSocket to `path` (including any query string)
    pub async fn connect(&self, path: &str) -> WsClient {
        let url = format!("ws://{}{}", self.addr, path);
        let (stream, _) = connect_async(url.as_str())
            .await
            .expect("WebSocket handshake failed");
        WsClient { stream }
    }
}

/// A signalling client over a real socket
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Send one JSON message
    pub async fn send(&mut self, msg: Value) {
        self.stream
            .send(Message::text(msg.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Send a raw text frame
    pub async fn send_raw(&mut self, raw: &str) {
        self.stream
            .send(Message::text(raw.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Next JSON message, skipping control frames
    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("Timed out waiting for a frame")
                .expect("Stream ended")
                .expect("WebSocket error");
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("Frame is not JSON");
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("Unexpected frame: {other:?}"),
            }
        }
    }

    /// Next message, asserting its type
    pub async fn expect(&mut self, ty: &str) -> Value {
        let msg = self.recv().await;
        assert_eq!(msg["type"], ty, "unexpected message: {msg}");
        msg
    }

    /// Assert nothing arrives within a short window
    pub async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(200), self.stream.next()).await;
        if let Ok(Some(Ok(Message::Text(text)))) = result {
            panic!("Expected silence, got {}", text.as_str());
        }
    }

    /// Wait for the server to close the socket, returning the close reason
    pub async fn expect_close(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("Timed out waiting for close");
            match frame {
                Some(Ok(Message::Close(frame))) => {
                    return frame.map(|f| f.reason.as_str().to_string());
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    }

    /// Close the socket from the client side
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Connect a streamer and announce `id`, returning once confirmed
pub async fn streamer(app: &TestApp, id: &str) -> WsClient {
    let mut ws = app.connect(&format!("/ws?type=streamer&id={id}")).await;
    ws.expect("config").await;
    ws.expect("identify").await;
    ws.send(serde_json::json!({"type": "endpointId", "id": id})).await;
    let confirm = ws.expect("endpointIdConfirm").await;
    assert_eq!(confirm["committedId"], id);
    ws
}

/// Connect a player, consuming its `config` message
pub async fn player(app: &TestApp) -> WsClient {
    let mut ws = app.connect("/ws?type=player").await;
    ws.expect("config").await;
    ws
}
