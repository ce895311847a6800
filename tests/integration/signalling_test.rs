//! End-to-end signalling tests over real WebSocket connections.

mod helpers;

use serde_json::json;

use helpers::{TestApp, player, streamer};

#[tokio::test]
async fn test_offer_answer_and_candidates_reach_the_right_peer() {
    let app = TestApp::new().await;
    let mut s1 = streamer(&app, "s1").await;
    let mut p1 = player(&app).await;

    p1.send(json!({"type": "subscribe", "streamerId": "s1"})).await;
    let connected = s1.expect("playerConnected").await;
    assert_eq!(connected["dataChannel"], true);
    assert_eq!(connected["sfu"], false);
    let player_id = connected["playerId"].as_str().unwrap().to_string();

    p1.send(json!({"type": "offer", "sdp": "v=0 offer"})).await;
    assert_eq!(
        s1.recv().await,
        json!({"type": "offer", "sdp": "v=0 offer", "playerId": player_id})
    );

    s1.send(json!({"type": "answer", "sdp": "v=0 answer", "playerId": player_id}))
        .await;
    assert_eq!(p1.recv().await, json!({"type": "answer", "sdp": "v=0 answer"}));

    let candidate = json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host", "sdpMid": "0", "sdpMLineIndex": 0});
    s1.send(json!({"type": "iceCandidate", "candidate": candidate, "playerId": player_id}))
        .await;
    assert_eq!(
        p1.recv().await,
        json!({"type": "iceCandidate", "candidate": candidate})
    );
}

#[tokio::test]
async fn test_subscribing_to_unknown_streamer_fails() {
    let app = TestApp::new().await;
    let mut p1 = player(&app).await;

    p1.send(json!({"type": "subscribe", "streamerId": "ghost"})).await;
    let failed = p1.expect("subscribeFailed").await;
    assert_eq!(failed["message"], "Streamer ghost does not exist.");
    p1.expect_silence().await;
}

#[tokio::test]
async fn test_streamer_disconnect_notifies_all_subscribers() {
    let app = TestApp::new().await;
    let mut s1 = streamer(&app, "s1").await;
    let mut p1 = player(&app).await;
    let mut p2 = player(&app).await;

    p1.send(json!({"type": "subscribe", "streamerId": "s1"})).await;
    s1.expect("playerConnected").await;
    p2.send(json!({"type": "subscribe", "streamerId": "s1"})).await;
    s1.expect("playerConnected").await;

    s1.close().await;

    p1.expect("streamerDisconnected").await;
    p2.expect("streamerDisconnected").await;

    p1.send(json!({"type": "listStreamers"})).await;
    assert_eq!(p1.recv().await, json!({"type": "streamerList", "ids": []}));
}

#[tokio::test]
async fn test_listing_reports_only_streaming_producers() {
    let app = TestApp::new().await;
    let _b = streamer(&app, "b").await;
    let _a = streamer(&app, "a").await;

    let mut idle = app.connect("/ws?type=streamer&id=idle").await;
    idle.expect("config").await;
    idle.expect("identify").await;

    let mut p1 = player(&app).await;
    p1.send(json!({"type": "listStreamers"})).await;
    assert_eq!(
        p1.recv().await,
        json!({"type": "streamerList", "ids": ["a", "b"]})
    );
}

#[tokio::test]
async fn test_malformed_frames_get_error_replies() {
    let app = TestApp::new().await;
    let mut p1 = player(&app).await;

    p1.send(json!({"streamerId": "s1"})).await;
    assert_eq!(p1.expect("error").await["error"], "Missing message type");

    p1.send_raw("not json").await;
    assert_eq!(p1.expect("error").await["error"], "Invalid JSON format");

    p1.send(json!({"type": "teleport"})).await;
    assert_eq!(
        p1.expect("error").await["error"],
        "Unknown message type: teleport"
    );

    p1.send(json!({"type": "endpointId", "id": "sneaky"})).await;
    p1.expect("error").await;

    p1.send(json!({"type": "ping", "time": 7})).await;
    assert_eq!(p1.recv().await, json!({"type": "pong", "time": 7}));
}

#[tokio::test]
async fn test_path_style_attributes_register_a_streamer() {
    let app = TestApp::new().await;
    let mut s = app
        .connect("/type=streamer&insid=inst-1&projectid=proj-9&id=path-s")
        .await;
    s.expect("config").await;
    s.expect("identify").await;
    s.send(json!({"type": "endpointId"})).await;
    assert_eq!(s.expect("endpointIdConfirm").await["committedId"], "path-s");

    let conn = app
        .engine
        .registry
        .streamer("path-s")
        .expect("streamer registered");
    assert_eq!(conn.attributes.instance_id.as_deref(), Some("inst-1"));
    assert_eq!(conn.attributes.project_id.as_deref(), Some("proj-9"));
}

#[tokio::test]
async fn test_disconnect_player_closes_the_socket_with_reason() {
    let app = TestApp::new().await;
    let mut s1 = streamer(&app, "s1").await;
    let mut p1 = player(&app).await;

    p1.send(json!({"type": "subscribe", "streamerId": "s1"})).await;
    let player_id = s1.expect("playerConnected").await["playerId"]
        .as_str()
        .unwrap()
        .to_string();

    s1.send(json!({"type": "disconnectPlayer", "playerId": player_id, "reason": "kicked"}))
        .await;

    assert_eq!(p1.recv().await, json!({"type": "disconnect", "reason": "kicked"}));
    assert_eq!(p1.expect_close().await.as_deref(), Some("kicked"));
    assert_eq!(
        s1.recv().await,
        json!({"type": "playerDisconnected", "playerId": player_id})
    );
}
