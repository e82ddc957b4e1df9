use serde_json::json;
use tab_bridge::{
    application::config::AuthMode, domain::error::BridgeError, protocol::PeerMessage,
};

use super::support::{initialize, spawn_bridge, spawn_call};

#[tokio::test]
async fn answers_liveness_and_status_queries() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::None).await;

    peer.send(PeerMessage::Ping).await;
    assert_eq!(peer.recv().await, PeerMessage::Pong);

    peer.send(PeerMessage::GetStatus).await;
    assert_eq!(
        peer.recv().await,
        PeerMessage::StatusResponse {
            version: "test".to_owned()
        }
    );

    bridge.stop().await;
}

#[tokio::test]
async fn malformed_and_unknown_frames_are_skipped() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::None).await;

    let garbage = b"{not json";
    let mut frame = u32::try_from(garbage.len())
        .expect("small frame")
        .to_le_bytes()
        .to_vec();
    frame.extend_from_slice(garbage);
    peer.send_raw(&frame).await;

    let unknown = br#"{"type":"window_resized"}"#;
    let mut frame = u32::try_from(unknown.len())
        .expect("small frame")
        .to_le_bytes()
        .to_vec();
    frame.extend_from_slice(unknown);
    peer.send_raw(&frame).await;

    peer.sync().await;
    bridge.stop().await;
}

#[tokio::test]
async fn peer_end_of_stream_stops_the_bridge_cleanly() {
    let (bridge, peer) = spawn_bridge(AuthMode::None).await;
    drop(peer);

    assert_eq!(bridge.exit_result().await, Ok(()));
}

#[tokio::test]
async fn invalid_frame_length_is_fatal() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::None).await;
    peer.send_raw(&0_u32.to_le_bytes()).await;

    assert!(matches!(
        bridge.exit_result().await,
        Err(BridgeError::Peer(_))
    ));
}

#[tokio::test]
async fn oversized_frame_length_is_fatal() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::None).await;
    peer.send_raw(&(2 * 1024 * 1024_u32).to_le_bytes()).await;

    assert!(matches!(
        bridge.exit_result().await,
        Err(BridgeError::Peer(_))
    ));
}

#[tokio::test]
async fn pending_call_fails_when_peer_goes_away() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::None).await;
    let client = reqwest::Client::new();
    let session = initialize(&client, bridge.addr).await;

    let call = spawn_call(
        &client,
        bridge.addr,
        &session,
        2,
        "navigate",
        json!({"url": "x", "tabId": 1}),
    );
    peer.serve_bootstrap(json!(9)).await;
    let request = peer.recv_tool_request().await;
    assert_eq!(request.tool, "navigate");
    drop(peer);

    let payload = call.await.expect("call should join");
    assert_eq!(payload["result"]["isError"], true);
    assert_eq!(
        payload["result"]["content"][0]["text"],
        "Error: browser extension is not connected"
    );
    assert_eq!(bridge.exit_result().await, Ok(()));
}
