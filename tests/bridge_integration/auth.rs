use reqwest::StatusCode;
use serde_json::{Value, json};
use tab_bridge::application::config::AuthMode;

use super::support::{SESSION_HEADER, rpc, spawn_bridge, spawn_bridge_with};

fn initialize_body() -> Value {
    rpc(1, "initialize", json!({"protocolVersion": "2025-03-26"}))
}

#[tokio::test]
async fn token_mode_rejects_missing_and_wrong_tokens() {
    let (bridge, mut peer) = spawn_bridge(AuthMode::Token("secret-token".to_owned())).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(bridge.url())
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        missing
            .headers()
            .get("www-authenticate")
            .and_then(|value| value.to_str().ok()),
        Some("Bearer")
    );
    assert!(missing.headers().get(SESSION_HEADER).is_none());
    let payload: Value = missing.json().await.expect("error body should be json");
    assert_eq!(payload["error"]["code"], -32002);

    let wrong = client
        .post(bridge.url())
        .bearer_auth("secret-tokeN")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let prefix = client
        .post(bridge.url())
        .bearer_auth("secret")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(prefix.status(), StatusCode::UNAUTHORIZED);

    // Nothing reached the peer: no session was opened.
    peer.sync().await;

    let accepted = client
        .post(bridge.url())
        .bearer_auth("secret-token")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(accepted.status(), StatusCode::OK);
    assert!(accepted.headers().get(SESSION_HEADER).is_some());
    assert_eq!(peer.recv().await, tab_bridge::protocol::PeerMessage::McpConnected);

    bridge.stop().await;
}

#[tokio::test]
async fn token_mode_guards_stream_and_delete() {
    let (bridge, _peer) = spawn_bridge(AuthMode::Token("secret-token".to_owned())).await;
    let client = reqwest::Client::new();

    let stream = client
        .get(bridge.url())
        .header(SESSION_HEADER, "anything")
        .send()
        .await
        .expect("request should return");
    assert_eq!(stream.status(), StatusCode::UNAUTHORIZED);

    let delete = client
        .delete(bridge.url())
        .header(SESSION_HEADER, "anything")
        .send()
        .await
        .expect("request should return");
    assert_eq!(delete.status(), StatusCode::UNAUTHORIZED);

    bridge.stop().await;
}

#[tokio::test]
async fn foreign_origin_is_forbidden_and_loopback_is_allowed() {
    let (bridge, _peer) = spawn_bridge(AuthMode::None).await;
    let client = reqwest::Client::new();

    let foreign = client
        .post(bridge.url())
        .header("origin", "https://evil.example.com")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
    let payload: Value = foreign.json().await.expect("error body should be json");
    assert_eq!(payload["error"]["code"], -32003);

    let local = client
        .post(bridge.url())
        .header("origin", "http://localhost:5173")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(local.status(), StatusCode::OK);
    assert_eq!(
        local
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:5173")
    );

    bridge.stop().await;
}

#[tokio::test]
async fn preflight_is_answered_without_credentials() {
    let (bridge, _peer) = spawn_bridge(AuthMode::Token("secret-token".to_owned())).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, bridge.url())
        .header("origin", "http://127.0.0.1:8080")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization, mcp-session-id")
        .send()
        .await
        .expect("request should return");
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://127.0.0.1:8080")
    );

    bridge.stop().await;
}

#[tokio::test]
async fn allow_list_replaces_loopback_default() {
    let (bridge, _peer) = spawn_bridge_with(AuthMode::None, |config| {
        config.cors_origins = vec!["https://console.example.com".to_owned()];
    })
    .await;
    let client = reqwest::Client::new();

    let listed = client
        .post(bridge.url())
        .header("origin", "https://console.example.com")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(listed.status(), StatusCode::OK);

    let loopback = client
        .post(bridge.url())
        .header("origin", "http://localhost:3000")
        .json(&initialize_body())
        .send()
        .await
        .expect("request should return");
    assert_eq!(loopback.status(), StatusCode::FORBIDDEN);

    bridge.stop().await;
}
