use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tab_bridge::{
    application::{
        config::{AuthMode, RuntimeConfig},
        startup,
    },
    domain::error::BridgeError,
    protocol::{
        InboundFrame, PeerCodec, PeerMessage, ToolErrorPayload, ToolRequest, ToolResponse,
        ToolResultPayload,
    },
};
use tokio::{
    io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};

pub(crate) const SESSION_HEADER: &str = "mcp-session-id";
const PEER_WAIT: Duration = Duration::from_secs(5);

pub(crate) struct BridgeHandle {
    pub(crate) addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<(), BridgeError>>,
}

impl BridgeHandle {
    pub(crate) fn url(&self) -> String {
        mcp_url(self.addr)
    }

    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.join.await;
    }

    /// Waits for the bridge to exit on its own.
    pub(crate) async fn exit_result(self) -> Result<(), BridgeError> {
        tokio::time::timeout(PEER_WAIT, self.join)
            .await
            .expect("bridge should exit")
            .expect("bridge task should join")
    }
}

/// The browser host side of the stdio channel.
pub(crate) struct FakePeer {
    frames: FramedRead<ReadHalf<DuplexStream>, PeerCodec>,
    sink: FramedWrite<WriteHalf<DuplexStream>, PeerCodec>,
}

impl FakePeer {
    pub(crate) async fn recv(&mut self) -> PeerMessage {
        let next = tokio::time::timeout(PEER_WAIT, self.frames.next())
            .await
            .expect("peer message should arrive");
        match next {
            Some(Ok(InboundFrame::Message(message))) => message,
            other => panic!("expected peer message, got {other:?}"),
        }
    }

    /// Next tool request, skipping attach/detach notifications.
    pub(crate) async fn recv_tool_request(&mut self) -> ToolRequest {
        loop {
            match self.recv().await {
                PeerMessage::ToolRequest(request) => return request,
                PeerMessage::McpConnected | PeerMessage::McpDisconnected => {}
                other => panic!("expected tool request, got {other:?}"),
            }
        }
    }

    pub(crate) async fn send(&mut self, message: PeerMessage) {
        self.sink.send(message).await.expect("peer frame should send");
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.sink
            .get_mut()
            .write_all(bytes)
            .await
            .expect("raw bytes should send");
    }

    pub(crate) async fn reply_text(&mut self, text: &str) {
        self.send(PeerMessage::ToolResponse(ToolResponse {
            result: Some(ToolResultPayload {
                content: json!([{"type": "text", "text": text}]),
                context: None,
            }),
            error: None,
        }))
        .await;
    }

    pub(crate) async fn reply_context(&mut self, group_id: Value) {
        self.send(PeerMessage::ToolResponse(ToolResponse {
            result: Some(ToolResultPayload {
                content: json!([{"type": "text", "text": "tab context"}]),
                context: Some(json!({ "tabGroupId": group_id })),
            }),
            error: None,
        }))
        .await;
    }

    pub(crate) async fn reply_error(&mut self, message: &str) {
        self.send(PeerMessage::ToolResponse(ToolResponse {
            result: None,
            error: Some(ToolErrorPayload {
                content: json!(message),
            }),
        }))
        .await;
    }

    /// Round-trips a ping so that everything the bridge queued earlier has been read.
    pub(crate) async fn sync(&mut self) {
        self.send(PeerMessage::Ping).await;
        assert_eq!(self.recv().await, PeerMessage::Pong);
    }

    /// Answers the bootstrap context query with `group_id`.
    pub(crate) async fn serve_bootstrap(&mut self, group_id: Value) {
        let request = self.recv_tool_request().await;
        assert_eq!(request.tool, "tabs_context_mcp");
        assert_eq!(request.args["createIfEmpty"], true);
        self.reply_context(group_id).await;
    }
}

pub(crate) async fn spawn_bridge(auth_mode: AuthMode) -> (BridgeHandle, FakePeer) {
    spawn_bridge_with(auth_mode, |_: &mut RuntimeConfig| {}).await
}

pub(crate) async fn spawn_bridge_with(
    auth_mode: AuthMode,
    configure: impl FnOnce(&mut RuntimeConfig),
) -> (BridgeHandle, FakePeer) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should expose local addr");

    let mut config = RuntimeConfig::for_test(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
    config.auth_mode = auth_mode;
    configure(&mut config);

    let (bridge_end, peer_end) = tokio::io::duplex(256 * 1024);
    let (bridge_read, bridge_write) = tokio::io::split(bridge_end);
    let (peer_read, peer_write) = tokio::io::split(peer_end);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        startup::run_with_io(listener, config, bridge_read, bridge_write, async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    let handle = BridgeHandle {
        addr,
        shutdown: Some(shutdown_tx),
        join,
    };
    let peer = FakePeer {
        frames: FramedRead::new(peer_read, PeerCodec::new()),
        sink: FramedWrite::new(peer_write, PeerCodec::new()),
    };
    (handle, peer)
}

pub(crate) fn rpc(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

pub(crate) fn mcp_url(addr: SocketAddr) -> String {
    format!("http://{addr}/mcp")
}

pub(crate) async fn post(
    client: &reqwest::Client,
    addr: SocketAddr,
    session: Option<&str>,
    body: &Value,
) -> reqwest::Response {
    let mut request = client.post(mcp_url(addr)).json(body);
    if let Some(session) = session {
        request = request.header(SESSION_HEADER, session);
    }
    request.send().await.expect("request should return")
}

/// Opens a session with `initialize` and returns its id.
pub(crate) async fn initialize(client: &reqwest::Client, addr: SocketAddr) -> String {
    let response = post(
        client,
        addr,
        None,
        &rpc(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0.0.1"}
            }),
        ),
    )
    .await;
    assert!(response.status().is_success());
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .expect("initialize should return a session id")
        .to_owned()
}

pub(crate) async fn call_tool(
    client: &reqwest::Client,
    addr: SocketAddr,
    session: &str,
    id: u64,
    name: &str,
    arguments: Value,
) -> Value {
    let response = post(
        client,
        addr,
        Some(session),
        &rpc(id, "tools/call", json!({"name": name, "arguments": arguments})),
    )
    .await;
    assert!(response.status().is_success());
    response.json().await.expect("tools/call should return json")
}

/// Runs `tools/call` on its own task so the test can play the peer meanwhile.
pub(crate) fn spawn_call(
    client: &reqwest::Client,
    addr: SocketAddr,
    session: &str,
    id: u64,
    name: &str,
    arguments: Value,
) -> JoinHandle<Value> {
    let client = client.clone();
    let session = session.to_owned();
    let name = name.to_owned();
    tokio::spawn(async move { call_tool(&client, addr, &session, id, &name, arguments).await })
}
