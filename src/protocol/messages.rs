use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tags understood on the stdio channel, in both directions.
pub const KNOWN_TAGS: &[&str] = &[
    "ping",
    "pong",
    "get_status",
    "status_response",
    "tool_request",
    "tool_response",
    "mcp_connected",
    "mcp_disconnected",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Ping,
    Pong,
    GetStatus,
    StatusResponse {
        #[serde(default)]
        version: String,
    },
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
    McpConnected,
    McpDisconnected,
}

impl PeerMessage {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::GetStatus => "get_status",
            Self::StatusResponse { .. } => "status_response",
            Self::ToolRequest(_) => "tool_request",
            Self::ToolResponse(_) => "tool_response",
            Self::McpConnected => "mcp_connected",
            Self::McpDisconnected => "mcp_disconnected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Reply to a [`ToolRequest`]. Carries no correlation id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResultPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResultPayload {
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolErrorPayload {
    #[serde(default)]
    pub content: Value,
}
