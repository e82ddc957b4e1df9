use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    application::state::BridgeState,
    domain::content::CallToolResult,
    peer::{
        correlator::{RawResultObserver, ToolCall},
        tab_group::{TAB_CONTEXT_TOOL, force_create_flag, inject_group_id},
    },
    protocol::ToolResultPayload,
    rpc::{
        catalog,
        jsonrpc::{
            INTERNAL_ERROR, INVALID_PARAMS, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
            METHOD_NOT_FOUND, response_error, response_ok,
        },
    },
};

pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "tab-bridge";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Runs one request for `session_id`. Notifications produce no response.
pub async fn dispatch_request(
    state: &BridgeState,
    session_id: &str,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let Some(id) = request.id.clone() else {
        debug!("notification received method={} session={session_id}", request.method);
        return None;
    };

    let result = match request.method.as_str() {
        "initialize" => Ok(initialize_result(state, request.params.as_ref())),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": catalog::tool_definitions() })),
        "tools/call" => call_tool(state, session_id, request.params).await,
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    };

    Some(match result {
        Ok(result) => response_ok(id, result),
        Err(error) => response_error(id, error),
    })
}

fn initialize_result(state: &BridgeState, params: Option<&Value>) -> Value {
    let protocol_version = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(LATEST_PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": state.config().runtime_version,
        }
    })
}

async fn call_tool(
    state: &BridgeState,
    session_id: &str,
    params: Option<Value>,
) -> Result<Value, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|error| {
            JsonRpcError::new(INVALID_PARAMS, format!("invalid tools/call params: {error}"))
        })?;
    let name = params.name.trim();
    if name.is_empty() {
        return Err(JsonRpcError::new(INVALID_PARAMS, "tools/call requires a tool name"));
    }
    let arguments = params
        .arguments
        .unwrap_or_else(|| Value::Object(Map::new()));

    let result = if name == TAB_CONTEXT_TOOL {
        let call = ToolCall::new(name, force_create_flag(arguments)).with_client_id(session_id);
        let tab_group = state.tab_group().clone();
        let observer: RawResultObserver =
            Box::new(move |raw: &ToolResultPayload| tab_group.observe(raw));
        state
            .correlator()
            .invoke_observed(call, state.config().tool_timeout, Some(observer))
            .await
            .into_call_result()
    } else {
        match state.tab_group().ensure().await {
            Ok(group_id) => {
                let call = ToolCall::new(name, inject_group_id(arguments, &group_id))
                    .with_client_id(session_id);
                state
                    .correlator()
                    .invoke(call, state.config().tool_timeout)
                    .await
                    .into_call_result()
            }
            Err(error) => CallToolResult::error(error.to_string()),
        }
    };

    serde_json::to_value(result).map_err(|error| {
        JsonRpcError::new(INTERNAL_ERROR, format!("failed to encode tool result: {error}"))
    })
}
