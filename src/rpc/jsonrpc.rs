use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const BAD_REQUEST: i64 = -32000;
pub const SESSION_NOT_FOUND: i64 = -32001;
pub const UNAUTHORIZED: i64 = -32002;
pub const FORBIDDEN: i64 = -32003;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[must_use]
pub fn response_ok(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result: Some(result),
        error: None,
    }
}

#[must_use]
pub fn response_error(id: Value, error: JsonRpcError) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result: None,
        error: Some(error),
    }
}

/// A single decoded element of a request body.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request(JsonRpcRequest),
    /// A client's reply to a server-initiated request; nothing to answer.
    ClientResponse,
    Invalid(JsonRpcResponse),
}

#[derive(Debug, Clone)]
pub struct IncomingBody {
    pub batch: bool,
    pub messages: Vec<Incoming>,
}

/// Splits a request body into messages, accepting a single object or a batch.
pub fn parse_body(body: Value) -> Result<IncomingBody, JsonRpcError> {
    match body {
        Value::Array(items) if items.is_empty() => {
            Err(JsonRpcError::new(INVALID_REQUEST, "empty batch"))
        }
        Value::Array(items) => Ok(IncomingBody {
            batch: true,
            messages: items.into_iter().map(parse_message).collect(),
        }),
        Value::Object(_) => Ok(IncomingBody {
            batch: false,
            messages: vec![parse_message(body)],
        }),
        _ => Err(JsonRpcError::new(
            INVALID_REQUEST,
            "request body must be a JSON-RPC object or batch",
        )),
    }
}

fn parse_message(value: Value) -> Incoming {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let Some(obj) = value.as_object() else {
        return Incoming::Invalid(response_error(
            Value::Null,
            JsonRpcError::new(INVALID_REQUEST, "batch entries must be objects"),
        ));
    };

    if !obj.contains_key("method") {
        if obj.contains_key("result") || obj.contains_key("error") {
            return Incoming::ClientResponse;
        }
        return Incoming::Invalid(response_error(
            id,
            JsonRpcError::new(INVALID_REQUEST, "missing method"),
        ));
    }

    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) if request.jsonrpc.as_deref().is_some_and(|v| v != JSONRPC_VERSION) => {
            Incoming::Invalid(response_error(
                id,
                JsonRpcError::new(INVALID_REQUEST, "unsupported jsonrpc version"),
            ))
        }
        Ok(request) => Incoming::Request(request),
        Err(error) => Incoming::Invalid(response_error(
            id,
            JsonRpcError::new(INVALID_REQUEST, format!("invalid request: {error}")),
        )),
    }
}
