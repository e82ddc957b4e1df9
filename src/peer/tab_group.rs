//! Lazily created tab group shared by every session.
//!
//! The first call that needs a group starts one bootstrap `tabs_context_mcp`
//! request; everyone arriving while it runs awaits the same attempt. Failures
//! are not cached, so the next caller after a failure starts a fresh attempt.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    domain::error::BridgeError,
    peer::correlator::{Correlator, RawResultObserver, ToolCall, ToolOutcome},
    protocol::ToolResultPayload,
};

pub const TAB_CONTEXT_TOOL: &str = "tabs_context_mcp";
pub const CREATE_IF_EMPTY_ARG: &str = "createIfEmpty";
pub const TAB_GROUP_ID_ARG: &str = "tabGroupId";

/// Identifier the peer uses for a tab group. Kept as the JSON value the peer sent.
#[derive(Debug, Clone, PartialEq)]
pub struct TabGroupId(Value);

impl TabGroupId {
    /// Accepts non-empty strings and numbers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => Some(Self(value.clone())),
            Value::String(text) if !text.trim().is_empty() => Some(Self(value.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for TabGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(text) => f.write_str(text),
            other => write!(f, "{other}"),
        }
    }
}

type Flight = Shared<BoxFuture<'static, Result<TabGroupId, BridgeError>>>;

#[derive(Default)]
struct GroupState {
    group_id: Option<TabGroupId>,
    in_flight: Option<Flight>,
}

#[derive(Clone)]
pub struct TabGroup {
    inner: Arc<TabGroupInner>,
}

struct TabGroupInner {
    correlator: Correlator,
    timeout: Duration,
    state: Mutex<GroupState>,
    bootstraps: AtomicU64,
}

impl TabGroup {
    #[must_use]
    pub fn new(correlator: Correlator, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TabGroupInner {
                correlator,
                timeout,
                state: Mutex::new(GroupState::default()),
                bootstraps: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the group id, creating the group on first use.
    pub async fn ensure(&self) -> Result<TabGroupId, BridgeError> {
        let flight = {
            let mut state = self.lock_state();
            if let Some(group_id) = &state.group_id {
                return Ok(group_id.clone());
            }
            match &state.in_flight {
                Some(flight) => flight.clone(),
                None => {
                    let flight = self.clone().bootstrap().boxed().shared();
                    state.in_flight = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    #[must_use]
    pub fn current(&self) -> Option<TabGroupId> {
        self.lock_state().group_id.clone()
    }

    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.lock_state().in_flight.is_some()
    }

    #[must_use]
    pub fn bootstrap_count(&self) -> u64 {
        self.inner.bootstraps.load(Ordering::Relaxed)
    }

    /// Records the group id carried by a client's own context query.
    pub fn observe(&self, result: &ToolResultPayload) {
        let Some(group_id) = extract_group_id(result) else {
            return;
        };
        let mut state = self.lock_state();
        if state.group_id.as_ref() != Some(&group_id) {
            info!("tab group id updated from context query group={group_id}");
            state.group_id = Some(group_id);
        }
    }

    async fn bootstrap(self) -> Result<TabGroupId, BridgeError> {
        self.inner.bootstraps.fetch_add(1, Ordering::Relaxed);
        debug!("creating tab group via {TAB_CONTEXT_TOOL}");

        let (found_tx, found_rx) = oneshot::channel();
        let observer: RawResultObserver = Box::new(move |raw: &ToolResultPayload| {
            let _ = found_tx.send(extract_group_id(raw));
        });
        let call = ToolCall::new(TAB_CONTEXT_TOOL, json!({ CREATE_IF_EMPTY_ARG: true }));
        let outcome = self
            .inner
            .correlator
            .invoke_observed(call, self.inner.timeout, Some(observer))
            .await;
        // The observer runs before the outcome is delivered, or is dropped with it.
        let found = found_rx.await.ok().flatten();

        let mut state = self.lock_state();
        state.in_flight = None;
        if let Some(group_id) = found {
            info!("tab group ready group={group_id}");
            state.group_id = Some(group_id.clone());
            return Ok(group_id);
        }
        drop(state);

        let reason = match outcome {
            ToolOutcome::Success(_) => "context response did not include a tab group id".to_owned(),
            ToolOutcome::Failure(message) => message,
            ToolOutcome::TimedOut { timeout_ms, .. } => {
                format!("context query timed out after {timeout_ms}ms")
            }
            ToolOutcome::PeerUnavailable => "browser extension is not connected".to_owned(),
        };
        warn!("tab group initialization failed: {reason}");
        Err(BridgeError::GroupUnavailable(reason))
    }

    fn lock_state(&self) -> MutexGuard<'_, GroupState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads the group id from `context.tabGroupId`, falling back to JSON text content.
#[must_use]
pub fn extract_group_id(result: &ToolResultPayload) -> Option<TabGroupId> {
    if let Some(group_id) = result
        .context
        .as_ref()
        .and_then(|context| context.get(TAB_GROUP_ID_ARG))
        .and_then(TabGroupId::from_value)
    {
        return Some(group_id);
    }

    let texts: Vec<&str> = match &result.content {
        Value::String(text) => vec![text.as_str()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect(),
        _ => Vec::new(),
    };

    texts.into_iter().find_map(|text| {
        serde_json::from_str::<Value>(text)
            .ok()?
            .get(TAB_GROUP_ID_ARG)
            .and_then(TabGroupId::from_value)
    })
}

/// Adds the group id to `args` unless the caller already supplied one.
#[must_use]
pub fn inject_group_id(args: Value, group_id: &TabGroupId) -> Value {
    let mut map = into_object(args);
    map.entry(TAB_GROUP_ID_ARG.to_owned())
        .or_insert_with(|| group_id.as_value().clone());
    Value::Object(map)
}

/// The context query always asks the peer to create a group if none exists.
#[must_use]
pub fn force_create_flag(args: Value) -> Value {
    let mut map = into_object(args);
    map.insert(CREATE_IF_EMPTY_ARG.to_owned(), Value::Bool(true));
    Value::Object(map)
}

fn into_object(args: Value) -> Map<String, Value> {
    match args {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
