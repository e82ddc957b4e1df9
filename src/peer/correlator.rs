//! Matches tool invocations to peer replies.
//!
//! The peer protocol carries no correlation id on `tool_response`, so every
//! reply is handed to the oldest pending request. That is only correct while
//! the peer answers each request exactly once and in order. A reply arriving
//! after its request timed out is therefore given to whichever request is
//! oldest at that moment; the correlator counts those situations and logs
//! them instead of trying to repair them.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, warn};

use crate::{
    domain::content::{CallToolResult, content_from_value, error_message_from_value},
    peer::channel::PeerSender,
    protocol::{MAX_MESSAGE_SIZE, PeerMessage, ToolRequest, ToolResponse, ToolResultPayload},
};

/// Sees the unformatted result of one request before its caller does.
pub type RawResultObserver = Box<dyn FnOnce(&ToolResultPayload) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
    pub client_id: Option<String>,
}

impl ToolCall {
    #[must_use]
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
            client_id: None,
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(ToolResultPayload),
    Failure(String),
    TimedOut { tool: String, timeout_ms: u64 },
    PeerUnavailable,
}

impl ToolOutcome {
    #[must_use]
    pub fn into_call_result(self) -> CallToolResult {
        match self {
            Self::Success(result) => CallToolResult::success(content_from_value(&result.content)),
            Self::Failure(message) => CallToolResult::error(message),
            Self::TimedOut { tool, timeout_ms } => {
                CallToolResult::error(format!("tool '{tool}' timed out after {timeout_ms}ms"))
            }
            Self::PeerUnavailable => CallToolResult::error("browser extension is not connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatorStats {
    pub pending: usize,
    pub issued: u64,
    pub orphaned: u64,
    pub unsolicited: u64,
    pub suspect_matches: u64,
}

struct PendingRequest {
    id: u64,
    tool: String,
    issued_at: Instant,
    reply: oneshot::Sender<ToolOutcome>,
    observer: Option<RawResultObserver>,
    /// Expires the entry even if the caller stops waiting.
    timer: AbortHandle,
}

#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

struct CorrelatorInner {
    peer: PeerSender,
    pending: Mutex<VecDeque<PendingRequest>>,
    next_id: AtomicU64,
    orphaned: AtomicU64,
    unsolicited: AtomicU64,
    suspect_matches: AtomicU64,
    closed: AtomicBool,
}

impl Correlator {
    #[must_use]
    pub fn new(peer: PeerSender) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                peer,
                pending: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                orphaned: AtomicU64::new(0),
                unsolicited: AtomicU64::new(0),
                suspect_matches: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub async fn invoke(&self, call: ToolCall, timeout: Duration) -> ToolOutcome {
        self.invoke_observed(call, timeout, None).await
    }

    /// Sends `call` to the peer and waits for the reply matched to it.
    ///
    /// Never fails past this layer: timeouts, peer errors and a closed channel
    /// all come back as a [`ToolOutcome`]. The deadline runs on its own task,
    /// so a request still expires if this future is dropped.
    pub async fn invoke_observed(
        &self,
        call: ToolCall,
        timeout: Duration,
        observer: Option<RawResultObserver>,
    ) -> ToolOutcome {
        let tool = call.tool.clone();
        let message = PeerMessage::ToolRequest(ToolRequest {
            tool: call.tool,
            args: call.args,
            client_id: call.client_id,
        });
        if let Err(reason) = check_frame_size(&message) {
            return ToolOutcome::Failure(reason);
        }

        let (reply, receiver) = oneshot::channel();
        let id = {
            // Table order must equal send order, so both happen under the lock.
            let mut pending = self.lock_pending();
            if self.inner.closed.load(Ordering::Acquire) {
                return ToolOutcome::PeerUnavailable;
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            pending.push_back(PendingRequest {
                id,
                tool: tool.clone(),
                issued_at: Instant::now(),
                reply,
                observer,
                timer: self.spawn_timer(id, timeout),
            });
            if self.inner.peer.send(message).is_err() {
                if let Some(entry) = pending.pop_back() {
                    entry.timer.abort();
                }
                return ToolOutcome::PeerUnavailable;
            }
            id
        };
        debug!("tool request queued id={id} tool={tool}");

        receiver.await.unwrap_or(ToolOutcome::PeerUnavailable)
    }

    /// Hands `response` to the oldest pending request.
    ///
    /// Returns `false` when nothing was waiting.
    pub fn resolve(&self, response: ToolResponse) -> bool {
        let Some(entry) = self.lock_pending().pop_front() else {
            self.inner.unsolicited.fetch_add(1, Ordering::Relaxed);
            warn!("discarding tool_response with no pending request");
            return false;
        };

        let orphan_taken = self
            .inner
            .orphaned
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            })
            .is_ok();
        if orphan_taken {
            self.inner.suspect_matches.fetch_add(1, Ordering::Relaxed);
            warn!(
                "tool_response matched to id={} tool={} while a timed-out request was still owed \
                 a reply; the result may belong to another request",
                entry.id, entry.tool
            );
        }

        entry.timer.abort();

        let outcome = match (response.result, response.error) {
            (_, Some(error)) => ToolOutcome::Failure(error_message_from_value(&error.content)),
            (result, None) => {
                let result = result.unwrap_or_default();
                if let Some(observer) = entry.observer {
                    observer(&result);
                }
                ToolOutcome::Success(result)
            }
        };

        debug!(
            "tool response matched id={} tool={} elapsed_ms={}",
            entry.id,
            entry.tool,
            entry.issued_at.elapsed().as_millis()
        );
        if entry.reply.send(outcome).is_err() {
            debug!("caller for id={} went away before its reply", entry.id);
        }
        true
    }

    /// Drops every pending request and refuses new ones. Their callers see
    /// [`ToolOutcome::PeerUnavailable`].
    pub fn close(&self) -> usize {
        let mut pending = self.lock_pending();
        self.inner.closed.store(true, Ordering::Release);
        let count = pending.len();
        for entry in pending.drain(..) {
            entry.timer.abort();
        }
        count
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    #[must_use]
    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            pending: self.pending_count(),
            issued: self.inner.next_id.load(Ordering::Relaxed) - 1,
            orphaned: self.inner.orphaned.load(Ordering::Relaxed),
            unsolicited: self.inner.unsolicited.load(Ordering::Relaxed),
            suspect_matches: self.inner.suspect_matches.load(Ordering::Relaxed),
        }
    }

    fn spawn_timer(&self, id: u64, timeout: Duration) -> AbortHandle {
        let correlator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            correlator.expire(id, timeout);
        })
        .abort_handle()
    }

    /// Removes request `id` once its deadline passes. A reply the peer still
    /// sends for it will be matched to a later request.
    fn expire(&self, id: u64, timeout: Duration) {
        let entry = {
            let mut pending = self.lock_pending();
            match pending.iter().position(|entry| entry.id == id) {
                Some(index) => pending.remove(index),
                None => None,
            }
        };
        let Some(entry) = entry else {
            return;
        };

        let orphaned = self.inner.orphaned.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "tool request timed out id={id} tool={} timeout_ms={}; \
             {orphaned} timed-out request(s) may still be answered",
            entry.tool,
            timeout.as_millis()
        );
        let outcome = ToolOutcome::TimedOut {
            tool: entry.tool,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        if entry.reply.send(outcome).is_err() {
            debug!("caller for id={id} went away before its timeout");
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PendingRequest>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_frame_size(message: &PeerMessage) -> Result<(), String> {
    let size = serde_json::to_vec(message)
        .map_err(|error| format!("failed to serialize tool request: {error}"))?
        .len();
    if size > MAX_MESSAGE_SIZE {
        return Err(format!(
            "tool request of {size} bytes exceeds the {MAX_MESSAGE_SIZE} byte message limit"
        ));
    }
    Ok(())
}
