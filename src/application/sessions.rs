use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{peer::channel::PeerSender, protocol::PeerMessage};

/// One remote client's session. Cancelling `closed` ends its event stream.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    closed: CancellationToken,
}

impl Session {
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Active sessions keyed by id.
///
/// The peer hears `mcp_connected` when the table goes from empty to one
/// session and `mcp_disconnected` when it becomes empty again.
#[derive(Clone)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    peer: PeerSender,
}

impl SessionTable {
    #[must_use]
    pub fn new(peer: PeerSender) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            peer,
        }
    }

    pub async fn open(&self) -> Session {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            closed: CancellationToken::new(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        if sessions.len() == 1 {
            self.notify(PeerMessage::McpConnected);
        }
        info!("session opened id={} active={}", session.id, sessions.len());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Removes the session. Returns `false` if it was not active.
    pub async fn close(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.remove(id) else {
            return false;
        };
        session.closed.cancel();
        if sessions.is_empty() {
            self.notify(PeerMessage::McpDisconnected);
        }
        let age_ms = (Utc::now() - session.created_at).num_milliseconds();
        info!("session closed id={id} age_ms={age_ms} active={}", sessions.len());
        true
    }

    pub async fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.closed.cancel();
        }
        if count > 0 {
            self.notify(PeerMessage::McpDisconnected);
            info!("closed {count} session(s)");
        }
        count
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn notify(&self, message: PeerMessage) {
        if let Err(error) = self.peer.send(message) {
            warn!("failed to notify peer of session change: {error}");
        }
    }
}
