use std::{sync::Arc, time::Instant};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    application::{config::RuntimeConfig, sessions::SessionTable},
    peer::{channel::PeerSender, correlator::Correlator, tab_group::TabGroup},
};

/// Lifecycle object owning every piece of shared bridge state.
#[derive(Clone)]
pub struct BridgeState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: RuntimeConfig,
    started_at: Instant,
    peer: PeerSender,
    correlator: Correlator,
    tab_group: TabGroup,
    sessions: SessionTable,
    shutdown: CancellationToken,
}

impl BridgeState {
    #[must_use]
    pub fn new(config: RuntimeConfig, peer: PeerSender) -> Self {
        let correlator = Correlator::new(peer.clone());
        let tab_group = TabGroup::new(correlator.clone(), config.group_timeout);
        let sessions = SessionTable::new(peer.clone());

        Self {
            inner: Arc::new(InnerState {
                started_at: Instant::now(),
                peer,
                correlator,
                tab_group,
                sessions,
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    #[must_use]
    pub fn tab_group(&self) -> &TabGroup {
        &self.inner.tab_group
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.inner.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn auth_mode_label(&self) -> &'static str {
        self.inner.config.auth_mode.label()
    }

    pub async fn health_payload(&self) -> Value {
        json!({
            "ok": !self.inner.peer.is_closed(),
            "version": self.config().runtime_version,
            "authMode": self.auth_mode_label(),
            "uptimeMs": self.uptime_ms(),
            "sessions": self.sessions().count().await,
            "tabGroupId": self.tab_group().current().map(|id| id.as_value().clone()),
            "tabGroupInitializing": self.tab_group().is_initializing(),
            "requests": self.correlator().stats(),
        })
    }

    /// Closes every session and abandons pending requests. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let sessions = self.sessions().close_all().await;
        let abandoned = self.correlator().close();
        self.inner.shutdown.cancel();
        info!("bridge stopped sessions_closed={sessions} requests_abandoned={abandoned}");
    }
}
