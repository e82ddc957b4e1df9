use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("peer channel error: {0}")]
    Peer(String),
    #[error("peer channel closed")]
    PeerClosed,
    #[error("tab group unavailable: {0}")]
    GroupUnavailable(String),
}
