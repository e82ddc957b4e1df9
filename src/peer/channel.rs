//! The stdio side of the bridge.
//!
//! Outgoing messages are queued on a [`PeerSender`] and written by a single
//! writer task, so frames never interleave. Incoming frames are exposed as a
//! sequence of [`PeerEvent`]s that [`run_dispatcher`] consumes on one task.

use futures_util::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::{
    domain::error::BridgeError,
    peer::correlator::Correlator,
    protocol::{CodecError, InboundFrame, PeerCodec, PeerMessage},
};

#[derive(Debug, Clone)]
pub struct PeerSender {
    tx: mpsc::UnboundedSender<PeerMessage>,
}

impl PeerSender {
    /// Creates a sender together with the queue a writer drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PeerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: PeerMessage) -> Result<(), BridgeError> {
        self.tx.send(message).map_err(|_| BridgeError::PeerClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns the task that owns the output stream.
pub fn spawn_writer<W>(writer: W) -> (PeerSender, JoinHandle<Result<(), BridgeError>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, mut queue) = PeerSender::channel();
    let task = tokio::spawn(async move {
        let mut frames = FramedWrite::new(writer, PeerCodec::new());
        while let Some(message) = queue.recv().await {
            let tag = message.tag();
            match frames.send(message).await {
                Ok(()) => debug!("peer frame sent type={tag}"),
                Err(error @ (CodecError::MessageTooLarge { .. } | CodecError::Serialize(_))) => {
                    warn!("dropping outgoing peer frame type={tag}: {error}");
                }
                Err(error) => {
                    error!("peer write failed type={tag}: {error}");
                    return Err(BridgeError::Peer(error.to_string()));
                }
            }
        }
        Ok(())
    });

    (sender, task)
}

#[derive(Debug)]
pub enum PeerEvent {
    Message(PeerMessage),
    Malformed(String),
    Unknown(Option<String>),
    /// The stream can no longer be trusted. Reported once.
    Failed(BridgeError),
    Closed,
}

pub struct PeerReader<R> {
    frames: FramedRead<R, PeerCodec>,
    finished: bool,
}

impl<R> PeerReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, PeerCodec::new())
    }

    pub fn with_codec(reader: R, codec: PeerCodec) -> Self {
        Self {
            frames: FramedRead::new(reader, codec),
            finished: false,
        }
    }

    pub async fn next_event(&mut self) -> PeerEvent {
        if self.finished {
            return PeerEvent::Closed;
        }

        match self.frames.next().await {
            Some(Ok(InboundFrame::Message(message))) => PeerEvent::Message(message),
            Some(Ok(InboundFrame::Malformed { error })) => PeerEvent::Malformed(error),
            Some(Ok(InboundFrame::Unknown { tag })) => PeerEvent::Unknown(tag),
            Some(Err(error)) => {
                self.finished = true;
                PeerEvent::Failed(BridgeError::Peer(error.to_string()))
            }
            None => {
                self.finished = true;
                PeerEvent::Closed
            }
        }
    }
}

/// Consumes inbound peer events until the channel ends.
///
/// Returns `Ok(())` on end of stream and the fatal error when framing breaks.
pub async fn run_dispatcher<R>(
    mut reader: PeerReader<R>,
    sender: PeerSender,
    correlator: Correlator,
    version: String,
) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.next_event().await {
            PeerEvent::Message(message) => handle_message(message, &sender, &correlator, &version),
            PeerEvent::Malformed(error) => warn!("dropping malformed peer frame: {error}"),
            PeerEvent::Unknown(tag) => warn!(
                "ignoring peer frame with unknown type={}",
                tag.as_deref().unwrap_or("<missing>")
            ),
            PeerEvent::Failed(error) => {
                error!("peer channel desynchronized: {error}");
                return Err(error);
            }
            PeerEvent::Closed => {
                info!("peer channel reached end of stream");
                return Ok(());
            }
        }
    }
}

fn handle_message(
    message: PeerMessage,
    sender: &PeerSender,
    correlator: &Correlator,
    version: &str,
) {
    debug!("peer frame received type={}", message.tag());
    match message {
        PeerMessage::Ping => reply(sender, PeerMessage::Pong),
        PeerMessage::GetStatus => reply(
            sender,
            PeerMessage::StatusResponse {
                version: version.to_owned(),
            },
        ),
        PeerMessage::Pong => {}
        PeerMessage::StatusResponse { version } => info!("peer reported version={version}"),
        PeerMessage::ToolResponse(response) => {
            correlator.resolve(response);
        }
        other @ (PeerMessage::ToolRequest(_)
        | PeerMessage::McpConnected
        | PeerMessage::McpDisconnected) => {
            warn!("ignoring peer message sent in the wrong direction type={}", other.tag());
        }
    }
}

fn reply(sender: &PeerSender, message: PeerMessage) {
    if let Err(error) = sender.send(message) {
        warn!("failed to queue peer reply: {error}");
    }
}
