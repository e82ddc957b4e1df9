pub mod codec;
pub mod messages;

pub use codec::{CodecError, InboundFrame, MAX_MESSAGE_SIZE, PeerCodec, encode_frame};
pub use messages::{
    KNOWN_TAGS, PeerMessage, ToolErrorPayload, ToolRequest, ToolResponse, ToolResultPayload,
};
