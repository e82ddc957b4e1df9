pub mod channel;
pub mod correlator;
pub mod tab_group;

pub use channel::{PeerEvent, PeerReader, PeerSender, run_dispatcher, spawn_writer};
pub use correlator::{Correlator, CorrelatorStats, RawResultObserver, ToolCall, ToolOutcome};
pub use tab_group::{TabGroup, TabGroupId};
