//! # cp-protocol
//!
//! Wire protocol shared by the checkpoint realtime client and broker:
//! STOMP 1.2 frames, the SockJS websocket framing, broker topic names and
//! the JSON payloads pushed on them.

pub mod frame;
pub mod payload;
pub mod sockjs;
pub mod topic;

pub use frame::{Command, Frame, FrameError, HeartBeat};
pub use payload::{
    CheckpointStatus, CheckpointUpdate, GroupStatus, GroupStatusUpdate, HelpQueuePriority,
    HelpQueueStatus, HelpQueueUpdate,
};
pub use topic::{Topic, TopicKind};

/// STOMP versions offered in the CONNECT frame, most preferred first.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// STOMP version spoken by the broker.
pub const STOMP_VERSION: &str = "1.2";

/// Path of the WebSocket / SockJS negotiation endpoint.
pub const WS_PATH: &str = "/ws";

/// Default heart-beat interval in milliseconds, both directions.
pub const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

/// Maximum accepted frame size (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
