//! # cp-client
//!
//! Reconnecting STOMP-over-WebSocket client for live lab updates.
//!
//! A [`RealtimeClient`] keeps one connection to the broker, remembers which
//! topics callers want, resubscribes them after every reconnect and fans
//! decoded checkpoint, group-status and help-queue updates out to listeners.
//!
//! ```no_run
//! # async fn run() -> Result<(), cp_client::TransportError> {
//! use cp_client::{ClientOptions, RealtimeClient};
//!
//! let endpoint = url::Url::parse("http://localhost:8080/ws").map_err(|e| {
//!     cp_client::TransportError::InvalidUrl(e.to_string())
//! })?;
//! let client = RealtimeClient::new(ClientOptions::new(endpoint));
//! client.on_checkpoint_update(|update| println!("{:?}", update));
//! client.subscribe_to_group("g1");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod events;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backoff::{Backoff, ReconnectPolicy};
pub use client::{ClientOptions, RealtimeClient};
pub use connection::ConnectionState;
pub use events::{listener, Event, EventKind, Listener};
pub use registry::{Subscription, SubscriptionId};
pub use transport::{Connector, Packet, PacketSink, PacketStream, TransportError, WsConnector};

pub use cp_protocol::{
    CheckpointStatus, CheckpointUpdate, GroupStatus, GroupStatusUpdate, HelpQueuePriority,
    HelpQueueStatus, HelpQueueUpdate, Topic, TopicKind,
};
