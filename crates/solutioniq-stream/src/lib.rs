//! Push-event channel for the SolutionIQ agent platform.
//!
//! One WebSocket per [`StreamChannel`], authenticated with an auth frame on
//! every open and re-established with exponential backoff after any loss.
//! Decoded events are published as a watchable "last event" and fanned out to
//! broadcast subscribers. The channel also owns the set of task ids the
//! client is currently waiting on.

pub mod backoff;
pub mod channel;
pub mod error;
pub mod event;
pub mod pending;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backoff::Backoff;
pub use channel::{ChannelConfig, ConnectionState, StreamChannel, StreamHandle};
pub use error::{ChannelError, Result};
pub use event::{EventKind, EventPayload, EventResult, InboundEvent, auth_frame, parse_frame};
pub use pending::PendingTaskRegistry;
pub use transport::{Frame, StreamConnector, StreamTransport, TungsteniteConnector};
