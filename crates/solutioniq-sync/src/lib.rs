//! Client-side reconciliation for SolutionIQ chats and tasks.
//!
//! [`SyncEngine`] shows the user's message and a typing placeholder before
//! any request leaves, then settles the placeholder from whichever source
//! reports first: the dispatch response, a push event, or a fallback poll.

pub mod cache;
pub mod engine;
pub mod local;
pub mod merge;
pub mod notifications;
pub mod poller;

pub use cache::{QueryCache, QueryKey};
pub use engine::{
    ApplyOutcome, DispatchOutcome, FAILURE_MESSAGE, Notice, PlaceholderEntry, ResolutionSource,
    SyncConfig, SyncEngine, TIMEOUT_MESSAGE,
};
pub use local::{LOCAL_ID_PREFIX, LocalMessage, LocalStatus, is_local_id, new_local_id};
pub use merge::{ConfirmedView, DisplayMessage, merge};
pub use notifications::{MAX_NOTIFICATIONS, Notification, NotificationCenter, notification_message};
pub use poller::{FallbackPoller, PollOutcome, PollSink, PollerConfig};
