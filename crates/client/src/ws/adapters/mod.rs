//! Typed channel adapters.
//!
//! Each adapter owns one [`ConnectionHandle`](super::ConnectionHandle),
//! decodes that channel's frames into its closed event set and invokes the
//! matching handler. Frames of unknown types are not dispatched. Adapters
//! hold no buffered data.
//!
//! The `dispatch` function of every adapter is pure apart from the handlers
//! it calls, so the routing can be exercised without a socket.

pub mod chat;
pub mod connections;
pub mod feed;
pub mod notifications;
pub mod presence;

pub use chat::{ChatChannel, ChatHandlers};
pub use connections::{ConnectionsChannel, ConnectionsHandlers};
pub use feed::{FeedChannel, FeedHandlers};
pub use notifications::NotificationsChannel;
pub use presence::{PresenceChannel, PresenceHandlers};
