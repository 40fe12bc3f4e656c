//! Badge counts derived from periodic REST snapshots.
//!
//! Counts are never patched incrementally: every new snapshot and every change
//! of the open conversation recomputes them from scratch, so a missed or
//! duplicated push cannot make them drift.
//!
//! ```text
//!  SnapshotPoller<Vec<Chat>> ──watch──┐
//!                                     ├──► Counter ──watch──► badge
//!  ActiveChat ───────────────watch────┘
//! ```

mod counts;
#[cfg(not(target_arch = "wasm32"))]
mod counter;
#[cfg(not(target_arch = "wasm32"))]
mod poller;

pub use counts::{incoming_request_count, unread_chat_count};
#[cfg(not(target_arch = "wasm32"))]
pub use counter::{ActiveChat, Counter, IncomingRequestsCounter, UnreadChatsCounter};
#[cfg(not(target_arch = "wasm32"))]
pub use poller::SnapshotPoller;
