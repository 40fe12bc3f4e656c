//! Realtime channels.
//!
//! This module provides:
//! - A pure lifecycle state machine per channel (connect, keep-alive,
//!   exponential reconnect, give up, teardown)
//! - Platform drivers executing it (tokio-tungstenite natively,
//!   `web_sys::WebSocket` in the browser)
//! - Typed adapters turning each channel's frames into domain callbacks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Adapter (ChatChannel, FeedChannel, ...)             │
//! │  decodes `type` into a closed event enum             │
//! └──────────────────────────────────────────────────────┘
//!                         │ owns
//!                         ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  ConnectionHandle                                    │
//! │  one socket, exclusively owned, closed on drop       │
//! └──────────────────────────────────────────────────────┘
//!                         │ drives
//!                         ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  Lifecycle                                           │
//! │  Idle → Connecting → Open → ReconnectScheduled / ... │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let chat = ChatChannel::open(
//!     chat_id,
//!     session.ws_context(),
//!     ChatHandlers::new().on_message(move |msg| {
//!         conversation.lock().unwrap().insert(msg);
//!     }),
//! );
//! chat.send_message("hello", None);
//! // dropping `chat` closes the socket and cancels its timers
//! ```

pub mod adapters;
mod connection;
#[cfg(feature = "hooks")]
pub mod hooks;
pub mod lifecycle;

// Re-export connection types
pub use connection::{
    callback, Callback, ConnectionHandle, ConnectionState, MaybeSend, ReconnectConfig,
    SharedCallback, WsContext,
};

pub use adapters::{
    ChatChannel, ChatHandlers, ConnectionsChannel, ConnectionsHandlers, FeedChannel,
    FeedHandlers, NotificationsChannel, PresenceChannel, PresenceHandlers,
};
pub use lifecycle::{Lifecycle, LifecycleAction};
