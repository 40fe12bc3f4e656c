//! Campusnet Client - realtime core
//!
//! This crate contains the client side of campusnet's realtime features:
//! token storage, the authenticated REST transport, one WebSocket per channel
//! with keep-alive and reconnect, typed channel adapters, and the badge
//! counters reconciled from REST snapshots. It runs natively on tokio and in
//! the browser on wasm32; Dioxus hooks are behind the `hooks` feature.

pub mod logging;

pub mod api_client;
pub mod auth_session;
pub mod config;
pub mod reconcile;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::ApiClient;
pub use auth_session::{AuthSession, TokenStore};
pub use campusnet_shared;
pub use config::ClientConfig;
