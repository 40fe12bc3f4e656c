//! One realtime socket per channel with keep-alive and auto-reconnect.
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific driver. Both drivers run the same
//! [`Lifecycle`](super::lifecycle::Lifecycle) and only differ in how they
//! execute its actions.

use std::time::Duration;

use campusnet_shared::Channel;

use crate::auth_session::TokenStore;
use crate::config::ClientConfig;

/// Connection state of a channel as seen by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel, no token, or the handle was closed.
    #[default]
    Idle,
    Connecting,
    Open,
    /// Socket closed, next attempt `attempt` fires after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Reconnect attempts exhausted. Only a new handle resumes.
    Terminated,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::ReconnectScheduled { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnects scheduled after consecutive failures before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Ceiling for the exponential delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectConfig {
    /// `min(max_delay, initial_delay * 2^attempt)`, saturating.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Everything a socket needs besides its channel: where to connect, which
/// token to present and how to behave when the link drops.
#[derive(Debug, Clone)]
pub struct WsContext {
    pub ws_base_url: String,
    pub tokens: TokenStore,
    pub reconnect: ReconnectConfig,
    pub keepalive: Duration,
    /// Handshake deadline for one connect attempt (native only; browsers
    /// enforce their own).
    pub connect_timeout: Duration,
}

impl WsContext {
    pub fn new(config: &ClientConfig, tokens: TokenStore) -> Self {
        Self {
            ws_base_url: config.ws_base_url.trim_end_matches('/').to_string(),
            tokens,
            reconnect: config.reconnect.clone(),
            keepalive: config.keepalive_interval,
            connect_timeout: config.connect_timeout,
        }
    }

    /// `{ws_base}/ws/{channel}?token={token}`, built from the token stored
    /// right now. `None` without an access token.
    pub fn endpoint_url(&self, channel: &Channel) -> Option<String> {
        let token = self.tokens.access_token().filter(|t| !t.is_empty())?;
        Some(format!(
            "{}/ws/{}?token={}",
            self.ws_base_url,
            channel.path(),
            urlencoding::encode(&token)
        ))
    }
}

// =========================================
// Callbacks
// =========================================

/// `Send + Sync` where sockets run on a thread pool, nothing in the browser.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> MaybeSend for T {}

/// `Send + Sync` where sockets run on a thread pool, nothing in the browser.
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

/// A handler invoked from socket and timer callbacks.
pub trait Callback<T>: Fn(T) + MaybeSend {}
impl<T, F: Fn(T) + MaybeSend + ?Sized> Callback<T> for F {}

#[cfg(not(target_arch = "wasm32"))]
pub type SharedCallback<T> = std::sync::Arc<dyn Callback<T>>;
#[cfg(target_arch = "wasm32")]
pub type SharedCallback<T> = std::rc::Rc<dyn Callback<T>>;

/// Wrap a closure as a [`SharedCallback`].
pub fn callback<T: 'static>(f: impl Callback<T> + 'static) -> SharedCallback<T> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        std::sync::Arc::new(f)
    }
    #[cfg(target_arch = "wasm32")]
    {
        std::rc::Rc::new(f)
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::ConnectionHandle;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::ConnectionHandle;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_up_to_ceiling() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..7)
            .map(|i| config.delay_for_attempt(i).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn huge_attempts_saturate() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(40), config.max_delay);
        assert_eq!(config.delay_for_attempt(u32::MAX), config.max_delay);
    }

    #[test]
    fn endpoint_carries_encoded_token() {
        let tokens = TokenStore::in_memory();
        let ctx = WsContext::new(&ClientConfig::for_api("https://api.example"), tokens.clone());
        assert_eq!(ctx.endpoint_url(&Channel::Feed), None);

        tokens.set_tokens("a b+c", "r");
        assert_eq!(
            ctx.endpoint_url(&Channel::Messages(42)).as_deref(),
            Some("wss://api.example/ws/messages/42?token=a%20b%2Bc")
        );
    }

    #[test]
    fn only_open_is_connected() {
        assert!(ConnectionState::Open.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
        .is_connecting());
        assert!(!ConnectionState::Terminated.is_connecting());
    }
}
