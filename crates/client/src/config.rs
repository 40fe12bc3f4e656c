//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::ReconnectConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHATS_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_INCOMING_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Everything the realtime core needs to know about its environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST API, without trailing slash.
    pub api_base_url: String,
    /// Base URL of the websocket endpoints (`ws://` / `wss://`).
    pub ws_base_url: String,
    pub reconnect: ReconnectConfig,
    /// Interval between keep-alive pings on an open channel.
    pub keepalive_interval: Duration,
    /// Longest a websocket handshake may take before it counts as a failed attempt.
    pub connect_timeout: Duration,
    /// Refetch interval of the chat list feeding the unread badge.
    pub chats_poll_interval: Duration,
    /// Refetch interval of the pending incoming connection requests.
    pub incoming_poll_interval: Duration,
    /// Directory name used by the durable store.
    pub app_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_api(DEFAULT_API_BASE_URL)
    }
}

impl ClientConfig {
    /// Defaults for a given REST base URL; the websocket base is derived from it.
    pub fn for_api(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            ws_base_url: http_to_ws(&api_base_url),
            api_base_url,
            reconnect: ReconnectConfig::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            chats_poll_interval: DEFAULT_CHATS_POLL_INTERVAL,
            incoming_poll_interval: DEFAULT_INCOMING_POLL_INTERVAL,
            app_name: "campusnet".to_string(),
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CAMPUSNET_API_BASE_URL`: REST base URL (default: "http://localhost:8000")
    /// - `CAMPUSNET_WS_BASE_URL`: websocket base URL (default: derived from the REST base)
    /// - `CAMPUSNET_MAX_RECONNECT_ATTEMPTS`: reconnect cap (default: 5)
    /// - `CAMPUSNET_RECONNECT_BASE_MS`: first reconnect delay (default: 1000)
    /// - `CAMPUSNET_RECONNECT_MAX_MS`: reconnect delay ceiling (default: 30000)
    /// - `CAMPUSNET_KEEPALIVE_SECS`: keep-alive ping interval (default: 30)
    /// - `CAMPUSNET_CONNECT_TIMEOUT_MS`: websocket handshake timeout (default: 10000)
    /// - `CAMPUSNET_CHATS_POLL_MS`: unread badge poll interval (default: 1000)
    /// - `CAMPUSNET_INCOMING_POLL_MS`: incoming requests poll interval (default: 5000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api = lookup("CAMPUSNET_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let mut config = Self::for_api(api);

        if let Some(ws) = lookup("CAMPUSNET_WS_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.ws_base_url = ws.trim_end_matches('/').to_string();
        }

        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    crate::log_warn!("Ignoring {}={:?}: not a number", key, raw);
                    None
                }
            }
        };

        if let Some(v) = number("CAMPUSNET_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = v.min(u32::MAX as u64) as u32;
        }
        if let Some(v) = number("CAMPUSNET_RECONNECT_BASE_MS") {
            config.reconnect.initial_delay = Duration::from_millis(v);
        }
        if let Some(v) = number("CAMPUSNET_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = number("CAMPUSNET_KEEPALIVE_SECS") {
            config.keepalive_interval = Duration::from_secs(v.max(1));
        }
        if let Some(v) = number("CAMPUSNET_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(v.max(1));
        }
        if let Some(v) = number("CAMPUSNET_CHATS_POLL_MS") {
            config.chats_poll_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = number("CAMPUSNET_INCOMING_POLL_MS") {
            config.incoming_poll_interval = Duration::from_millis(v.max(1));
        }

        config
    }

    /// Full REST URL for `path`.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }
}

/// Convert an HTTP/HTTPS base URL to its WS/WSS equivalent.
pub fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
