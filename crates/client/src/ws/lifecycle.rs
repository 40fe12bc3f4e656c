//! Channel lifecycle state machine.
//!
//! Decides when to connect, ping, back off and give up. Uses the action
//! pattern: every input returns the actions the driver must execute, so the
//! machine itself does no I/O and keeps no clocks.
//!
//! # State Machine
//!
//! ```text
//!            token + channel        open
//! ┌──────┐ ────────────────> ┌────────────┐ ──────> ┌──────┐
//! │ Idle │                   │ Connecting │         │ Open │
//! └──────┘ <─── no token ─── └────────────┘         └──────┘
//!                               ↑      │ close/error    │ close/error
//!                        timer  │      ↓                ↓
//!                       ┌────────────────────┐  cap  ┌────────────┐
//!                       │ ReconnectScheduled │ ────> │ Terminated │
//!                       └────────────────────┘       └────────────┘
//! ```
//!
//! `teardown` leaves any state for good: afterwards every input is ignored.

use std::time::Duration;

use super::connection::{ConnectionState, ReconnectConfig};

/// Actions returned by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Open a socket to this URL
    Connect { url: String },
    /// Send a `{"type":"ping"}` frame
    SendPing,
    /// Start the recurring keep-alive timer
    StartKeepAlive(Duration),
    /// Stop the keep-alive timer
    StopKeepAlive,
    /// Arm the reconnect timer
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer
    CancelReconnect,
    /// Close the socket
    CloseSocket,
}

/// Lifecycle of one channel connection.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    label: String,
    config: ReconnectConfig,
    keepalive: Duration,
    state: ConnectionState,
    /// Reconnects fired since the last successful open.
    attempts: u32,
    torn_down: bool,
}

impl Lifecycle {
    /// A new lifecycle in [`ConnectionState::Idle`]. `label` prefixes log
    /// lines, usually the channel path.
    pub fn new(label: impl Into<String>, config: ReconnectConfig, keepalive: Duration) -> Self {
        Self {
            label: label.into(),
            config,
            keepalive,
            state: ConnectionState::Idle,
            attempts: 0,
            torn_down: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Frames may only go out while open.
    #[must_use]
    pub fn can_send(&self) -> bool {
        !self.torn_down && self.state.is_connected()
    }

    /// First connection attempt. `url` is `None` when the endpoint cannot be
    /// built (no channel or no token); the machine then stays idle.
    pub fn start(&mut self, url: Option<String>) -> Vec<LifecycleAction> {
        if self.torn_down || self.state != ConnectionState::Idle {
            return vec![];
        }
        self.connect(url)
    }

    /// Transport reported the socket open.
    pub fn on_open(&mut self) -> Vec<LifecycleAction> {
        if self.torn_down || self.state != ConnectionState::Connecting {
            return vec![];
        }
        crate::log_info!("[ws:{}] Connected", self.label);
        self.state = ConnectionState::Open;
        self.attempts = 0;
        vec![
            LifecycleAction::SendPing,
            LifecycleAction::StartKeepAlive(self.keepalive),
        ]
    }

    pub fn on_keepalive_tick(&mut self) -> Vec<LifecycleAction> {
        if self.can_send() {
            vec![LifecycleAction::SendPing]
        } else {
            vec![]
        }
    }

    /// Transport reported a close or an error, including a failed connect.
    ///
    /// Only the first report for a socket counts; repeats are ignored.
    pub fn on_closed(&mut self) -> Vec<LifecycleAction> {
        if self.torn_down {
            return vec![];
        }
        let mut actions = match self.state {
            ConnectionState::Open => vec![LifecycleAction::StopKeepAlive],
            ConnectionState::Connecting => vec![],
            _ => return vec![],
        };

        if self.attempts < self.config.max_attempts {
            let delay = self.config.delay_for_attempt(self.attempts);
            crate::log_info!(
                "[ws:{}] Disconnected, reconnecting in {}ms (attempt {}/{})",
                self.label,
                delay.as_millis(),
                self.attempts + 1,
                self.config.max_attempts
            );
            self.state = ConnectionState::ReconnectScheduled {
                attempt: self.attempts + 1,
                delay,
            };
            actions.push(LifecycleAction::ScheduleReconnect(delay));
        } else {
            crate::log_warn!(
                "[ws:{}] Giving up after {} reconnect attempts",
                self.label,
                self.attempts
            );
            self.state = ConnectionState::Terminated;
        }
        actions
    }

    /// The reconnect timer fired. `url` is rebuilt by the driver so a rotated
    /// token is picked up here.
    pub fn on_reconnect_timer(&mut self, url: Option<String>) -> Vec<LifecycleAction> {
        if self.torn_down || !matches!(self.state, ConnectionState::ReconnectScheduled { .. }) {
            return vec![];
        }
        self.attempts += 1;
        self.connect(url)
    }

    /// Owner is gone. Stops every timer, closes the socket and ignores
    /// everything that comes afterwards.
    pub fn teardown(&mut self) -> Vec<LifecycleAction> {
        if self.torn_down {
            return vec![];
        }
        self.torn_down = true;
        let actions = match self.state {
            ConnectionState::Open => vec![
                LifecycleAction::StopKeepAlive,
                LifecycleAction::CloseSocket,
            ],
            ConnectionState::Connecting => vec![LifecycleAction::CloseSocket],
            ConnectionState::ReconnectScheduled { .. } => vec![LifecycleAction::CancelReconnect],
            ConnectionState::Idle | ConnectionState::Terminated => vec![],
        };
        crate::log_debug!("[ws:{}] Torn down", self.label);
        self.state = ConnectionState::Idle;
        self.attempts = 0;
        actions
    }

    fn connect(&mut self, url: Option<String>) -> Vec<LifecycleAction> {
        match url {
            Some(url) => {
                crate::log_info!(
                    "[ws:{}] Connecting to {}",
                    self.label,
                    crate::logging::redact_token(&url)
                );
                self.state = ConnectionState::Connecting;
                vec![LifecycleAction::Connect { url }]
            }
            None => {
                crate::log_debug!("[ws:{}] No endpoint, staying idle", self.label);
                self.state = ConnectionState::Idle;
                vec![]
            }
        }
    }
}
