//! `notifications` adapter. Frames are forwarded as they arrive; the
//! notification payloads are not part of a closed set.

use campusnet_shared::Channel;
use serde_json::Value;

use crate::ws::{Callback, ConnectionHandle, ConnectionState, WsContext};

pub struct NotificationsChannel {
    connection: ConnectionHandle,
}

impl NotificationsChannel {
    pub fn open(ctx: WsContext, on_notification: impl Callback<Value> + 'static) -> Self {
        Self {
            connection: ConnectionHandle::open(Some(Channel::Notifications), ctx, on_notification),
        }
    }

    /// Like [`NotificationsChannel::open`], also reporting connection state changes.
    pub fn open_observed(
        ctx: WsContext,
        on_notification: impl Callback<Value> + 'static,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self {
            connection: ConnectionHandle::open_observed(
                Some(Channel::Notifications),
                ctx,
                on_notification,
                on_state,
            ),
        }
    }

    pub fn send(&self, frame: &Value) {
        self.connection.send_value(frame);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}
