//! `online` adapter.

use campusnet_shared::{Channel, ChannelEvent, PresenceEvent};
use serde_json::Value;

use crate::ws::{callback, Callback, ConnectionHandle, ConnectionState, SharedCallback, WsContext};

#[derive(Clone, Default)]
pub struct PresenceHandlers {
    on_user_online: Option<SharedCallback<(i64, String)>>,
    on_user_offline: Option<SharedCallback<i64>>,
}

impl PresenceHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(user_id, full_name)`.
    pub fn on_user_online(mut self, f: impl Callback<(i64, String)> + 'static) -> Self {
        self.on_user_online = Some(callback(f));
        self
    }

    pub fn on_user_offline(mut self, f: impl Callback<i64> + 'static) -> Self {
        self.on_user_offline = Some(callback(f));
        self
    }
}

pub fn dispatch(frame: &Value, handlers: &PresenceHandlers) {
    match PresenceEvent::decode(frame) {
        Some(PresenceEvent::UserOnline { user_id, full_name }) => {
            if let Some(on_user_online) = &handlers.on_user_online {
                on_user_online((user_id, full_name));
            }
        }
        Some(PresenceEvent::UserOffline { user_id }) => {
            if let Some(on_user_offline) = &handlers.on_user_offline {
                on_user_offline(user_id);
            }
        }
        None => {}
    }
}

/// Who comes online and who leaves.
pub struct PresenceChannel {
    connection: ConnectionHandle,
}

impl PresenceChannel {
    pub fn open(ctx: WsContext, handlers: PresenceHandlers) -> Self {
        Self::connect(ctx, handlers, None)
    }

    /// Like [`PresenceChannel::open`], also reporting connection state changes.
    pub fn open_observed(
        ctx: WsContext,
        handlers: PresenceHandlers,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self::connect(ctx, handlers, Some(callback(on_state)))
    }

    fn connect(
        ctx: WsContext,
        handlers: PresenceHandlers,
        on_state: Option<SharedCallback<ConnectionState>>,
    ) -> Self {
        let on_frame = callback(move |frame: Value| dispatch(&frame, &handlers));
        Self {
            connection: ConnectionHandle::start(Some(Channel::Online), ctx, on_frame, on_state),
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
