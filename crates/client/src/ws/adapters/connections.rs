//! `connections` adapter.

use campusnet_shared::{Channel, ChannelEvent, ConnectionEvent};
use serde_json::Value;

use crate::ws::{callback, Callback, ConnectionHandle, ConnectionState, SharedCallback, WsContext};

/// Handlers for the connection-request channel.
#[derive(Clone, Default)]
pub struct ConnectionsHandlers {
    on_frame: Option<SharedCallback<Value>>,
    on_event: Option<SharedCallback<ConnectionEvent>>,
    on_accepted: Option<SharedCallback<i64>>,
}

impl ConnectionsHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame, verbatim, for callers switching on `type` themselves.
    pub fn on_frame(mut self, f: impl Callback<Value> + 'static) -> Self {
        self.on_frame = Some(callback(f));
        self
    }

    /// Decoded lifecycle events (request, accepted, rejected, removed).
    pub fn on_event(mut self, f: impl Callback<ConnectionEvent> + 'static) -> Self {
        self.on_event = Some(callback(f));
        self
    }

    /// `connection_accepted` only, with the other user's id.
    pub fn on_accepted(mut self, f: impl Callback<i64> + 'static) -> Self {
        self.on_accepted = Some(callback(f));
        self
    }
}

/// Route one frame of the `connections` channel.
pub fn dispatch(frame: &Value, handlers: &ConnectionsHandlers) {
    if let Some(on_frame) = &handlers.on_frame {
        on_frame(frame.clone());
    }
    let Some(event) = ConnectionEvent::decode(frame) else {
        return;
    };
    if let ConnectionEvent::ConnectionAccepted(accepted) = &event {
        if let (Some(on_accepted), Some(user_id)) = (&handlers.on_accepted, accepted.user_id) {
            on_accepted(user_id);
        }
    }
    if let Some(on_event) = &handlers.on_event {
        on_event(event);
    }
}

/// Live connection-request events for the signed-in user.
pub struct ConnectionsChannel {
    connection: ConnectionHandle,
}

impl ConnectionsChannel {
    pub fn open(ctx: WsContext, handlers: ConnectionsHandlers) -> Self {
        Self::connect(ctx, handlers, None)
    }

    /// Like [`ConnectionsChannel::open`], also reporting connection state changes.
    pub fn open_observed(
        ctx: WsContext,
        handlers: ConnectionsHandlers,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self::connect(ctx, handlers, Some(callback(on_state)))
    }

    fn connect(
        ctx: WsContext,
        handlers: ConnectionsHandlers,
        on_state: Option<SharedCallback<ConnectionState>>,
    ) -> Self {
        let on_frame = callback(move |frame: Value| dispatch(&frame, &handlers));
        Self {
            connection: ConnectionHandle::start(Some(Channel::Connections), ctx, on_frame, on_state),
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
