//! `messages/{chat_id}` adapter.

use campusnet_shared::{Channel, ChannelEvent, ChatEvent, ChatMessage, ClientFrame};
use chrono::Utc;
use serde_json::Value;

use crate::ws::{callback, Callback, ConnectionHandle, ConnectionState, SharedCallback, WsContext};

/// Handlers for a conversation channel.
#[derive(Clone, Default)]
pub struct ChatHandlers {
    on_message: Option<SharedCallback<ChatMessage>>,
    on_typing: Option<SharedCallback<(i64, bool)>>,
}

impl ChatHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushed message, field-mapped to the domain shape.
    pub fn on_message(mut self, f: impl Callback<ChatMessage> + 'static) -> Self {
        self.on_message = Some(callback(f));
        self
    }

    /// `(user_id, is_typing)`.
    pub fn on_typing(mut self, f: impl Callback<(i64, bool)> + 'static) -> Self {
        self.on_typing = Some(callback(f));
        self
    }
}

/// Route one frame of a conversation channel.
pub fn dispatch(frame: &Value, handlers: &ChatHandlers) {
    match ChatEvent::decode(frame) {
        Some(ChatEvent::NewMessage(msg)) => {
            if let Some(on_message) = &handlers.on_message {
                on_message(msg.into_message(Utc::now()));
            }
        }
        Some(ChatEvent::Typing(typing)) => {
            if let Some(on_typing) = &handlers.on_typing {
                on_typing((typing.user_id, typing.is_typing));
            }
        }
        None => {}
    }
}

/// Live view of one conversation.
pub struct ChatChannel {
    chat_id: i64,
    connection: ConnectionHandle,
}

impl ChatChannel {
    /// Ids `<= 0` mean no conversation is selected: the channel stays idle
    /// and never connects.
    pub fn open(chat_id: i64, ctx: WsContext, handlers: ChatHandlers) -> Self {
        Self::connect(chat_id, ctx, handlers, None)
    }

    /// Like [`ChatChannel::open`], also reporting connection state changes.
    pub fn open_observed(
        chat_id: i64,
        ctx: WsContext,
        handlers: ChatHandlers,
        on_state: impl Callback<ConnectionState> + 'static,
    ) -> Self {
        Self::connect(chat_id, ctx, handlers, Some(callback(on_state)))
    }

    fn connect(
        chat_id: i64,
        ctx: WsContext,
        handlers: ChatHandlers,
        on_state: Option<SharedCallback<ConnectionState>>,
    ) -> Self {
        let on_frame = callback(move |frame: Value| dispatch(&frame, &handlers));
        Self {
            chat_id,
            connection: ConnectionHandle::start(Channel::chat(chat_id), ctx, on_frame, on_state),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Best effort: dropped unless connected. The REST send stays the
    /// source of truth.
    pub fn send_message(&self, content: &str, attachment: Option<&str>) {
        self.connection.send(&ClientFrame::Message {
            content: content.to_string(),
            attachment: attachment.map(str::to_string),
        });
    }

    pub fn set_typing(&self, is_typing: bool) {
        self.connection.send(&ClientFrame::Typing { is_typing });
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
