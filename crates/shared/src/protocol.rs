//! Realtime wire protocol: channel names, outbound frames and the closed set
//! of inbound events per channel.
//!
//! Every frame on the wire is a JSON object with a mandatory `type` string.
//! The transport forwards frames untyped; each channel adapter resolves the
//! discriminator into one of the enums below. Unknown discriminators decode to
//! `None` and are simply not dispatched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{deserialize_optional_timestamp, Message};

/// A named realtime stream. One socket is opened per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Messages of one conversation. The id is always positive.
    Messages(i64),
    Connections,
    Feed,
    Notifications,
    Online,
}

impl Channel {
    /// Channel for a conversation. Ids `<= 0` mean "no conversation selected"
    /// and yield `None`, which keeps the connection idle.
    pub fn chat(chat_id: i64) -> Option<Self> {
        (chat_id > 0).then_some(Channel::Messages(chat_id))
    }

    /// Path segment after `/ws/`, e.g. `messages/42`.
    pub fn path(&self) -> String {
        match self {
            Channel::Messages(id) => format!("messages/{id}"),
            Channel::Connections => "connections".to_string(),
            Channel::Feed => "feed".to_string(),
            Channel::Notifications => "notifications".to_string(),
            Channel::Online => "online".to_string(),
        }
    }

    /// Parse a channel path. Returns `None` for empty or unknown names and for
    /// non-positive chat ids.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim_matches('/') {
            "connections" => Some(Channel::Connections),
            "feed" => Some(Channel::Feed),
            "notifications" => Some(Channel::Notifications),
            "online" => Some(Channel::Online),
            other => other
                .strip_prefix("messages/")
                .and_then(|id| id.parse::<i64>().ok())
                .and_then(Channel::chat),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Read the `type` discriminator of a raw frame.
pub fn frame_type(frame: &Value) -> Option<&str> {
    frame.get("type").and_then(Value::as_str)
}

// --- Outbound ---

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keep-alive.
    Ping,
    /// New chat message on a `messages/{id}` channel.
    Message {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
    },
    /// Typing indicator on a `messages/{id}` channel.
    Typing { is_typing: bool },
}

// --- Inbound ---

/// Decoding of a raw frame into a channel's closed event set.
pub trait ChannelEvent: DeserializeOwned {
    /// `None` when the frame's type is not part of this channel's set or its
    /// fields do not match.
    fn decode(frame: &Value) -> Option<Self> {
        Self::deserialize(frame).ok()
    }
}

/// Chat message as held by an open conversation.
///
/// Identity is the server-assigned `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            sender_id: msg.sender_id,
            content: msg.content.clone(),
            attachment: msg.attachment.clone(),
            timestamp: msg.timestamp,
        }
    }
}

/// `new_message` payload as pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMessageFrame {
    pub message_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewMessageFrame {
    /// Map wire fields to the domain message. A missing timestamp is stamped
    /// with `received_at`.
    pub fn into_message(self, received_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: self.message_id,
            sender_id: self.sender_id,
            content: self.content,
            attachment: self.attachment,
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingFrame {
    pub user_id: i64,
    #[serde(default = "default_true")]
    pub is_typing: bool,
}

fn default_true() -> bool {
    true
}

/// Events of a `messages/{id}` channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    NewMessage(NewMessageFrame),
    Typing(TypingFrame),
}

impl ChannelEvent for ChatEvent {}

/// Body shared by every connection lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionFrame {
    #[serde(default)]
    pub connection_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Events of the `connections` channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    ConnectionRequest(ConnectionFrame),
    ConnectionAccepted(ConnectionFrame),
    ConnectionRejected(ConnectionFrame),
    ConnectionRemoved(ConnectionFrame),
}

impl ChannelEvent for ConnectionEvent {}

impl ConnectionEvent {
    pub fn frame(&self) -> &ConnectionFrame {
        match self {
            ConnectionEvent::ConnectionRequest(f)
            | ConnectionEvent::ConnectionAccepted(f)
            | ConnectionEvent::ConnectionRejected(f)
            | ConnectionEvent::ConnectionRemoved(f) => f,
        }
    }
}

/// Events of the `feed` channel. Post and comment bodies are the REST
/// representations and are passed through as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    NewPost { post: Value },
    NewComment { comment: Value },
}

impl ChannelEvent for FeedEvent {}

/// Events of the `online` channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    UserOnline {
        user_id: i64,
        #[serde(default)]
        full_name: String,
    },
    UserOffline {
        user_id: i64,
    },
}

impl ChannelEvent for PresenceEvent {}
