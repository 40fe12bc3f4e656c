//! REST data models consumed by the realtime core.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// --- Identity ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserBasicInfo {
    pub id: i64,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_de_profil: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    #[serde(rename = "user_type")]
    pub user_type: String,
    #[serde(rename = "profile_completed", default)]
    pub profile_completed: bool,
    #[serde(rename = "otp_configured", default)]
    pub otp_configured: bool,
}

// --- Auth ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login answer. When `requires_2fa` is set the tokens are not usable yet and
/// the caller must complete the 2FA step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub requires_2fa: bool,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Second login step: the one-time code for `email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpVerifyRequest {
    pub token: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Token pair returned by `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// --- Chats ---

/// A message as served by the chat REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub chat_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Read flag. The backend serves it either as a boolean or as `0`/`1`;
    /// an absent flag means the message has been read.
    #[serde(
        rename = "is_read",
        alias = "isRead",
        default = "default_read",
        deserialize_with = "deserialize_flag"
    )]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserBasicInfo>,
}

fn default_read() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub user1_id: Option<i64>,
    #[serde(default)]
    pub user2_id: Option<i64>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user1: Option<UserBasicInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user2: Option<UserBasicInfo>,
}

impl Chat {
    /// Whether this chat holds at least one unread message sent by someone
    /// other than `current_user_id`.
    pub fn has_unread_from_others(&self, current_user_id: i64) -> bool {
        self.messages
            .iter()
            .any(|msg| !msg.is_read && msg.sender_id != current_user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreateRequest {
    pub content: String,
    pub receiver_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

/// Generic `{ "message": "..." }` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusMessage {
    #[serde(default)]
    pub message: String,
}

// --- Connections ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: i64,
    pub status: ConnectionStatus,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserBasicInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserBasicInfo>,
}

// --- Serde helpers ---

/// Parse a backend timestamp. Accepts RFC 3339 and naive ISO 8601 (taken as
/// UTC, which is how the backend stores them).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub(crate) fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Null(()) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_read_flag_accepts_int_and_bool() {
        let unread: Message = serde_json::from_value(json!({
            "id": 1, "chatId": 3, "senderId": 7, "content": "hi",
            "timestamp": "2024-05-01T10:00:00", "is_read": 0
        }))
        .unwrap();
        assert!(!unread.is_read);

        let read: Message = serde_json::from_value(json!({
            "id": 2, "chatId": 3, "senderId": 7, "content": "hi",
            "timestamp": "2024-05-01T10:00:00.250+00:00", "isRead": true
        }))
        .unwrap();
        assert!(read.is_read);

        let absent: Message = serde_json::from_value(json!({
            "id": 3, "senderId": 7, "timestamp": "2024-05-01T10:00:00"
        }))
        .unwrap();
        assert!(absent.is_read);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let ts = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn unread_from_others_ignores_own_messages() {
        let chat: Chat = serde_json::from_value(json!({
            "id": 9, "user1Id": 1, "user2Id": 2,
            "messages": [
                {"id": 1, "senderId": 1, "timestamp": "2024-05-01T10:00:00", "is_read": 0},
                {"id": 2, "senderId": 2, "timestamp": "2024-05-01T10:01:00", "is_read": 1}
            ]
        }))
        .unwrap();
        assert!(!chat.has_unread_from_others(1));
        assert!(chat.has_unread_from_others(2));
    }

    #[test]
    fn connection_status_lowercase() {
        let conn: Connection = serde_json::from_value(json!({
            "id": 4, "status": "pending", "senderId": 2, "receiverId": 1,
            "timestamp": "2024-05-01T10:00:00"
        }))
        .unwrap();
        assert_eq!(conn.status, ConnectionStatus::Pending);
    }
}
