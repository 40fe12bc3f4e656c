use campusnet_shared::{Chat, Connection};

/// Chats holding at least one unread message from someone other than
/// `current_user_id`, not counting the conversation that is open.
pub fn unread_chat_count(chats: &[Chat], active_chat_id: Option<i64>, current_user_id: i64) -> usize {
    chats
        .iter()
        .filter(|chat| Some(chat.id) != active_chat_id)
        .filter(|chat| chat.has_unread_from_others(current_user_id))
        .count()
}

/// Pending incoming connection requests, as served by
/// `GET /connections/pending/incoming`.
pub fn incoming_request_count(pending: &[Connection]) -> usize {
    pending.len()
}
