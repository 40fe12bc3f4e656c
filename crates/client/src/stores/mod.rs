//! Client-side state fed by REST snapshots and channel pushes.

pub mod messages;
pub mod presence;

pub use messages::ConversationMessages;
pub use presence::OnlineUsers;
