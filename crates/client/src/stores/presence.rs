//! Who is online, fed by the `online` channel.

use std::collections::BTreeMap;

use campusnet_shared::PresenceEvent;

/// Online users keyed by id, with the display name they came online with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OnlineUsers {
    users: BTreeMap<i64, String>,
}

impl OnlineUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence event. Returns true if the set changed.
    pub fn apply(&mut self, event: &PresenceEvent) -> bool {
        match event {
            PresenceEvent::UserOnline { user_id, full_name } => {
                self.users.insert(*user_id, full_name.clone()).as_ref() != Some(full_name)
            }
            PresenceEvent::UserOffline { user_id } => self.users.remove(user_id).is_some(),
        }
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn name(&self, user_id: i64) -> Option<&str> {
        self.users.get(&user_id).map(String::as_str)
    }

    /// Online user ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.users.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_then_offline() {
        let mut users = OnlineUsers::new();
        let online = PresenceEvent::UserOnline {
            user_id: 7,
            full_name: "Ada".to_string(),
        };
        assert!(users.apply(&online));
        assert!(!users.apply(&online));
        assert_eq!(users.name(7), Some("Ada"));

        assert!(users.apply(&PresenceEvent::UserOffline { user_id: 7 }));
        assert!(!users.is_online(7));
        assert!(!users.apply(&PresenceEvent::UserOffline { user_id: 7 }));
        assert!(users.is_empty());
    }
}
