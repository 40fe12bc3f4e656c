//! Counters recomputed from the latest snapshot and UI context.

use std::sync::Arc;

use campusnet_shared::{Chat, Connection};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::counts::{incoming_request_count, unread_chat_count};
use super::poller::SnapshotPoller;
use crate::api_client::ApiClient;
use crate::config::ClientConfig;

/// The conversation currently on screen, if any.
#[derive(Debug, Clone)]
pub struct ActiveChat {
    tx: Arc<watch::Sender<Option<i64>>>,
}

impl Default for ActiveChat {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveChat {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, chat_id: Option<i64>) {
        self.tx.send_if_modified(|current| {
            if *current == chat_id {
                return false;
            }
            *current = chat_id;
            true
        });
    }

    pub fn get(&self) -> Option<i64> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.tx.subscribe()
    }
}

/// A count derived from a snapshot stream and a context stream.
///
/// Starts at 0 until the first snapshot arrives.
pub struct Counter {
    count: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl Counter {
    /// Recompute `compute(snapshot, context)` whenever either input changes.
    /// Must be called from within a tokio runtime.
    pub fn derive<T, C>(
        mut snapshots: watch::Receiver<Option<T>>,
        mut context: watch::Receiver<C>,
        compute: impl Fn(&T, &C) -> usize + Send + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let (tx, count) = watch::channel(0);
        let task = tokio::spawn(async move {
            let mut context_open = true;
            loop {
                let next = snapshots
                    .borrow_and_update()
                    .as_ref()
                    .map(|snapshot| compute(snapshot, &context.borrow_and_update()))
                    .unwrap_or(0);
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });

                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    changed = context.changed(), if context_open => {
                        if changed.is_err() {
                            context_open = false;
                        }
                    }
                }
            }
        });
        Self { count, task }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait for the next different count. `None` once the inputs are gone.
    pub async fn changed(&mut self) -> Option<usize> {
        self.count.changed().await.ok()?;
        Some(*self.count.borrow_and_update())
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Unread chats badge: chats with unread messages from others, minus the one
/// that is open.
pub struct UnreadChatsCounter {
    counter: Counter,
    _poller: Option<SnapshotPoller<Vec<Chat>>>,
}

impl UnreadChatsCounter {
    pub fn new(
        chats: watch::Receiver<Option<Vec<Chat>>>,
        active: &ActiveChat,
        current_user_id: i64,
    ) -> Self {
        let counter = Counter::derive(chats, active.subscribe(), move |chats, active| {
            unread_chat_count(chats, *active, current_user_id)
        });
        Self {
            counter,
            _poller: None,
        }
    }

    /// Poll `GET /chats` every `chats_poll_interval`.
    pub fn polling(
        api: &ApiClient,
        config: &ClientConfig,
        active: &ActiveChat,
        current_user_id: i64,
    ) -> Self {
        let api = api.clone();
        let poller = SnapshotPoller::spawn("chats", config.chats_poll_interval, move || {
            let api = api.clone();
            async move { api.list_chats().await }
        });
        let mut counter = Self::new(poller.subscribe(), active, current_user_id);
        counter._poller = Some(poller);
        counter
    }

    pub fn count(&self) -> usize {
        self.counter.count()
    }

    pub async fn changed(&mut self) -> Option<usize> {
        self.counter.changed().await
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.counter.subscribe()
    }
}

/// Pending incoming connection requests badge.
pub struct IncomingRequestsCounter {
    counter: Counter,
    _poller: Option<SnapshotPoller<Vec<Connection>>>,
}

impl IncomingRequestsCounter {
    pub fn new(pending: watch::Receiver<Option<Vec<Connection>>>) -> Self {
        let (_, no_context) = watch::channel(());
        let counter = Counter::derive(pending, no_context, |pending, _| {
            incoming_request_count(pending)
        });
        Self {
            counter,
            _poller: None,
        }
    }

    /// Poll `GET /connections/pending/incoming` every
    /// `incoming_poll_interval`.
    pub fn polling(api: &ApiClient, config: &ClientConfig) -> Self {
        let api = api.clone();
        let poller = SnapshotPoller::spawn(
            "incoming",
            config.incoming_poll_interval,
            move || {
                let api = api.clone();
                async move { api.list_pending_incoming().await }
            },
        );
        let mut counter = Self::new(poller.subscribe());
        counter._poller = Some(poller);
        counter
    }

    pub fn count(&self) -> usize {
        self.counter.count()
    }

    pub async fn changed(&mut self) -> Option<usize> {
        self.counter.changed().await
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.counter.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusnet_shared::Message;
    use chrono::Utc;

    fn unread_chat(id: i64, from: i64) -> Chat {
        Chat {
            id,
            user1_id: None,
            user2_id: None,
            messages: vec![Message {
                id: id * 100,
                chat_id: id,
                sender_id: from,
                content: None,
                attachment: None,
                timestamp: Utc::now(),
                is_read: false,
                sender: None,
            }],
            last_message_at: None,
            user1: None,
            user2: None,
        }
    }

    #[tokio::test]
    async fn switching_active_chat_recomputes_without_new_snapshot() {
        let (chats_tx, chats_rx) = watch::channel(None);
        let active = ActiveChat::new();
        active.set(Some(7));
        let mut unread = UnreadChatsCounter::new(chats_rx, &active, 1);

        chats_tx.send_replace(Some(vec![unread_chat(7, 2), unread_chat(8, 2)]));
        assert_eq!(unread.changed().await, Some(1));

        active.set(Some(3));
        assert_eq!(unread.changed().await, Some(2));

        active.set(Some(8));
        assert_eq!(unread.changed().await, Some(1));
    }

    #[tokio::test]
    async fn every_snapshot_replaces_the_count() {
        let (tx, rx) = watch::channel(None);
        let mut incoming = IncomingRequestsCounter::new(rx);
        assert_eq!(incoming.count(), 0);

        let request = |id| Connection {
            id,
            status: campusnet_shared::ConnectionStatus::Pending,
            sender_id: id,
            receiver_id: 1,
            timestamp: None,
            accepted_at: None,
            sender: None,
            receiver: None,
        };
        tx.send_replace(Some(vec![request(1), request(2), request(3)]));
        assert_eq!(incoming.changed().await, Some(3));

        tx.send_replace(Some(vec![request(3)]));
        assert_eq!(incoming.changed().await, Some(1));

        drop(tx);
        assert_eq!(incoming.changed().await, None);
    }
}
