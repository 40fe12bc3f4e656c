//! Fixed-interval REST snapshots.

use std::future::Future;
use std::time::Duration;

use campusnet_shared::ApiError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Refetches a resource on a fixed interval and publishes the latest
/// successful snapshot.
///
/// The first fetch happens immediately and polling never pauses. A failed
/// fetch is logged and keeps the previous snapshot. Dropping the poller stops
/// it.
pub struct SnapshotPoller<T> {
    latest: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> SnapshotPoller<T> {
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(label: &'static str, period: Duration, mut fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (tx, latest) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match fetch().await {
                    Ok(snapshot) => {
                        tx.send_replace(Some(snapshot));
                    }
                    Err(e) => crate::log_warn!("[poll:{}] Fetch failed: {}", label, e),
                }
            }
        });
        Self { latest, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.latest.clone()
    }

    pub fn latest(&self) -> watch::Ref<'_, Option<T>> {
        self.latest.borrow()
    }
}

impl<T> Drop for SnapshotPoller<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_fetch_is_immediate_and_errors_keep_last_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let poller = SnapshotPoller::spawn("test", Duration::from_secs(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Err(ApiError::Network("down".to_string()))
                } else {
                    Ok(n)
                }
            }
        });
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(0));

        // The failed second fetch publishes nothing, the third one does.
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let poller = SnapshotPoller::spawn("test", Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ApiError>(()) }
        });
        let mut rx = poller.subscribe();
        rx.changed().await.unwrap();
        drop(poller);
        drop(rx);

        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }
}
