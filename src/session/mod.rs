//! Process-local session storage bridging upload and extraction.

pub mod store;
pub mod types;

pub use store::{DEFAULT_CLEANUP_INTERVAL, SessionStore};
pub use types::{ContentKind, SessionError, SessionInfo, StorageStats, StoredItem};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run [`SessionStore::sweep_expired`] every `every` until the returned task is aborted.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired();
            tracing::debug!(removed, "Session sweep finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn sweeper_removes_expired_sessions_in_background() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(SessionStore::with_clock(
            Duration::from_secs(60),
            clock.clone(),
        ));
        let id = store.create_session();
        store
            .store_items(
                &id,
                vec![
                    StoredItem::new_at(&id, "a.png", ContentKind::Image, vec![1_u8], store.now()),
                ],
            )
            .expect("stored");
        clock.advance(Duration::from_secs(120));

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(10));
        for _ in 0..50 {
            if !store.get_info(&id).exists {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(!store.get_info(&id).exists);
    }
}
