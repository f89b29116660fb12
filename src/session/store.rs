//! In-memory session store with time-based expiry.
//!
//! One mutex guards the whole map. Every operation runs inside a single critical section, so a
//! session is either fully visible or absent; a batch store never shows up half-written.

use crate::clock::{Clock, SystemClock, format_rfc3339};
use crate::session::types::{ContentKind, SessionError, SessionInfo, StorageStats, StoredItem};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default age after which a session is swept.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct SessionEntry {
    opened_at: OffsetDateTime,
    items: Vec<StoredItem>,
    kinds: Vec<ContentKind>,
}

impl SessionEntry {
    fn new(opened_at: OffsetDateTime) -> Self {
        Self {
            opened_at,
            items: Vec::new(),
            kinds: Vec::new(),
        }
    }

    /// Earliest item timestamp; empty sessions age from when they were opened.
    fn oldest(&self) -> OffsetDateTime {
        self.items
            .iter()
            .map(|item| item.created_at)
            .min()
            .unwrap_or(self.opened_at)
    }
}

/// Thread-safe, process-local storage bridging upload and extraction.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    cleanup_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store that expires sessions older than `cleanup_interval`.
    pub fn new(cleanup_interval: Duration) -> Self {
        Self::with_clock(cleanup_interval, Arc::new(SystemClock))
    }

    /// Create a store driven by a custom clock.
    pub fn with_clock(cleanup_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            cleanup_interval_secs = cleanup_interval.as_secs(),
            "Session store initialized"
        );
        Self {
            sessions: Mutex::new(HashMap::new()),
            cleanup_interval,
            clock,
        }
    }

    /// Current time on the store's clock, for stamping new items.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Allocate a new, empty session and return its identifier.
    pub fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let opened_at = self.clock.now();
        self.lock()
            .insert(session_id.clone(), SessionEntry::new(opened_at));
        tracing::info!(session_id = %session_id, "Created session");
        session_id
    }

    /// Append a batch of items to a session, creating the session if needed.
    ///
    /// The batch is validated up front and inserted in one critical section: either every item
    /// is stored or none is.
    pub fn store_items(
        &self,
        session_id: &str,
        items: Vec<StoredItem>,
    ) -> Result<usize, SessionError> {
        if let Some(stray) = items.iter().find(|item| item.session_id != session_id) {
            return Err(SessionError::SessionMismatch {
                session_id: session_id.to_string(),
                item_session: stray.session_id.clone(),
                filename: stray.filename.clone(),
            });
        }

        let count = items.len();
        let opened_at = self.clock.now();
        {
            let mut sessions = self.lock();
            let entry = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionEntry::new(opened_at));
            for item in items {
                if !entry.kinds.contains(&item.content_kind) {
                    entry.kinds.push(item.content_kind.clone());
                }
                entry.items.push(item);
            }
        }

        tracing::info!(session_id, items = count, "Stored items in session");
        Ok(count)
    }

    /// All items of a session in the order they were stored. Unknown sessions yield nothing.
    pub fn get_items(&self, session_id: &str) -> Vec<StoredItem> {
        self.lock()
            .get(session_id)
            .map(|entry| entry.items.clone())
            .unwrap_or_default()
    }

    /// Items of a single content kind, in stored order.
    pub fn get_items_of_kind(&self, session_id: &str, kind: &ContentKind) -> Vec<StoredItem> {
        self.lock()
            .get(session_id)
            .map(|entry| {
                entry
                    .items
                    .iter()
                    .filter(|item| &item.content_kind == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Existence, size, kinds, and creation time of a session.
    pub fn get_info(&self, session_id: &str) -> SessionInfo {
        let sessions = self.lock();
        let Some(entry) = sessions.get(session_id) else {
            return SessionInfo::missing();
        };
        SessionInfo {
            exists: true,
            total_items: entry.items.len(),
            content_kinds: entry.kinds.clone(),
            created_at: entry
                .items
                .first()
                .map(|item| format_rfc3339(item.created_at)),
        }
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Deleted session");
        }
        removed
    }

    /// Drop every session whose oldest item is older than the cleanup interval.
    ///
    /// Idempotent; returns the number of sessions removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut sessions = self.lock();
            let before = sessions.len();
            sessions.retain(|_, entry| now - entry.oldest() <= self.cleanup_interval);
            before - sessions.len()
        };

        if removed > 0 {
            tracing::info!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Aggregate counters for monitoring.
    pub fn stats(&self) -> StorageStats {
        let sessions = self.lock();
        StorageStats {
            total_sessions: sessions.len(),
            total_items: sessions.values().map(|entry| entry.items.len()).sum(),
            cleanup_interval_hours: self.cleanup_interval.as_secs_f64() / 3600.0,
        }
    }

    /// Configured expiry interval.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            SessionStore::with_clock(DEFAULT_CLEANUP_INTERVAL, clock.clone()),
            clock,
        )
    }

    fn item(session: &str, name: &str, kind: ContentKind, at: OffsetDateTime) -> StoredItem {
        StoredItem::new_at(session, name, kind, name.as_bytes().to_vec(), at)
    }

    #[test]
    fn items_come_back_in_stored_order() {
        let (store, clock) = store_with_clock();
        let id = store.create_session();
        let now = clock.now();
        store
            .store_items(
                &id,
                vec![
                    item(&id, "a.png", ContentKind::Image, now),
                    item(&id, "b.pdf", ContentKind::PdfText, now),
                    item(&id, "c.png", ContentKind::Image, now),
                ],
            )
            .expect("stored");

        let names: Vec<_> = store
            .get_items(&id)
            .into_iter()
            .map(|item| item.filename)
            .collect();
        assert_eq!(names, vec!["a.png", "b.pdf", "c.png"]);

        let images = store.get_items_of_kind(&id, &ContentKind::Image);
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn info_reports_kinds_and_first_item_time() {
        let (store, clock) = store_with_clock();
        let id = store.create_session();
        let first = clock.now();
        store
            .store_items(
                &id,
                vec![
                    item(&id, "a.pdf", ContentKind::PdfText, first),
                    item(&id, "b.png", ContentKind::Image, first + Duration::from_secs(5)),
                ],
            )
            .expect("stored");

        let info = store.get_info(&id);
        assert!(info.exists);
        assert_eq!(info.total_items, 2);
        assert_eq!(info.content_kinds, vec![ContentKind::PdfText, ContentKind::Image]);
        assert_eq!(info.created_at, Some(format_rfc3339(first)));
    }

    #[test]
    fn unknown_sessions_are_reported_missing() {
        let (store, _) = store_with_clock();
        assert!(!store.get_info("nope").exists);
        assert!(store.get_items("nope").is_empty());
        assert!(!store.delete_session("nope"));
    }

    #[test]
    fn mismatched_batch_is_rejected_whole() {
        let (store, clock) = store_with_clock();
        let id = store.create_session();
        let now = clock.now();
        let error = store
            .store_items(
                &id,
                vec![
                    item(&id, "a.png", ContentKind::Image, now),
                    item("other", "b.png", ContentKind::Image, now),
                ],
            )
            .expect_err("mismatch");

        assert!(matches!(error, SessionError::SessionMismatch { .. }));
        assert_eq!(store.get_info(&id).total_items, 0);
    }

    #[test]
    fn store_creates_missing_session() {
        let (store, clock) = store_with_clock();
        store
            .store_items("adhoc", vec![item("adhoc", "a.png", ContentKind::Image, clock.now())])
            .expect("stored");
        assert!(store.get_info("adhoc").exists);
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let (store, clock) = store_with_clock();
        let old = store.create_session();
        store
            .store_items(&old, vec![item(&old, "old.png", ContentKind::Image, clock.now())])
            .expect("stored");

        clock.advance(Duration::from_secs(50 * 60));
        let fresh = store.create_session();
        store
            .store_items(&fresh, vec![item(&fresh, "new.png", ContentKind::Image, clock.now())])
            .expect("stored");

        clock.advance(Duration::from_secs(11 * 60));
        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.get_info(&old).exists);
        assert!(store.get_info(&fresh).exists);

        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn sweep_uses_oldest_item() {
        let (store, clock) = store_with_clock();
        let id = store.create_session();
        let start = clock.now();
        store
            .store_items(
                &id,
                vec![
                    item(&id, "late.png", ContentKind::Image, start + Duration::from_secs(3000)),
                    item(&id, "early.png", ContentKind::Image, start),
                ],
            )
            .expect("stored");

        clock.advance(Duration::from_secs(3601));
        assert_eq!(store.sweep_expired(), 1);
    }

    #[test]
    fn empty_sessions_expire_from_creation() {
        let (store, clock) = store_with_clock();
        let id = store.create_session();
        clock.advance(Duration::from_secs(30 * 60));
        assert_eq!(store.sweep_expired(), 0);
        clock.advance(Duration::from_secs(31 * 60));
        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.get_info(&id).exists);
    }

    #[test]
    fn stats_count_sessions_and_items() {
        let (store, clock) = store_with_clock();
        let a = store.create_session();
        let _b = store.create_session();
        store
            .store_items(
                &a,
                vec![
                    item(&a, "1.png", ContentKind::Image, clock.now()),
                    item(&a, "2.png", ContentKind::Image, clock.now()),
                ],
            )
            .expect("stored");

        let stats = store.stats();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_items, 2);
        assert!((stats.cleanup_interval_hours - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_writers_and_sweeps_never_lose_items() {
        let store = Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let id = store.create_session();
                    for n in 0..25 {
                        let name = format!("{worker}-{n}.png");
                        store
                            .store_items(&id, vec![StoredItem::new(&id, name, ContentKind::Image, vec![0_u8])])
                            .expect("stored");
                        store.sweep_expired();
                    }
                    id
                })
            })
            .collect();

        for handle in handles {
            let id = handle.join().expect("join");
            assert_eq!(store.get_items(&id).len(), 25);
        }
    }
}
