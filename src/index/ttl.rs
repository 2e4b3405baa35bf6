//! Expires documents a fixed duration after they were last written. Keeps
//! only `id -> recorded_timestamp`; a background sweeper invokes an
//! expiration callback (the collection's delete pipeline) for entries
//! past their deadline. No direct teacher analogue for expiry itself, but
//! the background-thread-plus-stop-flag shape follows the teacher's
//! `cache` eviction sweeps.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::Index;
use crate::document::{Document, DocumentId};
use crate::errors::Result;

fn now_epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

pub struct TtlIndex {
    name: String,
    expire_after_ms: i64,
    entries: RwLock<HashMap<DocumentId, i64>>,
}

impl TtlIndex {
    #[must_use]
    pub fn new(name: String, expire_after_ms: i64) -> Self {
        Self { name, expire_after_ms, entries: RwLock::new(HashMap::new()) }
    }

    #[cfg(test)]
    pub(crate) fn recorded_timestamp(&self, id: &DocumentId) -> Option<i64> {
        self.entries.read().get(id).copied()
    }

    fn expired_ids(&self) -> Vec<DocumentId> {
        let now = now_epoch_ms();
        self.entries
            .read()
            .iter()
            .filter(|(_, ts)| now.saturating_sub(**ts) >= self.expire_after_ms)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Spawn a background thread sweeping at `interval`, invoking
    /// `on_expire` for each document whose deadline has passed and then
    /// forgetting it. The thread exits once `stop` is set, checking at
    /// roughly `interval` granularity so shutdown is bounded.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        on_expire: impl Fn(&DocumentId) + Send + Sync + 'static,
        stop: Arc<AtomicBool>,
    ) -> std::thread::JoinHandle<()> {
        let this = Arc::clone(self);
        std::thread::spawn(move || {
            while !stop.load(AtomicOrdering::Relaxed) {
                std::thread::sleep(interval);
                if stop.load(AtomicOrdering::Relaxed) {
                    break;
                }
                for id in this.expired_ids() {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| on_expire(&id)));
                    if result.is_err() {
                        log::error!("TTL expiration callback panicked for id {id}, continuing sweep");
                    }
                    this.entries.write().remove(&id);
                }
            }
        })
    }
}

impl Index for TtlIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[String] {
        &[]
    }

    fn on_insert(&self, id: &DocumentId, _doc: &Document) -> Result<()> {
        self.entries.write().insert(id.clone(), now_epoch_ms());
        Ok(())
    }

    fn on_update(&self, id: &DocumentId, _old: &Document, _new: &Document) -> Result<()> {
        self.entries.write().insert(id.clone(), now_epoch_ms());
        Ok(())
    }

    /// A TTL deadline isn't a function of the document, so there is no
    /// prior timestamp to recompute on rollback. Leave the recorded
    /// timestamp as-is rather than re-stamping it to now, which would
    /// silently extend the document's deadline every time some other
    /// index's rollback runs.
    fn on_update_rollback(&self, _id: &DocumentId, _current: &Document, _previous: &Document) {}

    fn on_remove(&self, id: &DocumentId, _doc: &Document) {
        self.entries.write().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::sync::Mutex;

    #[test]
    fn entries_past_deadline_are_reported_expired() {
        let ttl = TtlIndex::new("ttl".to_string(), 0);
        let doc = Document::new(DocumentId::Int(1), doc! {});
        ttl.on_insert(&DocumentId::Int(1), &doc).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ttl.expired_ids(), vec![DocumentId::Int(1)]);
    }

    #[test]
    fn fresh_entries_are_not_expired() {
        let ttl = TtlIndex::new("ttl".to_string(), 60_000);
        let doc = Document::new(DocumentId::Int(1), doc! {});
        ttl.on_insert(&DocumentId::Int(1), &doc).unwrap();
        assert!(ttl.expired_ids().is_empty());
    }

    #[test]
    fn sweeper_invokes_callback_and_forgets_entry() {
        let ttl = Arc::new(TtlIndex::new("ttl".to_string(), 0));
        let doc = Document::new(DocumentId::Int(1), doc! {});
        ttl.on_insert(&DocumentId::Int(1), &doc).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = ttl.spawn_sweeper(Duration::from_millis(5), move |id| seen_clone.lock().unwrap().push(id.clone()), stop.clone());

        std::thread::sleep(Duration::from_millis(40));
        stop.store(true, AtomicOrdering::Relaxed);
        handle.join().unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), [DocumentId::Int(1)]);
        assert!(ttl.entries.read().is_empty());
    }
}
