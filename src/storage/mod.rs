//! Interchangeable storage engines sharing one contract, the way the
//! teacher's `recovery::wasp::wasp_engine::StorageEngine` trait lets the
//! rest of the crate stay indifferent to which backend a collection uses.
mod lru_log;
mod memory;
pub mod migrate;
mod wal_snapshot;

pub use lru_log::LruLogEngine;
pub use memory::MemoryEngine;
pub use wal_snapshot::WalSnapshotEngine;

use crate::document::{Document, DocumentId};
use crate::errors::Result;
use crate::update::UpdateSpec;

/// Snapshot of an engine's footprint, mirrored on the cache/index stats
/// structs the rest of the crate already exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub document_count: usize,
    pub bytes_on_disk: u64,
    pub wal_bytes: u64,
    pub last_snapshot_epoch_ms: Option<i64>,
}

/// The contract every storage backend implements. All mutating methods
/// return only after the backend's own durability guarantee is met; the
/// in-memory engine's guarantee is simply "visible to the next call".
pub trait StorageEngine: Send + Sync {
    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn upsert(&self, doc: Document) -> Result<()>;

    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Reads the current document, applies `spec`, and writes the result
    /// back. Returns whether `id` existed.
    ///
    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn update_fields(&self, id: &DocumentId, spec: &UpdateSpec) -> Result<bool>;

    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn delete(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn find_all(&self) -> Result<Vec<Document>>;

    /// Primary-order page starting after skipping `skip` documents.
    ///
    /// # Errors
    /// Returns an error on I/O failure or framing corruption.
    fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Document>> {
        Ok(self.find_all()?.into_iter().skip(skip).take(limit).collect())
    }

    /// # Errors
    /// Returns an error on I/O failure.
    fn count(&self) -> Result<usize>;

    /// # Errors
    /// Returns an error on I/O failure.
    fn exists(&self, id: &DocumentId) -> Result<bool> {
        Ok(self.find_by_id(id)?.is_some())
    }

    /// Rewrite the on-disk representation to drop garbage. A no-op for
    /// backends with no garbage to collect.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    fn compact(&self) -> Result<()>;

    /// # Errors
    /// Returns an error on I/O failure.
    fn stats(&self) -> Result<StorageStats>;
}

fn apply_update(doc: &mut Document, spec: &UpdateSpec) {
    crate::update::apply(&mut doc.data, spec);
    crate::document::write_id(&mut doc.data, &doc.id);
}
