//! Concurrent ordered in-memory map. No durability; used for tests and
//! `memory_only` configurations.
use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{StorageEngine, StorageStats, apply_update};
use crate::document::{Document, DocumentId};
use crate::errors::Result;
use crate::update::UpdateSpec;

#[derive(Default)]
pub struct MemoryEngine {
    map: RwLock<BTreeMap<DocumentId, Document>>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn upsert(&self, doc: Document) -> Result<()> {
        self.map.write().insert(doc.id.clone(), doc);
        Ok(())
    }

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.map.read().get(id).cloned())
    }

    fn update_fields(&self, id: &DocumentId, spec: &UpdateSpec) -> Result<bool> {
        let mut map = self.map.write();
        let Some(doc) = map.get_mut(id) else {
            return Ok(false);
        };
        apply_update(doc, spec);
        Ok(true)
    }

    fn delete(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.map.write().remove(id))
    }

    fn find_all(&self) -> Result<Vec<Document>> {
        Ok(self.map.read().values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.map.read().len())
    }

    fn compact(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats { document_count: self.map.read().len(), ..StorageStats::default() })
    }
}
