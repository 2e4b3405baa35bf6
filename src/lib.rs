#![forbid(unsafe_code)]

pub mod build_info;
pub mod collection;
pub mod config;
pub mod crypto;
pub mod document;
pub mod engine;
pub mod errors;
mod fsutil;
pub mod index;
pub mod logging;
pub mod query;
pub mod storage;
pub mod update;

use std::sync::Arc;

pub use collection::{Collection, CollectionStats, IndexKind};
pub use config::Config;
pub use document::{Document, DocumentId, IdKind};
pub use errors::{MinileafError, Result};
pub use query::{FieldOp, Filter};
pub use update::{UpdateOp, UpdateSpec};

use engine::Engine;

/// The embedded database handle: one [`Engine`] managing every collection
/// opened against a configured data directory, mirroring the teacher's
/// `Database` façade over its own `Engine`.
pub struct Database {
    engine: Arc<Engine>,
}

impl Database {
    /// Open (or create) a database at `config.data_dir`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be prepared or a
    /// storage engine fails to initialize.
    pub fn open(config: Config) -> Result<Self> {
        Ok(Self { engine: Arc::new(Engine::open(config)?) })
    }

    /// Resolve (creating on first use) the named collection, fixing its
    /// id kind for the lifetime of the data directory.
    ///
    /// # Errors
    /// Returns [`MinileafError::CollectionIdTypeMismatch`] if the name was
    /// already created with a different id kind.
    pub fn collection(&self, name: &str, id_kind: IdKind) -> Result<Arc<Collection>> {
        self.engine.collection(name, id_kind)
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.engine.get_collection(name)
    }

    /// # Errors
    /// Returns [`MinileafError::NoSuchCollection`] if `name` is absent.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.engine.delete_collection(name)
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        self.engine.list_collection_names()
    }

    /// # Errors
    /// Returns an error if `old` is absent or `new` is already taken.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        self.engine.rename_collection(old, new)
    }

    /// Compact every collection's storage engine.
    ///
    /// # Errors
    /// Returns the first compaction error encountered.
    pub fn compact_all(&self) -> Result<()> {
        self.engine.compact_all()
    }

    /// Signal every background task (index builds, TTL sweepers) across
    /// every collection to stop, joining within a bounded grace period.
    pub fn close(&self) {
        self.engine.shutdown();
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_only_database_and_round_trip_a_document() {
        let db = Database::open(Config::default().with_memory_only(true)).unwrap();
        let widgets = db.collection("widgets", IdKind::Int).unwrap();
        let saved = widgets.save(bson::doc! { "name": "bolt" }).unwrap();
        assert_eq!(widgets.find_by_id(&saved.id).unwrap().unwrap().id, saved.id);
        assert_eq!(db.list_collection_names(), vec!["widgets".to_string()]);
    }
}
