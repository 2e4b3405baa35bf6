//! Top-level multi-collection registry: resolves a collection name to a
//! storage-engine-backed handle, enforcing that a name keeps the id kind
//! it was first created with, grounded on the teacher's `Engine`
//! (`collections: RwLock<HashMap<String, Arc<Collection>>>`,
//! create/get/delete/list/rename) generalized from one shared WASP
//! storage engine to one storage engine per collection.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use parking_lot::RwLock;

use crate::collection::Collection;
use crate::config::Config;
use crate::document::IdKind;
use crate::errors::{MinileafError, Result};
use crate::fsutil;
use crate::storage::{LruLogEngine, MemoryEngine, StorageEngine, WalSnapshotEngine};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Engine {
    config: Config,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Open an engine rooted at `config.data_dir`, creating the
    /// directory (and, unless `memory_only`, the logs subdirectory) if
    /// missing.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = fsutil::normalize_data_dir(&config.data_dir);
        if !config.memory_only {
            std::fs::create_dir_all(data_dir.join("collections"))?;
            if let Err(e) = crate::logging::init_for_data_dir(&data_dir) {
                log::warn!("could not initialize file logging under {}: {e}", data_dir.display());
            }
            log::info!("opening minileaf database at {} (features: {:?})", data_dir.display(), crate::build_info::COMPILED_FEATURES);
        }
        let config = Config { data_dir, ..config };
        Ok(Self { config, collections: RwLock::new(HashMap::new()), cancel: Arc::new(AtomicBool::new(false)) })
    }

    fn build_storage(&self, name: &str) -> Result<Arc<dyn StorageEngine>> {
        let key = self.config.encryption_key();
        if self.config.memory_only {
            return Ok(Arc::new(MemoryEngine::new()));
        }
        if let Some(cache_size) = self.config.cache_size {
            let path = fsutil::collection_path(&self.config.data_dir, name, "data");
            let engine = LruLogEngine::open(path, key, self.config.sync_on_write, cache_size)?;
            return Ok(Arc::new(engine));
        }
        let wal_path = fsutil::collection_path(&self.config.data_dir, name, "wal");
        let snapshot_path = fsutil::collection_path(&self.config.data_dir, name, "snapshot");
        let engine = WalSnapshotEngine::open(wal_path, snapshot_path, key, self.config.sync_on_write, self.config.wal_max_bytes_before_snapshot)?;
        Ok(Arc::new(engine))
    }

    /// Resolve `name` to its collection handle, creating it with `id_kind`
    /// on first use.
    ///
    /// # Errors
    /// Returns [`MinileafError::CollectionIdTypeMismatch`] if `name`
    /// already exists under a different id kind.
    pub fn collection(&self, name: &str, id_kind: IdKind) -> Result<Arc<Collection>> {
        if let Some(existing) = self.collections.read().get(name) {
            return Self::check_kind(existing, name, id_kind);
        }
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            return Self::check_kind(existing, name, id_kind);
        }
        let storage = self.build_storage(name)?;
        let collection = Arc::new(Collection::new(name.to_string(), id_kind, storage, self.config.max_document_size, self.cancel.clone()));
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    fn check_kind(existing: &Arc<Collection>, name: &str, requested: IdKind) -> Result<Arc<Collection>> {
        if existing.id_kind() != requested {
            return Err(MinileafError::CollectionIdTypeMismatch { name: name.to_string(), existing: existing.id_kind(), requested });
        }
        Ok(existing.clone())
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// # Errors
    /// Returns [`MinileafError::NoSuchCollection`].
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let removed = self.collections.write().remove(name);
        match removed {
            Some(collection) => {
                collection.shutdown(DEFAULT_SHUTDOWN_GRACE);
                Ok(())
            }
            None => Err(MinileafError::NoSuchCollection(name.to_string())),
        }
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// # Errors
    /// Returns [`MinileafError::NoSuchCollection`] if `old` is absent, or
    /// [`MinileafError::CollectionAlreadyExists`] if `new` is taken.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if !collections.contains_key(old) {
            return Err(MinileafError::NoSuchCollection(old.to_string()));
        }
        if collections.contains_key(new) {
            return Err(MinileafError::CollectionAlreadyExists(new.to_string()));
        }
        let collection = collections.remove(old).expect("presence just checked above");
        collections.insert(new.to_string(), collection);
        Ok(())
    }

    /// Compact every collection's storage engine.
    ///
    /// # Errors
    /// Returns the first compaction error encountered.
    pub fn compact_all(&self) -> Result<()> {
        for collection in self.collections.read().values() {
            collection.compact()?;
        }
        Ok(())
    }

    /// Signal every collection's background tasks to stop and join them
    /// within the shutdown grace period.
    pub fn shutdown(&self) {
        for collection in self.collections.read().values() {
            collection.shutdown(DEFAULT_SHUTDOWN_GRACE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        Config::default().with_memory_only(true)
    }

    #[test]
    fn collection_is_created_once_and_reused_by_name() {
        let engine = Engine::open(memory_config()).unwrap();
        let a = engine.collection("widgets", IdKind::Int).unwrap();
        let b = engine.collection("widgets", IdKind::Int).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn reopening_with_a_different_id_kind_fails_loudly() {
        let engine = Engine::open(memory_config()).unwrap();
        engine.collection("widgets", IdKind::Int).unwrap();
        let err = engine.collection("widgets", IdKind::Uuid).unwrap_err();
        assert!(matches!(err, MinileafError::CollectionIdTypeMismatch { .. }));
    }

    #[test]
    fn rename_moves_the_handle_under_the_new_name() {
        let engine = Engine::open(memory_config()).unwrap();
        engine.collection("widgets", IdKind::Int).unwrap();
        engine.rename_collection("widgets", "gadgets").unwrap();
        assert!(engine.get_collection("widgets").is_none());
        assert!(engine.get_collection("gadgets").is_some());
    }

    #[test]
    fn delete_collection_reports_missing_name() {
        let engine = Engine::open(memory_config()).unwrap();
        let err = engine.delete_collection("ghost").unwrap_err();
        assert!(matches!(err, MinileafError::NoSuchCollection(_)));
    }
}
