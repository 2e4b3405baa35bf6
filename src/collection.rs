//! Repository façade and collection admin: the per-collection handle
//! composed over a single storage engine and its index manager, grounded
//! on the teacher's `collection::ops` (persist-then-index write
//! sequencing) and `collection::index_admin` (offline index build by
//! scanning the live dataset).
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use bson::Bson;
use parking_lot::RwLock;

use crate::document::{Document, DocumentId, IdKind, extract_id, to_canonical_json, write_id};
use crate::errors::{MinileafError, Result};
use crate::index::{HashIndex, Index, IndexManager, OrderedIndex, PRIMARY_INDEX_NAME, PartialIndex, SortDirection, TtlIndex, generated_index_name};
use crate::query::{Filter, eval_filter};
use crate::storage::{StorageEngine, StorageStats};
use crate::update::UpdateSpec;

/// Document count, on-disk footprint, and per-index roster for `stats()`.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub document_count: usize,
    pub bytes_on_disk: u64,
    pub wal_bytes: u64,
    pub last_snapshot_epoch_ms: Option<i64>,
    pub index_names: Vec<String>,
}

/// What kind of secondary index to build, decoupled from storage so
/// `create_index` has one entry point regardless of variant.
pub enum IndexKind {
    Ordered { fields: Vec<(String, SortDirection)>, unique: bool },
    Hash { field: String, unique: bool },
    Ttl { expire_after_ms: i64 },
}

pub struct Collection {
    name: String,
    id_kind: IdKind,
    storage: Arc<dyn StorageEngine>,
    indexes: IndexManager,
    max_document_size: usize,
    /// Set on engine shutdown; checked by background index builds and
    /// TTL sweepers so they stop promptly instead of running forever.
    cancel: Arc<AtomicBool>,
    sweepers: RwLock<Vec<std::thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("id_kind", &self.id_kind)
            .finish_non_exhaustive()
    }
}

impl Collection {
    #[must_use]
    pub fn new(name: String, id_kind: IdKind, storage: Arc<dyn StorageEngine>, max_document_size: usize, cancel: Arc<AtomicBool>) -> Self {
        let indexes = IndexManager::new();
        let primary = Arc::new(OrderedIndex::new(PRIMARY_INDEX_NAME.to_string(), vec![("_id".to_string(), SortDirection::Asc)], true));
        indexes.create(primary).expect("a fresh index manager never already has the primary index");
        Self { name, id_kind, storage, indexes, max_document_size, cancel, sweepers: RwLock::new(Vec::new()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    /// The raw storage engine backing this collection, for admin tasks
    /// (e.g. [`crate::storage::migrate`]) that operate beneath the
    /// repository façade.
    #[must_use]
    pub fn as_storage(&self) -> &dyn StorageEngine {
        self.storage.as_ref()
    }

    fn encoded_size(data: &bson::Document) -> Result<usize> {
        Ok(serde_json::to_vec(&to_canonical_json(&Bson::Document(data.clone())))?.len())
    }

    // --- Repository façade (spec §4.7) ---

    /// Insert or replace `data`, assigning an id of this collection's
    /// kind if absent. Storage is written first; if index maintenance
    /// then fails (e.g. a unique-constraint violation), the write is
    /// reverted so the document does not end up durable without its
    /// indexes reflecting it.
    ///
    /// # Errors
    /// Returns [`MinileafError::DocumentTooLarge`] over the configured
    /// cap, or an index/storage error.
    pub fn save(&self, mut data: bson::Document) -> Result<Document> {
        let id = extract_id(&data, self.id_kind).unwrap_or_else(|| DocumentId::generate(self.id_kind));
        write_id(&mut data, &id);

        let size = Self::encoded_size(&data)?;
        if size > self.max_document_size {
            return Err(MinileafError::DocumentTooLarge { size, max: self.max_document_size });
        }

        let prior = self.storage.find_by_id(&id)?;
        let doc = Document::new(id.clone(), data);
        self.storage.upsert(doc.clone())?;

        let index_result = match &prior {
            Some(old) => self.indexes.apply_update(&id, old, &doc),
            None => self.indexes.apply_insert(&id, &doc),
        };
        if let Err(e) = index_result {
            match &prior {
                Some(old) => {
                    let _ = self.storage.upsert(old.clone());
                }
                None => {
                    let _ = self.storage.delete(&id);
                }
            }
            return Err(e);
        }
        Ok(doc)
    }

    /// Save every entry in `items` independently; not transactional
    /// across entries, so a later failure does not undo earlier successes.
    pub fn save_all(&self, items: Vec<bson::Document>) -> Vec<Result<Document>> {
        items.into_iter().map(|data| self.save(data)).collect()
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.storage.find_by_id(id)
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn delete_by_id(&self, id: &DocumentId) -> Result<bool> {
        match self.storage.delete(id)? {
            Some(old) => {
                self.indexes.apply_remove(id, &old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_all(&self) -> Result<Vec<Document>> {
        self.storage.find_all()
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Document>> {
        self.storage.find_page(skip, limit)
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn exists(&self, id: &DocumentId) -> Result<bool> {
        self.storage.exists(id)
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn count(&self) -> Result<usize> {
        self.storage.count()
    }

    /// Stream storage, keep documents matching `filter`, then paginate.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_all_matching(&self, filter: &Filter, skip: usize, limit: usize) -> Result<Vec<Document>> {
        Ok(self.storage.find_all()?.into_iter().filter(|d| eval_filter(filter, &d.data)).skip(skip).take(limit).collect())
    }

    /// Apply `spec` directly in storage. Per spec §9's open-question
    /// resolution, this bypasses index maintenance; indexes reflect the
    /// change only on the document's next full [`Collection::save`].
    ///
    /// # Errors
    /// Returns an error on storage failure. The returned bool is whether
    /// `id` existed.
    pub fn update_by_id(&self, id: &DocumentId, spec: &UpdateSpec) -> Result<bool> {
        self.storage.update_fields(id, spec)
    }

    /// Count documents matching `filter`. When `filter` is a single
    /// equality condition on a field with a usable index, this is a
    /// log-time index lookup; otherwise every document is streamed and
    /// evaluated.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn count_matching(&self, filter: &Filter) -> Result<usize> {
        if let Filter::FieldConds(field, ops) = filter
            && let [crate::query::FieldOp::Eq(value)] = ops.as_slice()
            && let Some(idx) = self.indexes.find_for_field(field)
            && let Some(ids) = idx.find_equals(std::slice::from_ref(value))
        {
            return Ok(ids.len());
        }
        Ok(self.storage.find_all()?.iter().filter(|d| eval_filter(filter, &d.data)).count())
    }

    /// Prefer a hash index on `field`; fall back to a full scan.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_by_enum_field(&self, field: &str, value: &Bson) -> Result<Vec<Document>> {
        if let Some(idx) = self.indexes.find_for_field(field)
            && let Some(ids) = idx.find_equals(std::slice::from_ref(value))
        {
            return ids.iter().filter_map(|id| self.storage.find_by_id(id).transpose()).collect();
        }
        Ok(self.storage.find_all()?.into_iter().filter(|d| crate::document::get_path(&d.data, field) == Some(value)).collect())
    }

    /// Prefer an ordered index on `field`; fall back to a full scan.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub fn find_by_range(&self, field: &str, min: Option<&Bson>, max: Option<&Bson>) -> Result<Vec<Document>> {
        if let Some(idx) = self.indexes.find_for_field(field)
            && let Some(ids) = idx.find_range(min, max)
        {
            return ids.iter().filter_map(|id| self.storage.find_by_id(id).transpose()).collect();
        }
        Ok(self
            .storage
            .find_all()?
            .into_iter()
            .filter(|d| {
                let Some(v) = crate::document::get_path(&d.data, field) else { return false };
                let above_min = min.is_none_or(|m| crate::document::compare_values(v, m).is_ge());
                let below_max = max.is_none_or(|m| crate::document::compare_values(v, m).is_le());
                above_min && below_max
            })
            .collect())
    }

    // --- Collection admin (spec §4.8) ---

    /// Build `kind` as a new index named `name` (or, if `name` is `None`,
    /// the generated `<field>_<dir>` join), inserting every current
    /// document into it. When `background` is true the build runs on a
    /// detached thread and the index is visible (possibly incomplete)
    /// immediately; otherwise the build completes before this returns.
    ///
    /// # Errors
    /// Returns [`MinileafError::IndexAlreadyExists`] if the name is taken.
    pub fn create_index(&self, name: Option<String>, kind: IndexKind, partial_filter: Option<Filter>, background: bool) -> Result<String> {
        let base: Arc<dyn Index> = match &kind {
            IndexKind::Ordered { fields, unique } => {
                let name = name.clone().unwrap_or_else(|| generated_index_name(fields));
                Arc::new(OrderedIndex::new(name, fields.clone(), *unique))
            }
            IndexKind::Hash { field, unique } => {
                let name = name.clone().unwrap_or_else(|| format!("{field}_hash"));
                Arc::new(HashIndex::new(name, field.clone(), *unique))
            }
            IndexKind::Ttl { expire_after_ms } => {
                let name = name.clone().unwrap_or_else(|| "ttl".to_string());
                Arc::new(TtlIndex::new(name, *expire_after_ms))
            }
        };

        let index: Arc<dyn Index> = match partial_filter {
            Some(filter) => Arc::new(PartialIndex::new(base, Arc::new(move |doc: &bson::Document| eval_filter(&filter, doc)))),
            None => base,
        };
        let index_name = index.name().to_string();
        self.indexes.create(index.clone())?;

        if background {
            let storage = self.storage.clone();
            let cancel = self.cancel.clone();
            let index = index.clone();
            let handle = std::thread::spawn(move || {
                let Ok(docs) = storage.find_all() else { return };
                for doc in docs {
                    if cancel.load(AtomicOrdering::Relaxed) {
                        log::warn!("background index build cancelled before completion");
                        return;
                    }
                    if let Err(e) = index.on_insert(&doc.id, &doc) {
                        log::error!("background index build failed for id {}: {e}", doc.id);
                        return;
                    }
                }
            });
            self.sweepers.write().push(handle);
        } else {
            for doc in self.storage.find_all()? {
                index.on_insert(&doc.id, &doc)?;
            }
        }
        Ok(index_name)
    }

    /// Start a TTL sweeper over `expire_after_ms`, deleting expired
    /// documents through the normal delete path.
    ///
    /// # Errors
    /// Returns [`MinileafError::IndexAlreadyExists`] if `name` is taken.
    pub fn create_ttl_index(self: &Arc<Self>, name: String, expire_after_ms: i64, sweep_interval: Duration) -> Result<String> {
        let ttl = Arc::new(TtlIndex::new(name.clone(), expire_after_ms));
        self.indexes.create(ttl.clone())?;
        let collection = Arc::clone(self);
        let handle = ttl.spawn_sweeper(
            sweep_interval,
            move |id| {
                if let Err(e) = collection.delete_by_id(id) {
                    log::error!("TTL expiration delete failed for id {id}: {e}");
                }
            },
            self.cancel.clone(),
        );
        self.sweepers.write().push(handle);
        Ok(name)
    }

    /// # Errors
    /// Returns [`MinileafError::IndexNotFound`] if absent, or refuses the primary index.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.indexes.drop(name)
    }

    #[must_use]
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.list()
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn stats(&self) -> Result<CollectionStats> {
        let StorageStats { document_count, bytes_on_disk, wal_bytes, last_snapshot_epoch_ms } = self.storage.stats()?;
        Ok(CollectionStats { document_count, bytes_on_disk, wal_bytes, last_snapshot_epoch_ms, index_names: self.indexes.list() })
    }

    /// # Errors
    /// Returns an error on storage failure.
    pub fn compact(&self) -> Result<()> {
        self.storage.compact()
    }

    /// Signal every background index build and TTL sweeper on this
    /// collection to stop, and join them within a bounded grace period.
    pub fn shutdown(&self, grace: Duration) {
        self.cancel.store(true, AtomicOrdering::Relaxed);
        let deadline = std::time::Instant::now() + grace;
        for handle in self.sweepers.write().drain(..) {
            if std::time::Instant::now() >= deadline {
                log::warn!("background task for collection '{}' outlived its shutdown grace period", self.name);
                break;
            }
            let _ = handle.join();
        }
    }
}
