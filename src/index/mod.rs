//! Per-collection index manager and the index kinds it coordinates,
//! grounded on `database/index.rs`'s `HashIndex`/`BTreeIndex`/
//! `IndexManager` shape, generalized to compound keys, partial
//! membership, and TTL expiry.
mod hash;
mod ordered;
mod partial;
mod ttl;

pub use hash::HashIndex;
pub use ordered::OrderedIndex;
pub use partial::PartialIndex;
pub use ttl::TtlIndex;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::document::{Document, DocumentId};
use crate::errors::{MinileafError, Result};

pub const PRIMARY_INDEX_NAME: &str = "_id_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Asc => "1",
            Self::Desc => "-1",
        }
    }
}

/// Generate `"<field>_<dir>"` joined by `_`, the teacher's index naming
/// convention generalized to a compound key.
#[must_use]
pub fn generated_index_name(fields: &[(String, SortDirection)]) -> String {
    fields.iter().map(|(f, d)| format!("{f}_{}", d.suffix())).collect::<Vec<_>>().join("_")
}

/// The write-path contract every index kind implements. Query methods
/// default to "not applicable" so the manager can probe an index without
/// knowing its concrete kind.
pub trait Index: Send + Sync {
    fn name(&self) -> &str;
    fn is_unique(&self) -> bool {
        false
    }
    /// Field paths this index keys on, in order. Empty for indexes (like
    /// TTL) that are not queryable by field.
    fn fields(&self) -> &[String];

    /// # Errors
    /// Returns [`MinileafError::DuplicateKey`] on a unique-constraint violation.
    fn on_insert(&self, id: &DocumentId, doc: &Document) -> Result<()>;

    /// # Errors
    /// Returns [`MinileafError::DuplicateKey`] on a unique-constraint violation.
    fn on_update(&self, id: &DocumentId, old: &Document, new: &Document) -> Result<()>;

    /// Undo a previously-applied [`Index::on_update`] call, invoked by
    /// [`IndexManager::apply_update`]'s rollback path when a later index
    /// fails. `current` is the document state the index was last told
    /// about (its `new` from the call being undone); `previous` is the
    /// state to return to (its `old`).
    ///
    /// Defaults to re-running `on_update` with the two swapped, which
    /// correctly undoes any index whose key is a pure function of the
    /// document (`OrderedIndex`, `HashIndex`). Errors are ignored: a
    /// rollback step cannot itself fail out of a rollback.
    fn on_update_rollback(&self, id: &DocumentId, current: &Document, previous: &Document) {
        let _ = self.on_update(id, current, previous);
    }

    fn on_remove(&self, id: &DocumentId, doc: &Document);

    /// Exact-match lookup when `values` is a usable prefix of this
    /// index's key. Returns `None` when this index cannot serve the query.
    fn find_equals(&self, _values: &[bson::Bson]) -> Option<HashSet<DocumentId>> {
        None
    }

    /// Inclusive range lookup on the first key field only.
    fn find_range(&self, _min: Option<&bson::Bson>, _max: Option<&bson::Bson>) -> Option<HashSet<DocumentId>> {
        None
    }
}

/// Owns every index for one collection, protected by a reader-writer
/// lock, enforcing the write-lock-then-individual-index-lock ordering
/// spelled out for the whole crate.
#[derive(Default)]
pub struct IndexManager {
    indexes: RwLock<BTreeMap<String, Arc<dyn Index>>>,
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`MinileafError::IndexAlreadyExists`] if `index.name()` is taken.
    pub fn create(&self, index: Arc<dyn Index>) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(index.name()) {
            return Err(MinileafError::IndexAlreadyExists(index.name().to_string()));
        }
        indexes.insert(index.name().to_string(), index);
        Ok(())
    }

    /// # Errors
    /// Returns [`MinileafError::IndexNotFound`] if absent, or refuses to drop the primary index.
    pub fn drop(&self, name: &str) -> Result<()> {
        if name == PRIMARY_INDEX_NAME {
            return Err(MinileafError::InvalidQuery("cannot drop the primary index".to_string()));
        }
        let mut indexes = self.indexes.write();
        if indexes.remove(name).is_none() {
            return Err(MinileafError::IndexNotFound(name.to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes.read().get(name).cloned()
    }

    /// The first non-TTL index whose leading key field is `field`,
    /// usable by the query planner for an equality or range probe.
    #[must_use]
    pub fn find_for_field(&self, field: &str) -> Option<Arc<dyn Index>> {
        self.indexes.read().values().find(|idx| idx.fields().first().map(String::as_str) == Some(field)).cloned()
    }

    /// Notify every index of an insert, rolling back indexes that already
    /// succeeded (in reverse order) if a later one fails.
    ///
    /// # Errors
    /// Returns the first index's error; on error no index in this
    /// manager reflects the insert.
    pub fn apply_insert(&self, id: &DocumentId, doc: &Document) -> Result<()> {
        let indexes = self.indexes.read();
        let mut applied = Vec::with_capacity(indexes.len());
        for index in indexes.values() {
            match index.on_insert(id, doc) {
                Ok(()) => applied.push(index.clone()),
                Err(e) => {
                    for rolled_back in applied.iter().rev() {
                        rolled_back.on_remove(id, doc);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Notify every index of an update, rolling back (via
    /// [`Index::on_update_rollback`]) indexes that already succeeded if a
    /// later one fails.
    ///
    /// # Errors
    /// Returns the first index's error.
    pub fn apply_update(&self, id: &DocumentId, old: &Document, new: &Document) -> Result<()> {
        let indexes = self.indexes.read();
        let mut applied = Vec::with_capacity(indexes.len());
        for index in indexes.values() {
            match index.on_update(id, old, new) {
                Ok(()) => applied.push(index.clone()),
                Err(e) => {
                    for rolled_back in applied.iter().rev() {
                        rolled_back.on_update_rollback(id, new, old);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn apply_remove(&self, id: &DocumentId, doc: &Document) {
        for index in self.indexes.read().values() {
            index.on_remove(id, doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn duplicate_index_name_is_rejected() {
        let manager = IndexManager::new();
        let a = Arc::new(OrderedIndex::new("a_1".to_string(), vec![("a".to_string(), SortDirection::Asc)], false));
        manager.create(a.clone()).unwrap();
        let err = manager.create(a).unwrap_err();
        assert!(matches!(err, MinileafError::IndexAlreadyExists(_)));
    }

    #[test]
    fn cannot_drop_primary_index() {
        let manager = IndexManager::new();
        let err = manager.drop(PRIMARY_INDEX_NAME).unwrap_err();
        assert!(matches!(err, MinileafError::InvalidQuery(_)));
    }

    #[test]
    fn unique_violation_rolls_back_prior_successful_indexes() {
        let manager = IndexManager::new();
        let unique =
            Arc::new(OrderedIndex::new("email_1".to_string(), vec![("email".to_string(), SortDirection::Asc)], true));
        let plain = Arc::new(OrderedIndex::new("age_1".to_string(), vec![("age".to_string(), SortDirection::Asc)], false));
        manager.create(plain.clone()).unwrap();
        manager.create(unique.clone()).unwrap();

        let (id_a, doc_a) = (DocumentId::Int(1), Document::new(DocumentId::Int(1), doc! { "email": "a", "age": 9i64 }));
        manager.apply_insert(&id_a, &doc_a).unwrap();

        let (id_b, doc_b) = (DocumentId::Int(2), Document::new(DocumentId::Int(2), doc! { "email": "a", "age": 40i64 }));
        let err = manager.apply_insert(&id_b, &doc_b).unwrap_err();
        assert!(matches!(err, MinileafError::DuplicateKey { .. }));

        // rollback means id_b never landed in the "age" index either.
        let ids = plain.find_equals(&[bson::Bson::Int64(40)]).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn update_rollback_leaves_ttl_timestamp_untouched() {
        let manager = IndexManager::new();
        let ttl = Arc::new(TtlIndex::new("ttl".to_string(), 60_000));
        let unique =
            Arc::new(OrderedIndex::new("email_1".to_string(), vec![("email".to_string(), SortDirection::Asc)], true));
        manager.create(ttl.clone()).unwrap();
        manager.create(unique.clone()).unwrap();

        let id_a = DocumentId::Int(1);
        let old_a = Document::new(id_a.clone(), doc! { "email": "a" });
        manager.apply_insert(&id_a, &old_a).unwrap();
        let recorded = ttl.recorded_timestamp(&id_a).unwrap();

        let id_b = DocumentId::Int(2);
        let old_b = Document::new(id_b.clone(), doc! { "email": "b" });
        manager.apply_insert(&id_b, &old_b).unwrap();

        // updating id_b's email to a duplicate of id_a's fails the unique
        // index after ttl has already accepted the update; ttl's rollback
        // must not stomp id_a's timestamp, which was never touched by
        // this update in the first place.
        let new_b = Document::new(id_b.clone(), doc! { "email": "a" });
        let err = manager.apply_update(&id_b, &old_b, &new_b).unwrap_err();
        assert!(matches!(err, MinileafError::DuplicateKey { .. }));
        assert_eq!(ttl.recorded_timestamp(&id_a).unwrap(), recorded);
    }
}
