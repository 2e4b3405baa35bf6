//! Compound-key ordered index: a B-tree-ordered map from a tuple of
//! comparable values to the id set sharing that tuple, generalizing the
//! teacher's single-field `BTreeIndex` to multiple key fields.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use bson::Bson;
use parking_lot::RwLock;

use super::{Index, SortDirection};
use crate::document::{Document, DocumentId, compare_values, get_path};
use crate::errors::{MinileafError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexKey(Vec<Bson>);

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let c = compare_values(a, b);
            if c != Ordering::Equal {
                return c;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

pub struct OrderedIndex {
    name: String,
    fields: Vec<String>,
    unique: bool,
    map: RwLock<BTreeMap<IndexKey, HashSet<DocumentId>>>,
}

impl OrderedIndex {
    #[must_use]
    pub fn new(name: String, key_fields: Vec<(String, SortDirection)>, unique: bool) -> Self {
        Self { name, fields: key_fields.into_iter().map(|(f, _)| f).collect(), unique, map: RwLock::new(BTreeMap::new()) }
    }

    fn key_for(&self, doc: &Document) -> IndexKey {
        IndexKey(self.fields.iter().map(|f| get_path(&doc.data, f).cloned().unwrap_or(Bson::Null)).collect())
    }

    fn insert_key(&self, id: &DocumentId, key: IndexKey) -> Result<()> {
        let mut map = self.map.write();
        let entry = map.entry(key.clone()).or_default();
        let collides = self.unique && !entry.is_empty() && !(entry.len() == 1 && entry.contains(id));
        if collides {
            return Err(MinileafError::DuplicateKey { index: self.name.clone(), key: format!("{:?}", key.0) });
        }
        entry.insert(id.clone());
        Ok(())
    }

    fn remove_key(&self, id: &DocumentId, key: &IndexKey) {
        let mut map = self.map.write();
        if let Some(set) = map.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                map.remove(key);
            }
        }
    }
}

impl Index for OrderedIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn on_insert(&self, id: &DocumentId, doc: &Document) -> Result<()> {
        self.insert_key(id, self.key_for(doc))
    }

    fn on_update(&self, id: &DocumentId, old: &Document, new: &Document) -> Result<()> {
        let old_key = self.key_for(old);
        let new_key = self.key_for(new);
        if old_key == new_key {
            return Ok(());
        }
        self.insert_key(id, new_key)?;
        self.remove_key(id, &old_key);
        Ok(())
    }

    fn on_remove(&self, id: &DocumentId, doc: &Document) {
        self.remove_key(id, &self.key_for(doc));
    }

    fn find_equals(&self, values: &[Bson]) -> Option<HashSet<DocumentId>> {
        if values.is_empty() || values.len() > self.fields.len() {
            return None;
        }
        let map = self.map.read();
        if values.len() == self.fields.len() {
            return Some(map.get(&IndexKey(values.to_vec())).cloned().unwrap_or_default());
        }
        // Partial prefix: a full scan. Less than O(log n), but correct;
        // only a full-length key gets the direct B-tree hit.
        let mut out = HashSet::new();
        for (key, ids) in map.iter() {
            let matches = values.iter().zip(key.0.iter()).all(|(v, k)| compare_values(v, k) == Ordering::Equal);
            if matches {
                out.extend(ids.iter().cloned());
            }
        }
        Some(out)
    }

    fn find_range(&self, min: Option<&Bson>, max: Option<&Bson>) -> Option<HashSet<DocumentId>> {
        let map = self.map.read();
        let mut out = HashSet::new();
        for (key, ids) in map.iter() {
            let Some(first) = key.0.first() else { continue };
            if let Some(min) = min {
                if compare_values(first, min) == Ordering::Less {
                    continue;
                }
            }
            if let Some(max) = max {
                if compare_values(first, max) == Ordering::Greater {
                    continue;
                }
            }
            out.extend(ids.iter().cloned());
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn doc_with(id: i64, field: &str, value: i64) -> (DocumentId, Document) {
        let id = DocumentId::Int(id);
        (id.clone(), Document::new(id, doc! { field: value }))
    }

    #[test]
    fn equality_lookup_on_full_key() {
        let idx = OrderedIndex::new("age_1".to_string(), vec![("age".to_string(), SortDirection::Asc)], false);
        let (id, doc) = doc_with(1, "age", 30);
        idx.on_insert(&id, &doc).unwrap();
        let found = idx.find_equals(&[Bson::Int64(30)]).unwrap();
        assert!(found.contains(&id));
    }

    #[test]
    fn unique_allows_same_id_same_value_as_no_op() {
        let idx = OrderedIndex::new("email_1".to_string(), vec![("email".to_string(), SortDirection::Asc)], true);
        let doc = Document::new(DocumentId::Int(1), doc! { "email": "a" });
        idx.on_insert(&DocumentId::Int(1), &doc).unwrap();
        assert!(idx.on_insert(&DocumentId::Int(1), &doc).is_ok());
    }

    #[test]
    fn unique_rejects_second_id_same_value() {
        let idx = OrderedIndex::new("email_1".to_string(), vec![("email".to_string(), SortDirection::Asc)], true);
        let doc_a = Document::new(DocumentId::Int(1), doc! { "email": "a" });
        let doc_b = Document::new(DocumentId::Int(2), doc! { "email": "a" });
        idx.on_insert(&DocumentId::Int(1), &doc_a).unwrap();
        let err = idx.on_insert(&DocumentId::Int(2), &doc_b).unwrap_err();
        assert!(matches!(err, MinileafError::DuplicateKey { .. }));
    }

    #[test]
    fn range_query_is_inclusive() {
        let idx = OrderedIndex::new("age_1".to_string(), vec![("age".to_string(), SortDirection::Asc)], false);
        for (id, age) in [(1, 10), (2, 20), (3, 30)] {
            let (id, doc) = doc_with(id, "age", age);
            idx.on_insert(&id, &doc).unwrap();
        }
        let found = idx.find_range(Some(&Bson::Int64(10)), Some(&Bson::Int64(20))).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&DocumentId::Int(1)));
        assert!(found.contains(&DocumentId::Int(2)));
        assert!(!found.contains(&DocumentId::Int(3)));
    }

    #[test]
    fn update_moves_id_between_keys() {
        let idx = OrderedIndex::new("age_1".to_string(), vec![("age".to_string(), SortDirection::Asc)], false);
        let (id, doc_old) = doc_with(1, "age", 10);
        idx.on_insert(&id, &doc_old).unwrap();
        let doc_new = Document::new(id.clone(), doc! { "age": 99i64 });
        idx.on_update(&id, &doc_old, &doc_new).unwrap();
        assert!(idx.find_equals(&[Bson::Int64(10)]).unwrap().is_empty());
        assert!(idx.find_equals(&[Bson::Int64(99)]).unwrap().contains(&id));
    }
}
