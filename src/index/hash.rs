//! Single-field equality index keyed by a stringified value ("enum-
//! optimized": an enum-like value keys by its name, everything else by
//! its textual form), mirroring the teacher's `HashIndex`.
use std::collections::{HashMap, HashSet};

use bson::Bson;
use parking_lot::RwLock;

use super::Index;
use crate::document::{Document, DocumentId, get_path, to_canonical_json};
use crate::errors::{MinileafError, Result};

fn stringify(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => to_canonical_json(other).to_string(),
    }
}

pub struct HashIndex {
    name: String,
    field: String,
    unique: bool,
    fields: [String; 1],
    map: RwLock<HashMap<String, HashSet<DocumentId>>>,
}

impl HashIndex {
    #[must_use]
    pub fn new(name: String, field: String, unique: bool) -> Self {
        let fields = [field.clone()];
        Self { name, field, unique, fields, map: RwLock::new(HashMap::new()) }
    }

    fn key_for(&self, doc: &Document) -> String {
        get_path(&doc.data, &self.field).map(stringify).unwrap_or_default()
    }

    fn insert_key(&self, id: &DocumentId, key: String) -> Result<()> {
        let mut map = self.map.write();
        let entry = map.entry(key.clone()).or_default();
        let collides = self.unique && !entry.is_empty() && !(entry.len() == 1 && entry.contains(id));
        if collides {
            return Err(MinileafError::DuplicateKey { index: self.name.clone(), key });
        }
        entry.insert(id.clone());
        Ok(())
    }

    fn remove_key(&self, id: &DocumentId, key: &str) {
        let mut map = self.map.write();
        if let Some(set) = map.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                map.remove(key);
            }
        }
    }
}

impl Index for HashIndex {
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
        let [value] = values else { return None };
        Some(self.map.read().get(&stringify(value)).cloned().unwrap_or_default())
    }
}
