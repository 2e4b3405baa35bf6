//! Wraps another index so only documents matching a predicate are kept
//! in it. The predicate is a plain closure rather than the `$`-operator
//! filter AST — the filter evaluator compiles a filter down to one of
//! these when `create_index` is called with a partial-filter option,
//! keeping the index subsystem independent of the query layer.
use std::collections::HashSet;
use std::sync::Arc;

use bson::Bson;

use super::Index;
use crate::document::{Document, DocumentId};
use crate::errors::Result;

pub struct PartialIndex {
    inner: Arc<dyn Index>,
    predicate: Arc<dyn Fn(&bson::Document) -> bool + Send + Sync>,
}

impl PartialIndex {
    #[must_use]
    pub fn new(inner: Arc<dyn Index>, predicate: Arc<dyn Fn(&bson::Document) -> bool + Send + Sync>) -> Self {
        Self { inner, predicate }
    }

    fn matches(&self, doc: &Document) -> bool {
        (self.predicate)(&doc.data)
    }
}

impl Index for PartialIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_unique(&self) -> bool {
        self.inner.is_unique()
    }

    fn fields(&self) -> &[String] {
        self.inner.fields()
    }

    fn on_insert(&self, id: &DocumentId, doc: &Document) -> Result<()> {
        if self.matches(doc) {
            self.inner.on_insert(id, doc)
        } else {
            Ok(())
        }
    }

    /// Evaluates the partial filter against `new` first; if it matches,
    /// the inner index is notified as an update/insert. If it doesn't but
    /// `old` matched, the inner index is notified to remove.
    fn on_update(&self, id: &DocumentId, old: &Document, new: &Document) -> Result<()> {
        let new_matches = self.matches(new);
        let old_matches = self.matches(old);
        match (old_matches, new_matches) {
            (true, true) => self.inner.on_update(id, old, new),
            (false, true) => self.inner.on_insert(id, new),
            (true, false) => {
                self.inner.on_remove(id, old);
                Ok(())
            }
            (false, false) => Ok(()),
        }
    }

    fn on_remove(&self, id: &DocumentId, doc: &Document) {
        if self.matches(doc) {
            self.inner.on_remove(id, doc);
        }
    }

    fn find_equals(&self, values: &[Bson]) -> Option<HashSet<DocumentId>> {
        self.inner.find_equals(values)
    }

    fn find_range(&self, min: Option<&Bson>, max: Option<&Bson>) -> Option<HashSet<DocumentId>> {
        self.inner.find_range(min, max)
    }
}
