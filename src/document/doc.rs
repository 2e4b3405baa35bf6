use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};

use super::id::{DocumentId, IdKind};

/// Legacy alias honored on read; `_id` is the normative field written on save.
pub const ID_FIELD: &str = "_id";
pub const LEGACY_ID_FIELD: &str = "id";

/// A stored document: an identifier plus its field tree. `data` always
/// carries the id under `_id` (or `id` if that is the field the caller
/// already used) so a full round-trip through storage never drops it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
}

impl Document {
    #[must_use]
    pub fn new(id: DocumentId, mut data: BsonDocument) -> Self {
        write_id(&mut data, &id);
        Self { id, data }
    }

    /// Build a document from raw data, assigning a fresh id of `kind` if
    /// the data carries none yet (checking `_id` then the legacy `id`).
    #[must_use]
    pub fn from_data(data: BsonDocument, kind: IdKind) -> Self {
        let id = extract_id(&data, kind).unwrap_or_else(|| DocumentId::generate(kind));
        Self::new(id, data)
    }
}

/// Read `_id`, falling back to the legacy `id` field.
#[must_use]
pub fn extract_id(doc: &BsonDocument, kind: IdKind) -> Option<DocumentId> {
    let raw = doc.get(ID_FIELD).or_else(|| doc.get(LEGACY_ID_FIELD))?;
    DocumentId::from_bson(kind, raw)
}

/// Write `id` into whichever of `_id`/`id` is already present on `doc`;
/// defaults to `_id` when neither is present.
pub fn write_id(doc: &mut BsonDocument, id: &DocumentId) {
    let field = if doc.contains_key(LEGACY_ID_FIELD) && !doc.contains_key(ID_FIELD) {
        LEGACY_ID_FIELD
    } else {
        ID_FIELD
    };
    doc.insert(field, id.to_bson());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn prefers_existing_field_and_defaults_to_underscore_id() {
        let mut with_legacy = doc! { "id": "keep-me", "x": 1i64 };
        write_id(&mut with_legacy, &DocumentId::Text("keep-me".to_string()));
        assert!(with_legacy.contains_key("id"));
        assert!(!with_legacy.contains_key("_id"));

        let mut bare = doc! { "x": 1i64 };
        write_id(&mut bare, &DocumentId::Text("fresh".to_string()));
        assert!(bare.contains_key("_id"));
    }
}
