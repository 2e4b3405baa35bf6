use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use uuid::Uuid;

use crate::errors::{MinileafError, Result};

/// Which identifier variant a collection was born with. Fixed at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdKind {
    ObjectId,
    Uuid,
    Text,
    Int,
}

/// A polymorphic document identifier. Ordered and total across variants:
/// same-variant values compare by their natural order, cross-variant
/// values order by variant tag (`ObjectId < Uuid < Text < Int`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentId {
    ObjectId(ObjectId),
    Uuid(Uuid),
    Text(String),
    Int(i64),
}

impl DocumentId {
    #[must_use]
    pub fn kind(&self) -> IdKind {
        match self {
            Self::ObjectId(_) => IdKind::ObjectId,
            Self::Uuid(_) => IdKind::Uuid,
            Self::Text(_) => IdKind::Text,
            Self::Int(_) => IdKind::Int,
        }
    }

    /// Generate a fresh id of the given variant.
    #[must_use]
    pub fn generate(kind: IdKind) -> Self {
        match kind {
            IdKind::ObjectId => Self::ObjectId(ObjectId::new()),
            IdKind::Uuid => Self::Uuid(Uuid::new_v4()),
            IdKind::Text => Self::Text(Uuid::new_v4().simple().to_string()),
            IdKind::Int => Self::Int(INT_ID_GENERATOR.next()),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::ObjectId(o) => o.to_hex(),
            Self::Uuid(u) => u.to_string(),
            Self::Text(s) => s.clone(),
            Self::Int(i) => i.to_string(),
        }
    }

    /// # Errors
    /// Returns an error if `s` does not parse as the given variant.
    pub fn parse_text(kind: IdKind, s: &str) -> Result<Self> {
        match kind {
            IdKind::ObjectId => ObjectId::parse_str(s)
                .map(Self::ObjectId)
                .map_err(|e| MinileafError::Codec(format!("invalid object-id '{s}': {e}"))),
            IdKind::Uuid => Uuid::parse_str(s)
                .map(Self::Uuid)
                .map_err(|e| MinileafError::Codec(format!("invalid uuid '{s}': {e}"))),
            IdKind::Text => Ok(Self::Text(s.to_string())),
            IdKind::Int => s
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|e| MinileafError::Codec(format!("invalid int id '{s}': {e}"))),
        }
    }

    #[must_use]
    pub fn to_bson(&self) -> bson::Bson {
        match self {
            Self::ObjectId(o) => bson::Bson::ObjectId(*o),
            Self::Uuid(u) => bson::Bson::String(u.to_string()),
            Self::Text(s) => bson::Bson::String(s.clone()),
            Self::Int(i) => bson::Bson::Int64(*i),
        }
    }

    #[must_use]
    pub fn from_bson(kind: IdKind, value: &bson::Bson) -> Option<Self> {
        match (kind, value) {
            (IdKind::ObjectId, bson::Bson::ObjectId(o)) => Some(Self::ObjectId(*o)),
            (IdKind::ObjectId, bson::Bson::String(s)) => ObjectId::parse_str(s).ok().map(Self::ObjectId),
            (IdKind::Uuid, bson::Bson::String(s)) => Uuid::parse_str(s).ok().map(Self::Uuid),
            (IdKind::Text, bson::Bson::String(s)) => Some(Self::Text(s.clone())),
            (IdKind::Int, bson::Bson::Int64(i)) => Some(Self::Int(*i)),
            (IdKind::Int, bson::Bson::Int32(i)) => Some(Self::Int(i64::from(*i))),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl PartialOrd for DocumentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentId {
    fn cmp(&self, other: &Self) -> Ordering {
        fn tag(d: &DocumentId) -> u8 {
            match d {
                DocumentId::ObjectId(_) => 0,
                DocumentId::Uuid(_) => 1,
                DocumentId::Text(_) => 2,
                DocumentId::Int(_) => 3,
            }
        }
        match (self, other) {
            (Self::ObjectId(a), Self::ObjectId(b)) => a.cmp(b),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => tag(self).cmp(&tag(other)),
        }
    }
}

/// The auto-increment id variant's process-wide monotonic counter, modeled as
/// a handle (not a bare free function) so tests can reset it explicitly.
pub struct IntIdGenerator(AtomicI64);

impl IntIdGenerator {
    const fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, AtomicOrdering::Relaxed)
    }

    pub fn reset(&self, to: i64) {
        self.0.store(to, AtomicOrdering::Relaxed);
    }
}

pub static INT_ID_GENERATOR: LazyLock<IntIdGenerator> = LazyLock::new(IntIdGenerator::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_variant() {
        for kind in [IdKind::ObjectId, IdKind::Uuid, IdKind::Text, IdKind::Int] {
            let id = DocumentId::generate(kind);
            let text = id.to_text();
            let parsed = DocumentId::parse_text(kind, &text).unwrap();
            assert_eq!(id, parsed);
        }
    }

    #[test]
    fn int_ids_are_monotonic_and_resettable() {
        INT_ID_GENERATOR.reset(100);
        let a = INT_ID_GENERATOR.next();
        let b = INT_ID_GENERATOR.next();
        assert_eq!(a, 100);
        assert_eq!(b, 101);
    }

    #[test]
    fn ordering_is_total_and_tag_then_value() {
        let oid = DocumentId::ObjectId(ObjectId::new());
        let uuid = DocumentId::Uuid(Uuid::new_v4());
        let text = DocumentId::Text("z".to_string());
        let int = DocumentId::Int(0);
        assert!(oid < uuid);
        assert!(uuid < text);
        assert!(text < int);
    }
}
