//! Canonical JSON-like emit/parse for document values, and the comparator
//! used both by index key extraction and the filter evaluator.
use bson::Bson;
use std::cmp::Ordering;

use crate::errors::{MinileafError, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

/// Emit a single value as canonical JSON, using `{"$oid": ..}`, `{"$date":
/// ..}` and `{"$binary": ..}` wrappers for the types JSON has no native
/// representation for (mirrors Mongo's extended JSON, which the teacher's
/// `bson` dependency already favors).
#[must_use]
pub fn to_canonical_json(value: &Bson) -> serde_json::Value {
    use serde_json::json;
    match value {
        Bson::Null => serde_json::Value::Null,
        Bson::Boolean(b) => json!(b),
        Bson::Int32(i) => json!(i),
        Bson::Int64(i) => json!(i),
        Bson::Double(f) => json!(f),
        Bson::String(s) => json!(s),
        Bson::Binary(b) => json!({ "$binary": encode_hex(&b.bytes) }),
        Bson::DateTime(dt) => json!({ "$date": dt.try_to_rfc3339_string().unwrap_or_default() }),
        Bson::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        Bson::Array(arr) => serde_json::Value::Array(arr.iter().map(to_canonical_json).collect()),
        Bson::Document(doc) => serde_json::Value::Object(
            doc.iter().map(|(k, v)| (k.clone(), to_canonical_json(v))).collect(),
        ),
        other => json!(other.to_string()),
    }
}

/// Parse a single canonical JSON value back into a document value.
///
/// # Errors
/// Returns an error if a `$binary`/`$oid`/`$date` wrapper has an invalid payload.
pub fn from_canonical_json(value: &serde_json::Value) -> Result<Bson> {
    match value {
        serde_json::Value::Null => Ok(Bson::Null),
        serde_json::Value::Bool(b) => Ok(Bson::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Bson::Int64(i))
            } else {
                Ok(Bson::Double(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => Ok(Bson::String(s.clone())),
        serde_json::Value::Array(arr) => {
            Ok(Bson::Array(arr.iter().map(from_canonical_json).collect::<Result<_>>()?))
        }
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(hex)) = map.get("$oid") {
                let oid = bson::oid::ObjectId::parse_str(hex)
                    .map_err(|e| MinileafError::Codec(format!("bad $oid: {e}")))?;
                return Ok(Bson::ObjectId(oid));
            }
            if let Some(serde_json::Value::String(date)) = map.get("$date") {
                let dt = bson::DateTime::parse_rfc3339_str(date)
                    .map_err(|e| MinileafError::Codec(format!("bad $date: {e}")))?;
                return Ok(Bson::DateTime(dt));
            }
            if let Some(serde_json::Value::String(hex)) = map.get("$binary") {
                let bytes = decode_hex(hex)
                    .ok_or_else(|| MinileafError::Codec("bad $binary hex".to_string()))?;
                return Ok(Bson::Binary(bson::Binary {
                    subtype: bson::spec::BinarySubtype::Generic,
                    bytes,
                }));
            }
            let mut doc = bson::Document::new();
            for (k, v) in map {
                doc.insert(k.clone(), from_canonical_json(v)?);
            }
            Ok(Bson::Document(doc))
        }
    }
}

/// True if `s` looks like a 24-character lowercase hex string — treated as
/// an object-id for ordering purposes even when stored as plain text.
#[must_use]
pub fn looks_like_object_id_hex(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn numeric_value(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Compare two document values for ordering and equality purposes.
/// Numeric coercion collapses all integers/floats to a comparable 64-bit
/// form; 24-char lowercase hex strings compare as object-ids.
#[must_use]
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (numeric_value(a), numeric_value(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => {
            match (looks_like_object_id_hex(x), looks_like_object_id_hex(y)) {
                (true, true) | (false, false) => x.cmp(y),
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
            }
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::String(y)) if looks_like_object_id_hex(y) => {
            x.to_hex().cmp(y)
        }
        (Bson::String(x), Bson::ObjectId(y)) if looks_like_object_id_hex(x) => {
            x.cmp(&y.to_hex())
        }
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null => 0,
        Bson::Boolean(_) => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 2,
        Bson::String(_) => 3,
        Bson::ObjectId(_) => 4,
        Bson::DateTime(_) => 5,
        Bson::Binary(_) => 6,
        Bson::Array(_) => 7,
        Bson::Document(_) => 8,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_every_leaf_type() {
        let doc = bson::doc! {
            "n": bson::Bson::Null,
            "b": true,
            "i": 7i64,
            "f": 1.5,
            "s": "hello",
            "a": [1i64, 2i64],
            "oid": bson::oid::ObjectId::new(),
        };
        let json = to_canonical_json(&Bson::Document(doc.clone()));
        let back = from_canonical_json(&json).unwrap();
        assert_eq!(back, Bson::Document(doc));
    }

    #[test]
    fn hex_strings_compare_as_object_ids() {
        let hex = "a".repeat(24);
        assert!(looks_like_object_id_hex(&hex));
        assert!(!looks_like_object_id_hex("short"));
    }

    #[test]
    fn numeric_coercion_collapses_int_and_float() {
        assert_eq!(compare_values(&Bson::Int32(3), &Bson::Double(3.0)), Ordering::Equal);
        assert_eq!(compare_values(&Bson::Int64(2), &Bson::Int32(3)), Ordering::Less);
    }
}
