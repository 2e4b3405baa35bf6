//! Atomic partial updates over a document tree: `$set`, `$unset`, `$inc`,
//! applied in that fixed order regardless of the order operator groups
//! arrive in, generalizing the dotted-path walk `document::path` already
//! provides from read-only to mutation.
use bson::Bson;

use crate::document::{get_path, remove_path, set_path};

/// A single field-level mutation. `Inc`'s delta carries its own numeric
/// type so the stored result type can be derived from it.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
}

/// One parsed `update_by_id` call: independent groups of ops, always
/// applied `$set` then `$unset` then `$inc` no matter the order `ops` was
/// built in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    pub ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    #[must_use]
    pub fn new(ops: Vec<UpdateOp>) -> Self {
        Self { ops }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Apply `spec` to `doc` in place, in the stable `$set` / `$unset` / `$inc`
/// order regardless of how `spec.ops` is arranged.
pub fn apply(doc: &mut bson::Document, spec: &UpdateSpec) {
    for op in &spec.ops {
        if let UpdateOp::Set(path, value) = op {
            set_path(doc, path, value.clone());
        }
    }
    for op in &spec.ops {
        if let UpdateOp::Unset(path) = op {
            remove_path(doc, path);
        }
    }
    for op in &spec.ops {
        if let UpdateOp::Inc(path, delta) = op {
            let current = get_path(doc, path).cloned().unwrap_or(Bson::Int64(0));
            set_path(doc, path, increment(&current, delta));
        }
    }
}

/// Add `delta` to `current`, widening int32 to int64 and falling back to
/// zero for a non-numeric current leaf. The result takes `delta`'s
/// numeric type: a double delta always yields a double result.
fn increment(current: &Bson, delta: &Bson) -> Bson {
    let delta_is_double = matches!(delta, Bson::Double(_));
    let current_is_double = matches!(current, Bson::Double(_));
    if delta_is_double || current_is_double {
        let cur = as_f64(current).unwrap_or(0.0);
        let add = as_f64(delta).unwrap_or(0.0);
        Bson::Double(cur + add)
    } else {
        let cur = as_i64(current).unwrap_or(0);
        let add = as_i64(delta).unwrap_or(0);
        Bson::Int64(cur + add)
    }
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) => Some(*f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_creates_intermediate_maps_and_stores_explicit_null() {
        let mut d = doc! { "m": "x" };
        apply(&mut d, &UpdateSpec::new(vec![UpdateOp::Set("m".to_string(), Bson::Null)]));
        assert_eq!(d.get("m"), Some(&Bson::Null));
        assert!(d.contains_key("m"));
    }

    #[test]
    fn unset_leaves_intermediates_intact() {
        let mut d = doc! { "a": { "b": 1i64, "c": 2i64 } };
        apply(&mut d, &UpdateSpec::new(vec![UpdateOp::Unset("a.b".to_string())]));
        assert!(d.get_document("a").unwrap().get("b").is_none());
        assert_eq!(d.get_document("a").unwrap().get("c"), Some(&Bson::Int64(2)));
    }

    #[test]
    fn inc_treats_absent_field_as_zero_and_widens_int32() {
        let mut d = doc! {};
        apply(&mut d, &UpdateSpec::new(vec![UpdateOp::Inc("n".to_string(), Bson::Int32(5))]));
        assert_eq!(d.get("n"), Some(&Bson::Int64(5)));
    }

    #[test]
    fn inc_with_double_delta_yields_double_result() {
        let mut d = doc! { "n": 2i64 };
        apply(&mut d, &UpdateSpec::new(vec![UpdateOp::Inc("n".to_string(), Bson::Double(1.5))]));
        assert_eq!(d.get("n"), Some(&Bson::Double(3.5)));
    }

    #[test]
    fn groups_apply_in_set_unset_inc_order_regardless_of_arrival_order() {
        let mut d = doc! { "n": 1i64, "doomed": "x" };
        let spec = UpdateSpec::new(vec![
            UpdateOp::Inc("n".to_string(), Bson::Int64(1)),
            UpdateOp::Unset("doomed".to_string()),
            UpdateOp::Set("n".to_string(), Bson::Int64(10)),
        ]);
        apply(&mut d, &spec);
        assert_eq!(d.get("n"), Some(&Bson::Int64(11)));
        assert!(!d.contains_key("doomed"));
    }

    #[test]
    fn non_numeric_leaf_is_overwritten_by_typed_sum_from_zero() {
        let mut d = doc! { "n": "not a number" };
        apply(&mut d, &UpdateSpec::new(vec![UpdateOp::Inc("n".to_string(), Bson::Int64(3))]));
        assert_eq!(d.get("n"), Some(&Bson::Int64(3)));
    }
}
