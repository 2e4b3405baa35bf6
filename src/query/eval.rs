//! Walks a document against a [`Filter`] tree, resolving dotted paths and
//! applying temporal coercion on range comparisons, grounded on
//! `query/eval.rs`'s `eval_filter`/`compare_bson` pair.
use std::cmp::Ordering;

use bson::Bson;

use super::filter::{FieldOp, Filter};
use super::temporal;
use crate::document::{compare_values, get_path};

/// Evaluate `filter` against `doc`.
#[must_use]
pub fn eval_filter(filter: &Filter, doc: &bson::Document) -> bool {
    match filter {
        Filter::And(parts) => parts.iter().all(|f| eval_filter(f, doc)),
        Filter::Or(parts) => parts.iter().any(|f| eval_filter(f, doc)),
        Filter::Not(inner) => !eval_filter(inner, doc),
        Filter::FieldConds(path, conds) => {
            let value = get_path(doc, path);
            conds.iter().all(|cond| eval_cond(cond, value))
        }
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(_), _) | (_, Bson::Array(_)) | (Bson::Document(_), _) | (_, Bson::Document(_)) => a == b,
        _ => compare_values(a, b) == Ordering::Equal,
    }
}

/// `None` if `value` has no temporal reading and the comparison cannot
/// be carried out.
fn compare_for_range(value: &Bson, operand: &Bson) -> Option<Ordering> {
    if matches!(operand, Bson::DateTime(_)) {
        let value_ms = temporal::to_epoch_ms(value)?;
        let operand_ms = temporal::to_epoch_ms(operand)?;
        return Some(value_ms.cmp(&operand_ms));
    }
    Some(compare_values(value, operand))
}

fn eval_cond(cond: &FieldOp, value: Option<&Bson>) -> bool {
    match cond {
        FieldOp::Eq(operand) => match value {
            Some(v) => values_equal(v, operand),
            None => matches!(operand, Bson::Null),
        },
        FieldOp::Ne(operand) => match value {
            Some(v) => !values_equal(v, operand),
            None => !matches!(operand, Bson::Null),
        },
        FieldOp::Gt(operand) => value.and_then(|v| compare_for_range(v, operand)).is_some_and(Ordering::is_gt),
        FieldOp::Gte(operand) => value.and_then(|v| compare_for_range(v, operand)).is_some_and(|o| o.is_ge()),
        FieldOp::Lt(operand) => value.and_then(|v| compare_for_range(v, operand)).is_some_and(Ordering::is_lt),
        FieldOp::Lte(operand) => value.and_then(|v| compare_for_range(v, operand)).is_some_and(|o| o.is_le()),
        FieldOp::In(options) => match value {
            Some(v) => options.iter().any(|o| values_equal(v, o)),
            None => options.iter().any(|o| matches!(o, Bson::Null)),
        },
        FieldOp::Nin(options) => !eval_cond(&FieldOp::In(options.clone()), value),
        FieldOp::Exists(expected) => value.is_some() == *expected,
        #[cfg(feature = "regex")]
        FieldOp::Regex { pattern, case_insensitive } => eval_regex(pattern, *case_insensitive, value),
        FieldOp::ElemMatch(sub) => match value {
            Some(Bson::Array(items)) => {
                items.iter().any(|item| matches!(item, Bson::Document(d) if eval_filter(sub, d)))
            }
            _ => false,
        },
    }
}

#[cfg(feature = "regex")]
fn eval_regex(pattern: &str, case_insensitive: bool, value: Option<&Bson>) -> bool {
    let Some(Bson::String(text)) = value else { return false };
    let Ok(re) = regex::RegexBuilder::new(pattern).case_insensitive(case_insensitive).build() else {
        return false;
    };
    re.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::filter::parse;
    use bson::doc;
    use serde_json::json;

    fn matches(filter_json: serde_json::Value, doc: &bson::Document) -> bool {
        eval_filter(&parse(&filter_json).unwrap(), doc)
    }

    #[test]
    fn equality_and_implicit_and() {
        let d = doc! { "a": 1i64, "b": "x" };
        assert!(matches(json!({ "a": 1, "b": "x" }), &d));
        assert!(!matches(json!({ "a": 1, "b": "y" }), &d));
    }

    #[test]
    fn missing_path_equals_only_explicit_null() {
        let d = doc! { "a": 1i64 };
        assert!(matches(json!({ "missing": null }), &d));
        assert!(!matches(json!({ "missing": 1 }), &d));
    }

    #[test]
    fn comparison_operators_and_range() {
        let d = doc! { "age": 30i64 };
        assert!(matches(json!({ "age": { "$gte": 18, "$lt": 65 } }), &d));
        assert!(!matches(json!({ "age": { "$gt": 30 } }), &d));
    }

    #[test]
    fn in_and_nin() {
        let d = doc! { "status": "active" };
        assert!(matches(json!({ "status": { "$in": ["active", "pending"] } }), &d));
        assert!(matches(json!({ "status": { "$nin": ["closed"] } }), &d));
    }

    #[test]
    fn or_and_not() {
        let d = doc! { "a": 1i64 };
        assert!(matches(json!({ "$or": [ { "a": 2 }, { "a": 1 } ] }), &d));
        assert!(matches(json!({ "$not": { "a": 2 } }), &d));
    }

    #[test]
    fn elem_match_requires_a_satisfying_array_element() {
        let d = doc! { "items": [ { "qty": 1i64 }, { "qty": 9i64 } ] };
        assert!(matches(json!({ "items": { "$elemMatch": { "qty": { "$gt": 5 } } } }), &d));
        assert!(!matches(json!({ "items": { "$elemMatch": { "qty": { "$gt": 100 } } } }), &d));
    }

    #[test]
    fn temporal_comparison_coerces_text_and_seconds() {
        let d = doc! { "created": "2024-01-01T00:00:00Z" };
        let cutoff = bson::DateTime::from_millis(1_704_067_200_000 - 1000);
        let filter = Filter::FieldConds("created".to_string(), vec![FieldOp::Gt(Bson::DateTime(cutoff))]);
        assert!(eval_filter(&filter, &d));
    }

    #[test]
    fn dotted_path_indexes_into_arrays() {
        let d = doc! { "a": { "b": [ { "c": 1i64 }, { "c": 2i64 } ] } };
        assert!(matches(json!({ "a.b.1.c": 2 }), &d));
    }
}
