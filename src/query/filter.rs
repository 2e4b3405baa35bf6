//! Filter wire form: a map of field -> (literal | operator map), with
//! `$and`/`$or`/`$not` at the top level, parsed from a
//! [`serde_json::Value`] into the [`Filter`] tree [`super::eval`] walks.
use bson::Bson;

use crate::document::from_canonical_json;
use crate::errors::{MinileafError, Result};

#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    FieldConds(String, Vec<FieldOp>),
}

#[derive(Debug, Clone)]
pub enum FieldOp {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    #[cfg(feature = "regex")]
    Regex { pattern: String, case_insensitive: bool },
    ElemMatch(Box<Filter>),
}

/// # Errors
/// Returns [`MinileafError::InvalidQuery`] for an unrecognized operator
/// or a malformed operand shape.
pub fn parse(value: &serde_json::Value) -> Result<Filter> {
    let obj = value.as_object().ok_or_else(|| MinileafError::InvalidQuery("filter must be an object".to_string()))?;
    let mut parts = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        parts.push(parse_entry(key, val)?);
    }
    Ok(match parts.len() {
        1 => parts.into_iter().next().expect("len checked to be 1"),
        _ => Filter::And(parts),
    })
}

fn parse_entry(key: &str, val: &serde_json::Value) -> Result<Filter> {
    match key {
        "$and" => Ok(Filter::And(parse_array(val)?)),
        "$or" => Ok(Filter::Or(parse_array(val)?)),
        "$not" => Ok(Filter::Not(Box::new(parse(val)?))),
        _ if key.starts_with('$') => Err(MinileafError::InvalidQuery(format!("unknown logical operator {key}"))),
        _ => Ok(Filter::FieldConds(key.to_string(), parse_field_value(val)?)),
    }
}

fn parse_array(val: &serde_json::Value) -> Result<Vec<Filter>> {
    let arr = val.as_array().ok_or_else(|| MinileafError::InvalidQuery("expected an array".to_string()))?;
    arr.iter().map(parse).collect()
}

fn is_operator_map(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn parse_field_value(value: &serde_json::Value) -> Result<Vec<FieldOp>> {
    if !is_operator_map(value) {
        return Ok(vec![FieldOp::Eq(from_canonical_json(value)?)]);
    }
    let serde_json::Value::Object(map) = value else { unreachable!("is_operator_map checked Object") };

    let mut ops = Vec::new();
    #[cfg(feature = "regex")]
    let mut regex_pattern: Option<String> = None;
    #[cfg(feature = "regex")]
    let mut regex_case_insensitive = false;

    for (key, val) in map {
        match key.as_str() {
            "$gt" => ops.push(FieldOp::Gt(from_canonical_json(val)?)),
            "$gte" => ops.push(FieldOp::Gte(from_canonical_json(val)?)),
            "$lt" => ops.push(FieldOp::Lt(from_canonical_json(val)?)),
            "$lte" => ops.push(FieldOp::Lte(from_canonical_json(val)?)),
            "$ne" => ops.push(FieldOp::Ne(from_canonical_json(val)?)),
            "$in" => ops.push(FieldOp::In(parse_value_array(val)?)),
            "$nin" => ops.push(FieldOp::Nin(parse_value_array(val)?)),
            "$exists" => {
                let b = val.as_bool().ok_or_else(|| MinileafError::InvalidQuery("$exists expects a boolean".to_string()))?;
                ops.push(FieldOp::Exists(b));
            }
            "$elemMatch" => ops.push(FieldOp::ElemMatch(Box::new(parse(val)?))),
            "$regex" => {
                #[cfg(feature = "regex")]
                {
                    let pattern = val
                        .as_str()
                        .ok_or_else(|| MinileafError::InvalidQuery("$regex expects a string".to_string()))?;
                    regex_pattern = Some(pattern.to_string());
                }
                #[cfg(not(feature = "regex"))]
                {
                    let _ = val;
                    return Err(MinileafError::InvalidQuery("$regex requires the \"regex\" feature".to_string()));
                }
            }
            "$options" => {
                #[cfg(feature = "regex")]
                {
                    regex_case_insensitive = val.as_str().is_some_and(|s| s.contains('i'));
                }
                #[cfg(not(feature = "regex"))]
                {
                    let _ = val;
                }
            }
            other => return Err(MinileafError::InvalidQuery(format!("unknown operator {other}"))),
        }
    }

    #[cfg(feature = "regex")]
    if let Some(pattern) = regex_pattern {
        ops.push(FieldOp::Regex { pattern, case_insensitive: regex_case_insensitive });
    }

    Ok(ops)
}

fn parse_value_array(value: &serde_json::Value) -> Result<Vec<Bson>> {
    let arr = value.as_array().ok_or_else(|| MinileafError::InvalidQuery("expected an array of values".to_string()))?;
    arr.iter().map(from_canonical_json).collect()
}
