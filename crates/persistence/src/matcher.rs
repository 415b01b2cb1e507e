//! In-process evaluation of filters and sort keys against JSON rows.
//!
//! Follows SQL semantics so the in-memory store agrees with PostgreSQL:
//! comparisons against an absent or JSON-null field are unknown, `AND` /
//! `OR` / `NOT` use three-valued logic, and a row is selected only when its
//! filter is definitely true. Text compares by code point, like `COLLATE "C"`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use domain::{Comparison, FieldKind, FieldRef, Filter, SortDirection, SortKey, Value};
use uuid::Uuid;

/// Reads a field from a row as a typed value. Absent, null or mistyped fields yield `None`.
pub fn extract(row: &serde_json::Value, field: &FieldRef) -> Option<Value> {
    let raw = row.get(field.name)?;
    match field.kind {
        FieldKind::Text => raw.as_str().map(|s| Value::Text(s.to_string())),
        FieldKind::Integer => raw.as_i64().map(Value::Integer),
        FieldKind::Float => raw.as_f64().map(Value::Float),
        FieldKind::Boolean => raw.as_bool().map(Value::Boolean),
        FieldKind::Uuid => raw
            .as_str()
            .and_then(|s| s.parse::<Uuid>().ok())
            .map(Value::Uuid),
        FieldKind::Timestamp => raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
    }
}

/// Orders two values of compatible kinds. Integers and floats compare numerically.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn holds(op: Comparison, ordering: Ordering) -> bool {
    match op {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Ne => ordering != Ordering::Equal,
        Comparison::Lt => ordering == Ordering::Less,
        Comparison::Le => ordering != Ordering::Greater,
        Comparison::Gt => ordering == Ordering::Greater,
        Comparison::Ge => ordering != Ordering::Less,
    }
}

/// Evaluates `filter` against `row`. `None` is SQL's unknown.
pub fn evaluate(filter: &Filter, row: &serde_json::Value) -> Option<bool> {
    match filter {
        Filter::Const(value) => Some(*value),
        Filter::Compare { field, op, value } => {
            let left = extract(row, field)?;
            compare_values(&left, value).map(|ordering| holds(*op, ordering))
        }
        Filter::Contains { field, needle } => match extract(row, field)? {
            Value::Text(text) => Some(text.to_lowercase().contains(&needle.to_lowercase())),
            _ => None,
        },
        Filter::OneOf { field, values } => {
            let left = extract(row, field)?;
            let mut unknown = false;
            for candidate in values {
                match compare_values(&left, candidate) {
                    Some(Ordering::Equal) => return Some(true),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown { None } else { Some(false) }
        }
        Filter::IsNull(field) => Some(extract(row, field).is_none()),
        Filter::And(a, b) => match (evaluate(a, row), evaluate(b, row)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Filter::Or(a, b) => match (evaluate(a, row), evaluate(b, row)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Filter::Not(a) => evaluate(a, row).map(|value| !value),
    }
}

/// Returns true if `row` definitely satisfies `filter`.
pub fn matches(filter: &Filter, row: &serde_json::Value) -> bool {
    evaluate(filter, row) == Some(true)
}

/// Orders two rows by `keys`. Absent values sort after present ones
/// ascending and before them descending, like PostgreSQL's defaults.
pub fn compare_rows(keys: &[SortKey], a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    for key in keys {
        let ordering = match (extract(a, &key.field), extract(b, &key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(&x, &y).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
