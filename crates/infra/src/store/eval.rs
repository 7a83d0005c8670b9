//! In-process evaluation of filter clauses, sort keys and projections over
//! JSON documents.
//!
//! Query-string values arrive as text; they are coerced to the type of the
//! stored value before comparing (`price[gte]=100` compares numerically
//! against a numeric `price`). Array fields match when any element does.

use std::cmp::Ordering;

use serde_json::Value;

use natours_core::timestamp;
use natours_query::{ComparisonOp, Direction, FilterClause, Projection, SortSpec};

use super::{Document, StoreError};

/// Resolve a dotted path (`startLocation.address`).
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Whether `doc` satisfies every clause.
pub fn matches(doc: &Document, clauses: &[FilterClause]) -> bool {
    clauses
        .iter()
        .all(|clause| clause_holds(lookup(doc, &clause.field), clause))
}

fn clause_holds(stored: Option<&Value>, clause: &FilterClause) -> bool {
    match stored {
        None | Some(Value::Null) => match clause.op {
            ComparisonOp::Eq => clause.value.is_null(),
            ComparisonOp::Ne => !clause.value.is_null(),
            _ => false,
        },
        Some(Value::Array(items)) => match clause.op {
            ComparisonOp::Ne => !items
                .iter()
                .any(|item| coerce_cmp(item, &clause.value) == Some(Ordering::Equal)),
            op => items.iter().any(|item| scalar_holds(item, op, &clause.value)),
        },
        Some(value) => scalar_holds(value, clause.op, &clause.value),
    }
}

fn scalar_holds(stored: &Value, op: ComparisonOp, wanted: &Value) -> bool {
    match coerce_cmp(stored, wanted) {
        Some(ordering) => op.holds(ordering),
        // Values of different types are never equal and never ordered.
        None => op == ComparisonOp::Ne,
    }
}

/// `stored.cmp(wanted)` after coercing a textual `wanted` to the stored type.
fn coerce_cmp(stored: &Value, wanted: &Value) -> Option<Ordering> {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?)
        }
        (Value::String(a), Value::String(b)) => Some(compare_text(a, b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::String(b)) => match b.as_str() {
            "true" => Some(a.cmp(&true)),
            "false" => Some(a.cmp(&false)),
            _ => None,
        },
        _ => None,
    }
}

/// Two RFC 3339 instants compare by time, whatever their fraction width;
/// any other pair of strings compares as text.
fn compare_text(a: &str, b: &str) -> Ordering {
    if looks_like_instant(a) && looks_like_instant(b) {
        if let (Some(x), Some(y)) = (timestamp::parse(a), timestamp::parse(b)) {
            return x.cmp(&y);
        }
    }
    a.cmp(b)
}

fn looks_like_instant(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 20 && b[4] == b'-' && b[10] == b'T'
}

/// Sort order across types: missing/null, numbers, strings, objects, arrays,
/// booleans.
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => compare_text(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Stable multi-key sort; ties keep their current (insertion) order.
pub fn sort_documents(docs: &mut [Document], spec: &SortSpec) {
    docs.sort_by(|a, b| {
        for key in spec.keys() {
            let ordering = compare_values(lookup(a, &key.field), lookup(b, &key.field));
            let ordering = match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Drop private fields always, and whatever `projection` leaves out.
pub fn project(
    doc: Document,
    projection: &Projection,
    internal: &[&str],
    private: &[&str],
) -> Document {
    doc.into_iter()
        .filter(|(field, _)| {
            !private.contains(&field.as_str()) && projection.retains(field, internal)
        })
        .collect()
}

/// The duplicate-key error `candidate` would cause among `existing`, if any.
pub fn unique_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Document>,
    candidate: &Document,
    unique: &[&[&str]],
) -> Option<StoreError> {
    let existing: Vec<&Document> = existing.into_iter().collect();
    for index in unique {
        let values: Option<Vec<&Value>> = index
            .iter()
            .map(|field| lookup(candidate, field).filter(|v| !v.is_null()))
            .collect();
        let Some(values) = values else {
            continue;
        };

        let taken = existing.iter().any(|doc| {
            index
                .iter()
                .zip(&values)
                .all(|(field, value)| lookup(doc, field) == Some(*value))
        });
        if taken {
            return Some(StoreError::Duplicate {
                field: index.join(", "),
                value: values.iter().map(|v| display(v)).collect::<Vec<_>>().join(", "),
            });
        }
    }
    None
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
