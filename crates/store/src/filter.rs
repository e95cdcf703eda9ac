//! Field filters for [`DocumentStore::query`](crate::DocumentStore::query).

use std::cmp::Ordering;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value.
    Eq,
    /// Array field contains the value, or string field contains the
    /// substring.
    Contains,
    /// Field is less than or equal (numbers or strings).
    Lte,
    /// Field is greater than or equal (numbers or strings).
    Gte,
}

/// A predicate on one (dot-separated) field path.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), op: FilterOp::Eq, value: value.into() }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), op: FilterOp::Contains, value: value.into() }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), op: FilterOp::Lte, value: value.into() }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), op: FilterOp::Gte, value: value.into() }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        let Some(actual) = lookup(doc, &self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Contains => match (actual, &self.value) {
                (Value::Array(items), needle) => items.contains(needle),
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                _ => false,
            },
            FilterOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Resolve a dot-separated path (`"metadata.step"`) inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, segment| cur.get(segment))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
