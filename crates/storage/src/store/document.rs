#![forbid(unsafe_code)]

use boost_core::paths::CollectionPath;
use serde_json::Value;
use std::cmp::Ordering;

pub type Fields = serde_json::Map<String, Value>;

/// Store-managed creation timestamp; not part of `Document::fields`.
pub const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    pub created_at_ms: i64,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<Value> {
        if name == CREATED_AT_FIELD {
            return Some(Value::from(self.created_at_ms));
        }
        self.fields.get(name).cloned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionQuery {
    pub path: CollectionPath,
    pub order_by: String,
    pub direction: Direction,
}

impl CollectionQuery {
    pub fn newest_first(path: CollectionPath) -> Self {
        Self {
            path,
            order_by: CREATED_AT_FIELD.to_string(),
            direction: Direction::Descending,
        }
    }

    pub fn oldest_first(path: CollectionPath) -> Self {
        Self {
            path,
            order_by: CREATED_AT_FIELD.to_string(),
            direction: Direction::Ascending,
        }
    }
}

/// Sorts by the query's field, then `createdAt`, then id; documents missing the field
/// sort before those that have it.
pub fn sort_documents(docs: &mut [Document], order_by: &str, direction: Direction) {
    docs.sort_by(|a, b| {
        let primary = compare_values(a.field(order_by).as_ref(), b.field(order_by).as_ref());
        let ordering = primary
            .then_with(|| a.created_at_ms.cmp(&b.created_at_ms))
            .then_with(|| a.id.cmp(&b.id));
        match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
