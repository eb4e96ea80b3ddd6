// SPDX-License-Identifier: MPL-2.0

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Field map of a stored document
pub type Fields = serde_json::Map<String, Value>;

/// Server-assigned instant in milliseconds since the unix epoch.
/// The store hands these out in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

/// A document as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode the field map into a typed record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Serialize a record into a field map
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::In { field, .. } => field,
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Eq { field, value } => fields.get(field) == Some(value),
            Self::In { field, values } => fields.get(field).is_some_and(|v| values.contains(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Position just past the last document of a page.
///
/// Holds the ordering value of that document plus its id, so a query can
/// resume strictly after it even when several documents share a value.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    doc_id: String,
    order_value: Value,
}

impl PageCursor {
    pub fn new(doc_id: impl Into<String>, order_value: Value) -> Self {
        Self {
            doc_id: doc_id.into(),
            order_value,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn order_value(&self) -> &Value {
        &self.order_value
    }
}

/// Compound query: every filter must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<PageCursor>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn where_in<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filters.push(Filter::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<PageCursor>) -> Self {
        self.start_after = cursor;
        self
    }
}

/// One change inside an `update` call
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set { field: String, value: Value },
    Increment { field: String, delta: i64 },
    ArrayUnion { field: String, value: Value },
    ArrayRemove { field: String, value: Value },
}

impl FieldUpdate {
    /// Apply to a field map in place
    pub fn apply(&self, fields: &mut Fields) {
        match self {
            Self::Set { field, value } => {
                fields.insert(field.clone(), value.clone());
            }
            Self::Increment { field, delta } => {
                let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
                // Counters never go negative
                let next = current.saturating_add(*delta).max(0);
                fields.insert(field.clone(), Value::from(next));
            }
            Self::ArrayUnion { field, value } => {
                let entry = fields
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry
                    && !items.contains(value)
                {
                    items.push(value.clone());
                }
            }
            Self::ArrayRemove { field, value } => {
                if let Some(Value::Array(items)) = fields.get_mut(field) {
                    items.retain(|item| item != value);
                }
            }
        }
    }
}

/// Total order over JSON values used for sorting and cursors:
/// null < bool < number < string < anything else
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn increment_starts_from_zero_and_never_goes_negative() {
        let mut doc = fields(json!({}));
        FieldUpdate::Increment {
            field: "likeCount".into(),
            delta: 1,
        }
        .apply(&mut doc);
        assert_eq!(doc["likeCount"], json!(1));

        FieldUpdate::Increment {
            field: "likeCount".into(),
            delta: -5,
        }
        .apply(&mut doc);
        assert_eq!(doc["likeCount"], json!(0));
    }

    #[test]
    fn array_union_is_idempotent_and_remove_drops_value() {
        let mut doc = fields(json!({ "likedBy": ["a"] }));
        let union = FieldUpdate::ArrayUnion {
            field: "likedBy".into(),
            value: json!("b"),
        };
        union.apply(&mut doc);
        union.apply(&mut doc);
        assert_eq!(doc["likedBy"], json!(["a", "b"]));

        FieldUpdate::ArrayRemove {
            field: "likedBy".into(),
            value: json!("a"),
        }
        .apply(&mut doc);
        assert_eq!(doc["likedBy"], json!(["b"]));
    }

    #[test]
    fn filters_match_eq_and_in() {
        let doc = fields(json!({ "creatorId": "u1", "creatorPhoneLastNine": "771234567" }));

        assert!(Filter::Eq { field: "creatorId".into(), value: json!("u1") }.matches(&doc));
        assert!(
            Filter::In {
                field: "creatorPhoneLastNine".into(),
                values: vec![json!("000000000"), json!("771234567")],
            }
            .matches(&doc)
        );
        assert!(!Filter::Eq { field: "missing".into(), value: json!("u1") }.matches(&doc));
    }

    #[test]
    fn values_order_numbers_numerically() {
        assert_eq!(compare_values(&json!(9), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
    }
}
