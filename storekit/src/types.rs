use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// A single positional value bound into an insert statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Double(f64),
    Boolean(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Array(Vec<ColumnValue>),
    Null,
}

/// A row of positional values, ordered like the handler's data schema.
pub type BoundRow = Vec<ColumnValue>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnValue::Text(s) => serializer.serialize_str(s),
            ColumnValue::Int(i) => serializer.serialize_i64(*i),
            ColumnValue::UInt(u) => serializer.serialize_u64(*u),
            ColumnValue::Double(f) => serializer.serialize_f64(*f),
            ColumnValue::Boolean(b) => serializer.serialize_bool(*b),
            ColumnValue::Uuid(u) => serializer.serialize_str(&u.to_string()),
            ColumnValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
            }
            ColumnValue::Array(items) => items.serialize(serializer),
            ColumnValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        ColumnValue::Int(value.into())
    }
}

impl From<u64> for ColumnValue {
    fn from(value: u64) -> Self {
        ColumnValue::UInt(value)
    }
}

impl From<u32> for ColumnValue {
    fn from(value: u32) -> Self {
        ColumnValue::UInt(value.into())
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Double(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Boolean(value)
    }
}

impl From<Uuid> for ColumnValue {
    fn from(value: Uuid) -> Self {
        ColumnValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        ColumnValue::Timestamp(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ColumnValue::Null, Into::into)
    }
}

impl<T: Into<ColumnValue>> From<Vec<T>> for ColumnValue {
    fn from(values: Vec<T>) -> Self {
        ColumnValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Convert a JSON value to a column value
impl From<serde_json::Value> for ColumnValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ColumnValue::Null,
            serde_json::Value::Bool(b) => ColumnValue::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    ColumnValue::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    ColumnValue::Int(i)
                } else {
                    n.as_f64().map_or(ColumnValue::Null, ColumnValue::Double)
                }
            }
            serde_json::Value::String(s) => ColumnValue::Text(s),
            serde_json::Value::Array(items) => {
                ColumnValue::Array(items.into_iter().map(ColumnValue::from).collect())
            }
            // Objects have no positional column form; bind them as JSON text.
            serde_json::Value::Object(map) => {
                ColumnValue::Text(serde_json::Value::Object(map).to_string())
            }
        }
    }
}
