//! Captured values.
//!
//! Everything the host framework hands over (props, state, ref values, event
//! payloads) is converted into a [`CapturedValue`] at capture time. The set of
//! shapes is closed, so sanitization and export walk a known type instead of
//! inspecting arbitrary runtime values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Keyed values in deterministic order.
pub type ValueMap = BTreeMap<String, CapturedValue>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapturedValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<CapturedValue>),
    Record(Record),
    Map(ValueMap),
}

/// A nested named structure (a struct value captured from the host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    #[serde(rename = "$record")]
    pub type_name: String,
    pub fields: ValueMap,
}

impl CapturedValue {
    pub fn record(type_name: impl Into<String>, fields: ValueMap) -> Self {
        CapturedValue::Record(Record {
            type_name: type_name.into(),
            fields,
        })
    }

    /// Short runtime-type tag used in ref snapshots.
    pub fn type_tag(&self) -> &str {
        match self {
            CapturedValue::Null => "null",
            CapturedValue::Bool(_) => "bool",
            CapturedValue::Int(_) => "int",
            CapturedValue::Float(_) => "float",
            CapturedValue::String(_) => "string",
            CapturedValue::Seq(_) => "seq",
            CapturedValue::Record(r) => &r.type_name,
            CapturedValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CapturedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CapturedValue::Null)
    }
}

impl From<&str> for CapturedValue {
    fn from(value: &str) -> Self {
        CapturedValue::String(value.to_string())
    }
}

impl From<String> for CapturedValue {
    fn from(value: String) -> Self {
        CapturedValue::String(value)
    }
}

impl From<bool> for CapturedValue {
    fn from(value: bool) -> Self {
        CapturedValue::Bool(value)
    }
}

impl From<i64> for CapturedValue {
    fn from(value: i64) -> Self {
        CapturedValue::Int(value)
    }
}

impl From<i32> for CapturedValue {
    fn from(value: i32) -> Self {
        CapturedValue::Int(i64::from(value))
    }
}

impl From<u32> for CapturedValue {
    fn from(value: u32) -> Self {
        CapturedValue::Int(i64::from(value))
    }
}

impl From<f64> for CapturedValue {
    fn from(value: f64) -> Self {
        CapturedValue::Float(value)
    }
}

impl<T: Into<CapturedValue>> From<Vec<T>> for CapturedValue {
    fn from(values: Vec<T>) -> Self {
        CapturedValue::Seq(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<CapturedValue>> From<Option<T>> for CapturedValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CapturedValue::Null)
    }
}

impl From<ValueMap> for CapturedValue {
    fn from(map: ValueMap) -> Self {
        CapturedValue::Map(map)
    }
}

impl From<serde_json::Value> for CapturedValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CapturedValue::Null,
            Value::Bool(b) => CapturedValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CapturedValue::Int(i),
                None => CapturedValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => CapturedValue::String(s),
            Value::Array(items) => {
                CapturedValue::Seq(items.into_iter().map(CapturedValue::from).collect())
            }
            Value::Object(map) => CapturedValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, CapturedValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Build a [`ValueMap`] from `key => value` pairs.
#[macro_export]
macro_rules! value_map {
    () => { $crate::value::ValueMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::ValueMap::new();
        $(map.insert(($key).to_string(), $crate::value::CapturedValue::from($value));)+
        map
    }};
}
