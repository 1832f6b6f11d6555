//! Typed metadata payloads
//!
//! Payloads attached to vector points are a closed set of value shapes.
//! JSON `null` is not representable and is rejected at conversion time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to a point or a search result
pub type Payload = BTreeMap<String, PayloadValue>;

/// A single payload value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Borrow as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by range conditions
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PayloadValue::Integer(i) => Some(*i as f64),
            PayloadValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PayloadValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert back into plain JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PayloadValue::Bool(b) => serde_json::Value::Bool(*b),
            PayloadValue::Integer(i) => serde_json::Value::from(*i),
            PayloadValue::Float(f) => serde_json::Value::from(*f),
            PayloadValue::String(s) => serde_json::Value::String(s.clone()),
            PayloadValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PayloadValue::to_json).collect())
            }
            PayloadValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl TryFrom<serde_json::Value> for PayloadValue {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Err(Error::Validation("null is not a valid payload value".into())),
            Value::Bool(b) => Ok(PayloadValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(PayloadValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(PayloadValue::Float)
                    .ok_or_else(|| Error::Validation(format!("unrepresentable number {}", n))),
            },
            Value::String(s) => Ok(PayloadValue::String(s)),
            Value::Array(items) => items
                .into_iter()
                .map(PayloadValue::try_from)
                .collect::<Result<Vec<_>>>()
                .map(PayloadValue::List),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| PayloadValue::try_from(v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(PayloadValue::Map),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::String(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::String(s)
    }
}

impl From<i64> for PayloadValue {
    fn from(i: i64) -> Self {
        PayloadValue::Integer(i)
    }
}

impl From<i32> for PayloadValue {
    fn from(i: i32) -> Self {
        PayloadValue::Integer(i64::from(i))
    }
}

impl From<u32> for PayloadValue {
    fn from(i: u32) -> Self {
        PayloadValue::Integer(i64::from(i))
    }
}

impl From<f64> for PayloadValue {
    fn from(f: f64) -> Self {
        PayloadValue::Float(f)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

/// Validate a JSON object into a payload.
pub fn payload_from_json(value: serde_json::Value) -> Result<Payload> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                PayloadValue::try_from(v)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| Error::Validation(format!("payload field '{}': {}", k, e)))
            })
            .collect(),
        other => Err(Error::Validation(format!(
            "payload must be a JSON object, got {}",
            other
        ))),
    }
}

/// Render a payload as a JSON object
pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Look up a dotted field path (`metadata.collection`) inside a payload
pub fn lookup<'a>(payload: &'a Payload, path: &str) -> Option<&'a PayloadValue> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        match current {
            PayloadValue::Map(map) => current = map.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Build a payload from key/value pairs
#[macro_export]
macro_rules! payload {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = $crate::core::Payload::new();
        $(map.insert($key.to_string(), $crate::core::PayloadValue::from($value));)*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_from_json_object() {
        let payload = payload_from_json(json!({
            "surah": 2,
            "ratio": 0.5,
            "name": "البقرة",
            "tags": ["madani"],
            "meta": {"juz": 1}
        }))
        .unwrap();

        assert_eq!(payload["surah"], PayloadValue::Integer(2));
        assert_eq!(payload["ratio"], PayloadValue::Float(0.5));
        assert_eq!(payload["name"].as_str(), Some("البقرة"));
        assert_eq!(lookup(&payload, "meta.juz"), Some(&PayloadValue::Integer(1)));
    }

    #[test]
    fn test_null_is_rejected() {
        let err = payload_from_json(json!({"surah": null})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let nested = payload_from_json(json!({"meta": {"x": [1, null]}}));
        assert!(nested.is_err());
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(payload_from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_payload_macro_and_json_output() {
        let payload = crate::payload! { "source" => "hadith", "number" => 7i64 };
        assert_eq!(
            payload_to_json(&payload),
            json!({"source": "hadith", "number": 7})
        );
    }
}
