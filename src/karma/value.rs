use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::StoreError;

/// A single cell in a member's sparse scoring mapping.
///
/// Mixed types are allowed in one mapping: numeric columns usually hold
/// `Number`, text columns `Text`, and `Null` survives round trips from
/// callers that post explicit nulls. Arrays and objects are rejected at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Number(i64),
    Text(String),
    Null,
}

pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    /// The totals rule: a value contributes to a total iff it coerces to an
    /// integer. Numbers always do; text does when it trims to a signed
    /// decimal integer; null and other text never do.
    pub fn coerce_int(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<i64>().ok(),
            FieldValue::Null => None,
        }
    }

    /// Sanitized copy: coercible values become `Number(max(0, n))` —
    /// negative scores clamp to zero — everything else passes through
    /// untouched.
    pub fn sanitized(&self) -> FieldValue {
        match self.coerce_int() {
            Some(n) => FieldValue::Number(n.max(0)),
            None => self.clone(),
        }
    }

    /// Convert an IPC parameter into a cell value. Floats truncate toward
    /// zero, booleans become 0/1, compound values are rejected.
    pub fn from_json(v: &serde_json::Value) -> Result<FieldValue, StoreError> {
        match v {
            serde_json::Value::Null => Ok(FieldValue::Null),
            serde_json::Value::Bool(b) => Ok(FieldValue::Number(*b as i64)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Number(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(FieldValue::Number(f.trunc() as i64))
                } else {
                    Ok(FieldValue::Number(i64::MAX))
                }
            }
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            _ => Err(StoreError::validation(
                "score values must be numbers, strings, booleans or null",
            )),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Number(n) => serializer.serialize_i64(*n),
            FieldValue::Text(t) => serializer.serialize_str(t),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldValueVisitor;

        impl<'de> Visitor<'de> for FieldValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number, string, boolean or null")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
                Ok(FieldValue::Number(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
                Ok(FieldValue::Number(i64::try_from(v).unwrap_or(i64::MAX)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
                Ok(FieldValue::Number(v.trunc() as i64))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
                Ok(FieldValue::Number(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }
        }

        deserializer.deserialize_any(FieldValueVisitor)
    }
}

/// Sanitize every cell of a mapping (see `FieldValue::sanitized`).
pub fn sanitize_map(map: FieldMap) -> FieldMap {
    map.into_iter().map(|(k, v)| (k, v.sanitized())).collect()
}

/// Unweighted sum of the coercible cells, saturating on overflow.
pub fn map_total(map: &FieldMap) -> i64 {
    map.values()
        .filter_map(FieldValue::coerce_int)
        .fold(0i64, |acc, n| acc.saturating_add(n))
}

/// Decode a stored mapping column. Empty text counts as an empty mapping so
/// freshly inserted rows need no special casing.
pub fn decode_map(raw: &str) -> Result<FieldMap, StoreError> {
    if raw.trim().is_empty() {
        return Ok(FieldMap::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("member data is not valid JSON: {e}")))
}

pub fn encode_map(map: &FieldMap) -> Result<String, StoreError> {
    serde_json::to_string(map).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub fn map_json(map: &FieldMap) -> serde_json::Value {
    serde_json::to_value(map).unwrap_or(serde_json::Value::Null)
}
