//! Attribute values and plan-time resolution
//!
//! Business attributes of a resource are one of a small closed set of kinds.
//! Plan logic matches on them exhaustively.

use crate::error::ValueError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tether_config::ProviderSettings;

/// Business attributes of a resource, by name
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// Not known until apply (computed by the server)
    Unknown,
    Null,
    String(String),
    Bool(bool),
    Integer(i64),
    List(Vec<AttrValue>),
    Object(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Unknown => "unknown",
            AttrValue::Null => "null",
            AttrValue::String(_) => "string",
            AttrValue::Bool(_) => "bool",
            AttrValue::Integer(_) => "integer",
            AttrValue::List(_) => "list",
            AttrValue::Object(_) => "object",
        }
    }

    /// Whether the value, or anything nested in it, is unknown
    pub fn is_unknown(&self) -> bool {
        match self {
            AttrValue::Unknown => true,
            AttrValue::Null | AttrValue::String(_) | AttrValue::Bool(_) | AttrValue::Integer(_) => {
                false
            }
            AttrValue::List(items) => items.iter().any(AttrValue::is_unknown),
            AttrValue::Object(fields) => fields.values().any(AttrValue::is_unknown),
        }
    }

    /// Null, or an empty list or object
    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Null => true,
            AttrValue::List(items) => items.is_empty(),
            AttrValue::Object(fields) => fields.is_empty(),
            AttrValue::Unknown
            | AttrValue::String(_)
            | AttrValue::Bool(_)
            | AttrValue::Integer(_) => {
                false
            }
        }
    }

    /// Compare two values the way a plan diff should.
    ///
    /// Null, `[]` and `{}` are interchangeable. Unknown equals nothing.
    pub fn semantically_equal(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Unknown, _) | (_, AttrValue::Unknown) => false,
            (AttrValue::String(a), AttrValue::String(b)) => a == b,
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Integer(a), AttrValue::Integer(b)) => a == b,
            (AttrValue::List(a), AttrValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantically_equal(y))
            }
            (AttrValue::Object(a), AttrValue::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, x)| {
                        b.get(key).is_some_and(|y| x.semantically_equal(y))
                    })
            }
            (a, b) => a.is_empty() && b.is_empty(),
        }
    }

    /// Convert from JSON. Non-integral numbers are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValueError> {
        Ok(match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::String(s) => AttrValue::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Integer(i),
                None => match n.as_f64() {
                    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        AttrValue::Integer(f as i64)
                    }
                    _ => return Err(ValueError::UnsupportedNumber(n.to_string())),
                },
            },
            serde_json::Value::Array(items) => AttrValue::List(
                items
                    .into_iter()
                    .map(AttrValue::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(fields) => AttrValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| AttrValue::from_json(v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Convert to JSON; fails if any part is unknown
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        Ok(match self {
            AttrValue::Unknown => return Err(ValueError::Unknown),
            AttrValue::Null => serde_json::Value::Null,
            AttrValue::String(s) => serde_json::Value::String(s.clone()),
            AttrValue::Bool(b) => serde_json::Value::Bool(*b),
            AttrValue::Integer(i) => serde_json::Value::from(*i),
            AttrValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(AttrValue::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            AttrValue::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Integer(value)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Unknown => write!(f, "(known after apply)"),
            AttrValue::Null => write!(f, "null"),
            AttrValue::String(s) => write!(f, "{:?}", s),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Integer(i) => write!(f, "{}", i),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttrValue::Object(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Planned value of one attribute.
///
/// With `suppress_computed_plan` on, an unknown planned value falls back to
/// the prior known value so computed attributes do not show as changing on
/// every plan.
pub fn plan_value(
    prior: Option<&AttrValue>,
    planned: &AttrValue,
    settings: &ProviderSettings,
) -> AttrValue {
    match (planned, prior) {
        (AttrValue::Unknown, Some(prior))
            if settings.suppress_computed_plan && !prior.is_unknown() =>
        {
            prior.clone()
        }
        _ => planned.clone(),
    }
}
