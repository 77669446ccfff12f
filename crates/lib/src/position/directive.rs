//! Decoding of user-supplied position values.
//!
//! Hosts receive positions from forms, JSON bodies and query strings, so a
//! position may arrive as an integer, a numeric string, a bare word, a
//! `{"before": ..}` / `{"after": ..}` object, or any of those JSON-encoded
//! inside a string. Everything is decoded once, here, into a
//! [`PositionDirective`]; the resolver never sees raw input.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use super::errors::PositionError;
use crate::value::{Key, Value};

/// Where a row should be placed within its scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PositionDirective {
    /// No explicit position: the end of the scope.
    #[default]
    Unset,
    /// An absolute position, clamped into the scope's range.
    Absolute(i64),
    First,
    Last,
    /// Immediately before the referenced row; `None` means the end.
    Before(Option<Key>),
    /// Immediately after the referenced row; `None` means the start.
    After(Option<Key>),
}

impl PositionDirective {
    pub fn before(key: impl Into<Key>) -> Self {
        PositionDirective::Before(Some(key.into()))
    }

    pub fn after(key: impl Into<Key>) -> Self {
        PositionDirective::After(Some(key.into()))
    }

    /// Decode a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, PositionError> {
        match json {
            serde_json::Value::Null => Ok(PositionDirective::Unset),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(PositionDirective::Absolute)
                .ok_or_else(|| PositionError::invalid(n)),
            serde_json::Value::String(s) => s.parse(),
            serde_json::Value::Object(map) => {
                let mut entries = map.iter();
                let (Some((relation, reference)), None) = (entries.next(), entries.next()) else {
                    return Err(PositionError::invalid(json));
                };
                let reference = reference_key(reference).ok_or_else(|| PositionError::invalid(json))?;
                match relation.trim_start_matches(':') {
                    "before" => Ok(PositionDirective::Before(reference)),
                    "after" => Ok(PositionDirective::After(reference)),
                    _ => Err(PositionError::invalid(json)),
                }
            }
            serde_json::Value::Bool(_) | serde_json::Value::Array(_) => {
                Err(PositionError::invalid(json))
            }
        }
    }
}

impl FromStr for PositionDirective {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.trim_start_matches(':') {
            "" => return Ok(PositionDirective::Unset),
            "first" => return Ok(PositionDirective::First),
            "last" => return Ok(PositionDirective::Last),
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(PositionDirective::Absolute(n));
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            // Each decode strips one layer of quoting, so this terminates.
            Ok(json) => PositionDirective::from_json(&json),
            Err(_) => Err(PositionError::invalid(trimmed)),
        }
    }
}

impl TryFrom<serde_json::Value> for PositionDirective {
    type Error = PositionError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        PositionDirective::from_json(&json)
    }
}

impl From<i64> for PositionDirective {
    fn from(position: i64) -> Self {
        PositionDirective::Absolute(position)
    }
}

impl<'de> Deserialize<'de> for PositionDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        PositionDirective::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// Decode the value of a `before`/`after` entry.
///
/// `Ok(None)` for null or blank, a one-column key for scalars, a composite
/// key for arrays of scalars.
fn reference_key(json: &serde_json::Value) -> Option<Option<Key>> {
    match json {
        serde_json::Value::Null => Some(None),
        serde_json::Value::String(s) if s.trim().is_empty() => Some(None),
        serde_json::Value::Array(items) => {
            let values = items.iter().map(reference_value).collect::<Option<Vec<_>>>()?;
            Some(Some(Key::new(values)))
        }
        scalar => reference_value(scalar).map(|v| Some(Key::from(v))),
    }
}

/// Numeric strings are read as integers so that ids taken from URLs or form
/// fields match integer primary keys.
fn reference_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::String(s) => Some(
            s.trim()
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(s.clone())),
        ),
        other => Value::from_json(other).filter(|v| !v.is_null()),
    }
}
