//! Shared types used across modules
//!
//! Events flowing into the container, predictions flowing out of it, and the
//! opaque learned-state snapshot that crosses the persistence boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DecodeError;

/// A primitive attribute value attached to an interaction event.
///
/// Attributes carry metadata only (durations, counts, flags), never raw
/// user content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// One observed behavior.
///
/// Immutable once built: the container only ever reads events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Open vocabulary kind, e.g. `"click"` or `"app_launch"`
    pub kind: String,
    /// Metadata attributes, kept in key order
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Unix epoch milliseconds
    pub occurred_at_millis: i64,
    /// The user this event belongs to
    pub subject_id: String,
}

impl InteractionEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
            occurred_at_millis: chrono::Utc::now().timestamp_millis(),
            subject_id: subject_id.into(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, occurred_at_millis: i64) -> Self {
        self.occurred_at_millis = occurred_at_millis;
        self
    }
}

/// A suggestion produced by the learning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub content: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
}

impl Prediction {
    pub fn new(content: impl Into<String>, confidence: f32, category: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            category: category.into(),
            metadata: None,
            alternatives: None,
        }
    }
}

/// Opaque serialized model snapshot.
///
/// The payload layout belongs to whichever engine produced it; the schema
/// version travels next to the payload so incompatible snapshots can be
/// rejected before any payload decoding starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedState {
    pub payload: Vec<u8>,
    pub schema_version: i32,
}

impl LearnedState {
    pub fn new(payload: Vec<u8>, schema_version: i32) -> Self {
        Self { payload, schema_version }
    }

    /// Frame as `[schema_version: i32 BE][payload]` for export to a file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.extend_from_slice(&self.schema_version.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse the framing written by [`LearnedState::to_bytes`].
    ///
    /// Only the version prefix is checked here; the payload stays opaque.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Truncated {
                field: "schema_version",
                needed: 4,
                available: bytes.len(),
            });
        }
        let (version, payload) = bytes.split_at(4);
        let schema_version = i32::from_be_bytes([version[0], version[1], version[2], version[3]]);
        Ok(Self {
            payload: payload.to_vec(),
            schema_version,
        })
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
