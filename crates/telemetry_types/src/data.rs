//! The stream value tree held by the dashboard.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The scalar carried by a stream. Modules publish either numbers or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl ScalarValue {
    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            ScalarValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Number(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_string())
    }
}

/// Inclusive value range advertised by a module for one of its streams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Optional presentation hints attached to a stream value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// The latest known datum of a single stream.
///
/// The store overwrites this wholesale on every update; no history is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamValue {
    pub value: ScalarValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StreamMetadata>,
}

impl StreamValue {
    /// A bare value with no unit or metadata.
    pub fn new(value: impl Into<ScalarValue>) -> Self {
        Self {
            value: value.into(),
            unit: None,
            metadata: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_metadata(mut self, metadata: StreamMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// All streams published by one module, keyed by stream name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleStreams {
    #[serde(default)]
    pub streams: HashMap<String, StreamValue>,
}

/// Mapping of module identifier to that module's streams.
pub type ModuleMap = HashMap<String, ModuleStreams>;

/// The root of the shared value tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalDataTree {
    #[serde(default)]
    pub data: ModuleMap,
}

impl GlobalDataTree {
    pub fn new(data: ModuleMap) -> Self {
        Self { data }
    }

    /// Looks up a single stream value by exact module and stream name.
    pub fn get(&self, module_id: &str, stream_name: &str) -> Option<&StreamValue> {
        self.data
            .get(module_id)
            .and_then(|module| module.streams.get(stream_name))
    }
}
