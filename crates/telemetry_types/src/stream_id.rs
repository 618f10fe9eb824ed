//! Composite `module.stream` identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between the module id and the stream name.
pub const STREAM_ID_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamIdError {
    #[error("stream id '{0}' has no '.' separator")]
    MissingSeparator(String),
    #[error("stream id '{0}' has an empty module or stream name")]
    EmptyPart(String),
    #[error("stream id '{0}' is ambiguous: stream names must not contain '.'")]
    Ambiguous(String),
}

/// Identifies one stream as `moduleId.streamName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    module_id: String,
    stream_name: String,
}

impl StreamId {
    pub fn new(module_id: impl Into<String>, stream_name: impl Into<String>) -> Result<Self, StreamIdError> {
        let module_id = module_id.into();
        let stream_name = stream_name.into();
        let raw = format!("{}{}{}", module_id, STREAM_ID_SEPARATOR, stream_name);
        if module_id.is_empty() || stream_name.is_empty() {
            return Err(StreamIdError::EmptyPart(raw));
        }
        if module_id.contains(STREAM_ID_SEPARATOR) || stream_name.contains(STREAM_ID_SEPARATOR) {
            return Err(StreamIdError::Ambiguous(raw));
        }
        Ok(Self {
            module_id,
            stream_name,
        })
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

impl FromStr for StreamId {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module_id, stream_name) = s
            .split_once(STREAM_ID_SEPARATOR)
            .ok_or_else(|| StreamIdError::MissingSeparator(s.to_string()))?;
        StreamId::new(module_id, stream_name)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.module_id, STREAM_ID_SEPARATOR, self.stream_name)
    }
}

impl Serialize for StreamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_separator() {
        let id: StreamId = "hw_module_1.temperature".parse().unwrap();
        assert_eq!(id.module_id(), "hw_module_1");
        assert_eq!(id.stream_name(), "temperature");
        assert_eq!(id.to_string(), "hw_module_1.temperature");
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert_eq!(
            "temperature".parse::<StreamId>(),
            Err(StreamIdError::MissingSeparator("temperature".to_string()))
        );
        assert!(matches!(".temp".parse::<StreamId>(), Err(StreamIdError::EmptyPart(_))));
        assert!(matches!("mod.".parse::<StreamId>(), Err(StreamIdError::EmptyPart(_))));
        assert!(matches!("mod.a.b".parse::<StreamId>(), Err(StreamIdError::Ambiguous(_))));
    }

    #[test]
    fn test_serde_uses_dotted_form() {
        let id = StreamId::new("imu", "pitch").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"imu.pitch\"");
        let back: StreamId = serde_json::from_str("\"imu.pitch\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<StreamId>("\"imu\"").is_err());
    }
}
