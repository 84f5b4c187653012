//! Editor core configuration
//!
//! All sections carry serde defaults so partial JSON documents load.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Indentation used inside rendered blocks
pub const DEFAULT_INDENT: &str = "    ";

/// Snapshots kept by the history stack
pub const DEFAULT_MAX_SNAPSHOTS: usize = 100;

/// zstd level for history snapshots
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Largest compressed snapshot the history stack accepts, in bytes
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 64 * 1024 * 1024;

/// Late refactorings one transaction may drain before it is aborted
pub const DEFAULT_MAX_LATE_REFACTORINGS: usize = 10_000;

/// Code generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub indent: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT.to_string(),
        }
    }
}

/// History snapshot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max_snapshots: usize,
    pub compression_level: i32,
    pub max_snapshot_bytes: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub render: RenderSettings,
    pub history: HistorySettings,
    pub max_late_refactorings: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            history: HistorySettings::default(),
            max_late_refactorings: DEFAULT_MAX_LATE_REFACTORINGS,
        }
    }
}

impl EditorConfig {
    /// Parse a (possibly partial) JSON configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = EditorConfig::from_json(r#"{ "render": { "indent": "\t" } }"#).unwrap();
        assert_eq!(config.render.indent, "\t");
        assert_eq!(config.history.max_snapshots, DEFAULT_MAX_SNAPSHOTS);
        assert_eq!(config.max_late_refactorings, DEFAULT_MAX_LATE_REFACTORINGS);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = EditorConfig::default();
        config.history.compression_level = 9;
        let back = EditorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(EditorConfig::from_json("{ not json").is_err());
    }
}
