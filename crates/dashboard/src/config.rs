use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

/// Where the telemetry server lives
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Streaming socket address
    pub ws_url: String,
    /// HTTP presence endpoint, probed when the socket is down
    pub http_url: String,
    /// Timeout for a single presence probe in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:3000".to_string(),
            http_url: "http://localhost:3000".to_string(),
            probe_timeout_ms: 2000,
        }
    }
}

/// Reconnection policy. The delay is constant, not exponential.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub auto_reconnect: bool,
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            delay_ms: 5000,
        }
    }
}

/// Timing of widget resolution and value polling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Registry re-check interval while a widget type is not yet registered
    pub resolve_poll_ms: u64,
    /// How long to wait for a widget type before showing "not found"
    pub resolve_timeout_ms: u64,
    /// Per-widget store polling interval
    pub value_poll_ms: u64,
    /// Widget type used when an attach request names none
    pub default_widget: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            resolve_poll_ms: 100,
            resolve_timeout_ms: 5000,
            value_poll_ms: 100,
            default_widget: "GraphDisplay".to_string(),
        }
    }
}

impl BindingConfig {
    pub fn resolve_poll(&self) -> Duration {
        Duration::from_millis(self.resolve_poll_ms.max(1))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn value_poll(&self) -> Duration {
        Duration::from_millis(self.value_poll_ms.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Number of points a graph widget keeps on screen
    pub graph_history: usize,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self { graph_history: 50 }
    }
}

/// Configuration for the dashboard
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub binding: BindingConfig,
    pub widgets: WidgetConfig,
    /// Directory scanned for widget plugins
    pub mods_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            reconnect: ReconnectConfig::default(),
            binding: BindingConfig::default(),
            widgets: WidgetConfig::default(),
            mods_dir: PathBuf::from("mods"),
        }
    }
}

impl DashboardConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.server.probe_timeout_ms)
    }
}

/// Loads the dashboard configuration from a JSON file.
///
/// A missing file is not an error: defaults are used. A file that exists but
/// cannot be parsed is reported.
pub fn load_config(path: &Path) -> Result<DashboardConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(DashboardConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config: DashboardConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_dashboard_config_default() {
        let config = DashboardConfig::default();
        assert_eq!(config.server.ws_url, "ws://localhost:3000");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert!(config.reconnect.auto_reconnect);
        assert_eq!(config.binding.resolve_poll(), Duration::from_millis(100));
        assert_eq!(config.binding.resolve_timeout(), Duration::from_secs(5));
        assert_eq!(config.binding.default_widget, "GraphDisplay");
        assert_eq!(config.widgets.graph_history, 50);
    }

    #[test]
    fn test_zero_poll_intervals_are_floored() {
        let config: DashboardConfig =
            serde_json::from_str(r#"{ "binding": { "resolve_poll_ms": 0, "value_poll_ms": 0 } }"#).unwrap();
        assert_eq!(config.binding.resolve_poll(), Duration::from_millis(1));
        assert_eq!(config.binding.value_poll(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = load_config(&temp_dir.path().join("dashboard.json")).unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_load_config_partial_file_keeps_other_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("dashboard.json");
        fs::write(
            &path,
            r#"{ "server": { "ws_url": "ws://10.0.0.2:3000" }, "reconnect": { "auto_reconnect": false } }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.ws_url, "ws://10.0.0.2:3000");
        assert_eq!(config.server.http_url, "http://localhost:3000");
        assert!(!config.reconnect.auto_reconnect);
        assert_eq!(config.reconnect.delay_ms, 5000);
    }

    #[test]
    fn test_load_config_rejects_malformed_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("dashboard.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
