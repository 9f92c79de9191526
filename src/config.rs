//! Server task configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.server-task.toml`)
//! 2. Environment variables (with `SERVER_TASK_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [server_task]
//! heartbeat_interval_ms = 300
//! max_body_bytes = 1048576
//! input_param = "input"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".server-task.toml";

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(300);

/// Settings shared by every task built with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTaskConfig {
    /// Interval between `wait` frames while an action is pending.
    pub heartbeat_interval_ms: u64,

    /// Largest request body accepted for POST invocations.
    pub max_body_bytes: usize,

    /// Query parameter carrying the serialized input of GET invocations.
    pub input_param: String,
}

impl Default for ServerTaskConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            max_body_bytes: 1024 * 1024,
            input_param: "input".to_string(),
        }
    }
}

impl ServerTaskConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML configuration file
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|source| Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            server_task: ServerTaskConfig,
        }

        let full: FullConfig = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("TOML parse error: {}", e)))?;

        Ok(full.server_task)
    }

    /// The heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SERVER_TASK_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.heartbeat_interval_ms = ms;
            }
        }

        if let Some(v) = lookup("SERVER_TASK_MAX_BODY_BYTES") {
            if let Ok(bytes) = v.parse() {
                self.max_body_bytes = bytes;
            }
        }

        if let Some(v) = lookup("SERVER_TASK_INPUT_PARAM") {
            if !v.is_empty() {
                self.input_param = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ServerTaskConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(300));
        assert_eq!(config.input_param, "input");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServerTaskConfig::from_toml(
            r#"
            [server_task]
            heartbeat_interval_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.heartbeat_interval_ms, 50);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn missing_table_is_default() {
        let config = ServerTaskConfig::from_toml("").unwrap();
        assert_eq!(config, ServerTaskConfig::default());
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let err = ServerTaskConfig::from_toml("[server_task\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn overrides_win_and_bad_values_are_skipped() {
        let env: HashMap<&str, &str> = [
            ("SERVER_TASK_HEARTBEAT_INTERVAL_MS", "1000"),
            ("SERVER_TASK_MAX_BODY_BYTES", "lots"),
            ("SERVER_TASK_INPUT_PARAM", "payload"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerTaskConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.heartbeat_interval_ms, 1000);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.input_param, "payload");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ServerTaskConfig::from_file("/nonexistent/.server-task.toml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
