//! Configuration management for the tdtool bridge

pub mod tellstick_conf;

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs, time::Duration};

/// Default location of the telldus-core configuration file
pub const DEFAULT_TELLSTICK_CONF: &str = "/etc/tellstick.conf";

/// Default model assumed for statically configured sensors
pub const DEFAULT_SENSOR_MODEL: &str = "temperaturehumidity";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Platform identification
    #[serde(default)]
    pub platform: PlatformConfig,

    /// tdtool invocation settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Static sensor definitions; when non-empty, live sensor discovery is skipped
    #[serde(default)]
    pub sensors: Vec<StaticSensor>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform identification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Name reported to the host
    pub name: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "Telldus-TD-Tool".to_string(),
        }
    }
}

/// tdtool invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program name or path of the tdtool binary
    pub program: String,

    /// Path of the telldus-core device configuration
    pub conf_path: PathBuf,

    /// Upper bound on a single tdtool invocation; unbounded when unset
    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,

    /// How long one listing may be shared between callers; disabled when unset
    #[serde(default, with = "humantime_serde")]
    pub snapshot_ttl: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "tdtool".to_string(),
            conf_path: PathBuf::from(DEFAULT_TELLSTICK_CONF),
            command_timeout: None,
            snapshot_ttl: None,
        }
    }
}

/// Statically configured sensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticSensor {
    /// Sensor id as reported by tdtool
    pub id: i64,

    /// Display name, defaults to "Sensor <id>"
    #[serde(default)]
    pub name: Option<String>,

    /// Model string, defaults to "temperaturehumidity"
    #[serde(default)]
    pub model: Option<String>,
}

impl StaticSensor {
    /// Display name with the default applied
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Sensor {}", self.id))
    }

    /// Model with the default applied
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_SENSOR_MODEL)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,

    /// Optional log file (rotated daily)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            BridgeError::config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise defaults, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(program) = env::var("TDTOOL_BRIDGE_PROGRAM") {
            self.tool.program = program;
        }

        if let Ok(conf_path) = env::var("TDTOOL_BRIDGE_CONF_PATH") {
            self.tool.conf_path = PathBuf::from(conf_path);
        }

        if let Ok(timeout) = env::var("TDTOOL_BRIDGE_COMMAND_TIMEOUT") {
            self.tool.command_timeout = Some(Duration::from_secs(timeout.parse().map_err(
                |e| BridgeError::config(format!("Invalid TDTOOL_BRIDGE_COMMAND_TIMEOUT: {}", e)),
            )?));
        }

        if let Ok(ttl) = env::var("TDTOOL_BRIDGE_SNAPSHOT_TTL") {
            self.tool.snapshot_ttl = Some(Duration::from_secs(ttl.parse().map_err(|e| {
                BridgeError::config(format!("Invalid TDTOOL_BRIDGE_SNAPSHOT_TTL: {}", e))
            })?));
        }

        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tool.program.trim().is_empty() {
            return Err(BridgeError::config("tool.program cannot be empty"));
        }

        if self.tool.command_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BridgeError::config(
                "tool.command_timeout must be greater than zero",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.id) {
                return Err(BridgeError::config(format!(
                    "Sensor {} is configured more than once",
                    sensor.id
                )));
            }
        }

        Ok(())
    }

    /// Write an example configuration file
    pub fn save_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = BridgeConfig {
            sensors: vec![StaticSensor {
                id: 135,
                name: Some("Outdoor".to_string()),
                model: Some(DEFAULT_SENSOR_MODEL.to_string()),
            }],
            ..Default::default()
        };

        let content = toml::to_string_pretty(&example)
            .map_err(|e| BridgeError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}
