//! Server configuration, loaded from an optional TOML file.

use crate::physics::WorldConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Per-connection limits handed to every connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub idle_timeout: Option<Duration>,
    pub outbound_queue: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind to.
    pub host: String,
    pub port: u16,
    pub field_width: f32,
    pub field_height: f32,
    pub player_width: f32,
    pub player_height: f32,
    pub acceleration: f32,
    pub friction: f32,
    /// Simulation and broadcast period in milliseconds.
    pub tick_ms: u64,
    /// Unlimited when absent.
    pub max_clients: Option<usize>,
    /// Close connections that send nothing for this long. Disabled when absent.
    pub idle_timeout_secs: Option<u64>,
    /// Snapshots buffered per connection before new ones are dropped.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let world = WorldConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: shared::DEFAULT_PORT,
            field_width: world.field_width,
            field_height: world.field_height,
            player_width: world.player_width,
            player_height: world.player_height,
            acceleration: world.acceleration,
            friction: world.friction,
            tick_ms: shared::TICK_MILLIS,
            max_clients: None,
            idle_timeout_secs: None,
            outbound_queue: 64,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dimensions = [
            ("field_width", self.field_width),
            ("field_height", self.field_height),
            ("player_width", self.player_width),
            ("player_height", self.player_height),
        ];
        for (name, value) in dimensions {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if self.player_width > self.field_width || self.player_height > self.field_height {
            return Err(ConfigError::Invalid(format!(
                "a {}x{} player does not fit in a {}x{} field",
                self.player_width, self.player_height, self.field_width, self.field_height
            )));
        }

        for (name, value) in [("acceleration", self.acceleration), ("friction", self.friction)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be at least 1".to_string()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn world_config(&self) -> WorldConfig {
        WorldConfig {
            field_width: self.field_width,
            field_height: self.field_height,
            player_width: self.player_width,
            player_height: self.player_height,
            acceleration: self.acceleration,
            friction: self.friction,
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
            outbound_queue: self.outbound_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8888");
        assert_eq!(config.tick_duration(), Duration::from_millis(100));
        assert_eq!(config.world_config(), WorldConfig::default());
        assert_eq!(config.connection_settings().idle_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9000
            tick_ms = 50
            max_clients = 8
            idle_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
        assert_eq!(config.max_clients, Some(8));
        assert_eq!(
            config.connection_settings().idle_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.field_width, 800.0);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ServerConfig::from_toml("tick_rate = 30").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            "field_width = 0.0",
            "player_height = -1.0",
            "field_width = 40.0",
            "friction = -0.5",
            "tick_ms = 0",
            "outbound_queue = 0",
            "idle_timeout_secs = 0",
        ];

        for case in cases {
            let err = ServerConfig::from_toml(case).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(_)),
                "expected {case:?} to be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
