//! Client settings, read from an optional TOML file and overridden by flags

use crate::error::ConfigError;
use serde::Deserialize;
use shared::{MAX_FRAME_INTERVAL, TRACK_FINISH, TRACK_START};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server address to connect to
    pub server: String,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Inbound messages buffered between the transport and the game
    pub inbound_capacity: usize,
    /// Seconds the race dispatcher waits for the final times; 0 waits forever
    pub finish_timeout_secs: u64,
    pub track: TrackConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackConfig {
    pub start: f64,
    pub finish: f64,
    pub max_frame_interval: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8080".to_string(),
            tick_rate: 60,
            inbound_capacity: 32,
            finish_timeout_secs: 120,
            track: TrackConfig::default(),
        }
    }
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            start: TRACK_START,
            finish: TRACK_FINISH,
            max_frame_interval: MAX_FRAME_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::parse(&contents, &display)
    }

    pub fn parse(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be positive".to_string()));
        }
        if self.inbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "inbound_capacity must be positive".to_string(),
            ));
        }
        if self.track.finish <= self.track.start {
            return Err(ConfigError::Invalid(format!(
                "track finish {} must lie after start {}",
                self.track.finish, self.track.start
            )));
        }
        if self.track.max_frame_interval == 0 {
            return Err(ConfigError::Invalid(
                "max_frame_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }

    pub fn finish_timeout(&self) -> Option<Duration> {
        (self.finish_timeout_secs > 0).then(|| Duration::from_secs(self.finish_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.finish_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.track.finish, TRACK_FINISH);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ClientConfig::parse(
            r#"
            server = "10.0.0.5:9000"
            finish_timeout_secs = 0

            [track]
            finish = 500.0
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.server, "10.0.0.5:9000");
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.finish_timeout(), None);
        assert_eq!(config.track.start, TRACK_START);
        assert_eq!(config.track.finish, 500.0);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = ClientConfig::parse("speed_hack = true", "inline");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_inverted_track_is_rejected() {
        let result = ClientConfig::parse("[track]\nstart = 800.0\nfinish = 100.0", "inline");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_tick_interval() {
        let config = ClientConfig {
            tick_rate: 50,
            ..ClientConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
    }
}
