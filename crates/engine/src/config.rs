use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Timing and shuffling knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period before a staged answer is written.
    pub debounce_ms: u64,
    /// How long `saved`/`error` stays up before the status returns to idle.
    pub status_display_ms: u64,
    /// Upper bound on any single API call.
    pub request_timeout_ms: u64,
    /// Countdown cadence.
    pub tick_ms: u64,
    /// Delay before fullscreen is requested again after the learner leaves it.
    pub fullscreen_retry_ms: u64,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            status_display_ms: 1_500,
            request_timeout_ms: 10_000,
            tick_ms: 1_000,
            fullscreen_retry_ms: 1_000,
            shuffle_questions: true,
            shuffle_options: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::InvalidValue` for zero durations.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise the
    /// errors of [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `EXAM_*` environment overrides on top of this config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable does not parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value: raw })
        }

        if let Some(raw) = lookup("EXAM_DEBOUNCE_MS") {
            self.debounce_ms = parse("EXAM_DEBOUNCE_MS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_STATUS_DISPLAY_MS") {
            self.status_display_ms = parse("EXAM_STATUS_DISPLAY_MS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse("EXAM_REQUEST_TIMEOUT_MS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_FULLSCREEN_RETRY_MS") {
            self.fullscreen_retry_ms = parse("EXAM_FULLSCREEN_RETRY_MS", raw)?;
        }
        if let Some(raw) = lookup("EXAM_SHUFFLE") {
            let shuffle: bool = parse("EXAM_SHUFFLE", raw)?;
            self.shuffle_questions = shuffle;
            self.shuffle_options = shuffle;
        }
        if let Some(raw) = lookup("EXAM_SEED") {
            self.seed = Some(parse("EXAM_SEED", raw)?);
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        let checks = [
            ("debounce_ms", self.debounce_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("tick_ms", self.tick_ms),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                });
            }
        }
        Ok(self)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn status_display(&self) -> Duration {
        Duration::from_millis(self.status_display_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn fullscreen_retry(&self) -> Duration {
        Duration::from_millis(self.fullscreen_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_use_two_second_debounce() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce(), Duration::from_secs(2));
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert!(config.shuffle_questions);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("debounce_ms = 500\nseed = 42\n").unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let err = EngineConfig::from_toml_str("debounce_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "debounce_ms",
                ..
            }
        ));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [("EXAM_SHUFFLE", "false"), ("EXAM_SEED", "7")]
            .into_iter()
            .collect();
        let config = EngineConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| (*v).to_owned()))
            .unwrap();
        assert!(!config.shuffle_questions);
        assert!(!config.shuffle_options);
        assert_eq!(config.seed, Some(7));

        let err = EngineConfig::default()
            .with_overrides(|key| (key == "EXAM_DEBOUNCE_MS").then(|| "soon".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
