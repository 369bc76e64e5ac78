//! Configuration for the bot task pipeline.
//!
//! Provides per-stage polling and concurrency settings plus the pipeline-wide
//! publication deferral and generation timeout, configurable via the builder
//! pattern or environment variables.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Polling and throttling settings for one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    /// How often the stage's poller runs.
    pub poll_interval: Duration,
    /// Maximum number of rows this stage may hold claimed at once.
    pub max_concurrent: usize,
}

impl StageConfig {
    /// Creates a new stage configuration.
    pub fn new(poll_interval: Duration, max_concurrent: usize) -> Self {
        Self {
            poll_interval,
            max_concurrent,
        }
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Stage settings
    /// Bot-task stage: claims pending bot tasks and composes prompts.
    pub bot_stage: StageConfig,
    /// Generation stage: calls the text-generation backend.
    pub generation_stage: StageConfig,
    /// Publish stage: persists due posts.
    pub publish_stage: StageConfig,

    // Pipeline-wide settings
    /// Fixed deferral between generation and publication, to avoid bursty
    /// posting.
    pub publish_delay: Duration,
    /// Upper bound on one generation backend call; expiry is a terminal
    /// generation failure.
    pub generation_timeout: Duration,
    /// Fixed batch cap for one generation poll, independent of slot
    /// accounting.
    pub generation_batch_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bot_stage: StageConfig::new(Duration::from_secs(10), 5),
            generation_stage: StageConfig::new(Duration::from_secs(5), 3),
            publish_stage: StageConfig::new(Duration::from_secs(15), 5),
            publish_delay: Duration::from_secs(300), // 5 minutes
            generation_timeout: Duration::from_secs(60),
            generation_batch_cap: 10,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bot-task stage settings.
    pub fn with_bot_stage(mut self, stage: StageConfig) -> Self {
        self.bot_stage = stage;
        self
    }

    /// Sets the generation stage settings.
    pub fn with_generation_stage(mut self, stage: StageConfig) -> Self {
        self.generation_stage = stage;
        self
    }

    /// Sets the publish stage settings.
    pub fn with_publish_stage(mut self, stage: StageConfig) -> Self {
        self.publish_stage = stage;
        self
    }

    /// Sets the publication deferral.
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    /// Sets the generation call timeout.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Sets the generation poll batch cap.
    pub fn with_generation_batch_cap(mut self, cap: usize) -> Self {
        self.generation_batch_cap = cap;
        self
    }

    /// Creates a configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables (seconds unless noted):
    /// - `BOT_POLL_INTERVAL_SECS`, `BOT_MAX_CONCURRENT`
    /// - `GENERATION_POLL_INTERVAL_SECS`, `GENERATION_MAX_CONCURRENT`
    /// - `PUBLISH_POLL_INTERVAL_SECS`, `PUBLISH_MAX_CONCURRENT`
    /// - `PUBLISH_DELAY_SECS`, `GENERATION_TIMEOUT_SECS`,
    ///   `GENERATION_BATCH_CAP` (count)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            bot_stage: StageConfig::new(
                env_duration_secs("BOT_POLL_INTERVAL_SECS", defaults.bot_stage.poll_interval)?,
                env_usize("BOT_MAX_CONCURRENT", defaults.bot_stage.max_concurrent)?,
            ),
            generation_stage: StageConfig::new(
                env_duration_secs(
                    "GENERATION_POLL_INTERVAL_SECS",
                    defaults.generation_stage.poll_interval,
                )?,
                env_usize(
                    "GENERATION_MAX_CONCURRENT",
                    defaults.generation_stage.max_concurrent,
                )?,
            ),
            publish_stage: StageConfig::new(
                env_duration_secs(
                    "PUBLISH_POLL_INTERVAL_SECS",
                    defaults.publish_stage.poll_interval,
                )?,
                env_usize("PUBLISH_MAX_CONCURRENT", defaults.publish_stage.max_concurrent)?,
            ),
            publish_delay: env_duration_secs("PUBLISH_DELAY_SECS", defaults.publish_delay)?,
            generation_timeout: env_duration_secs(
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout,
            )?,
            generation_batch_cap: env_usize(
                "GENERATION_BATCH_CAP",
                defaults.generation_batch_cap,
            )?,
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any interval, cap, or
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, stage) in [
            ("bot", &self.bot_stage),
            ("generation", &self.generation_stage),
            ("publish", &self.publish_stage),
        ] {
            if stage.poll_interval.is_zero() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{name} stage poll_interval must be greater than zero"
                )));
            }
            if stage.max_concurrent == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{name} stage max_concurrent must be greater than zero"
                )));
            }
        }
        if self.generation_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "generation_timeout must be greater than zero".to_string(),
            ));
        }
        if self.generation_batch_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "generation_batch_cap must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert_eq!(config.bot_stage.max_concurrent, 5);
        assert_eq!(config.generation_stage.max_concurrent, 3);
        assert_eq!(config.publish_delay, Duration::from_secs(300));
        assert_eq!(config.generation_batch_cap, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .with_bot_stage(StageConfig::new(Duration::from_millis(50), 8))
            .with_publish_delay(Duration::ZERO)
            .with_generation_timeout(Duration::from_secs(5))
            .with_generation_batch_cap(2);

        assert_eq!(config.bot_stage.max_concurrent, 8);
        assert_eq!(config.bot_stage.poll_interval, Duration::from_millis(50));
        assert_eq!(config.publish_delay, Duration::ZERO);
        assert_eq!(config.generation_batch_cap, 2);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config =
            PipelineConfig::new().with_bot_stage(StageConfig::new(Duration::ZERO, 5));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let config = PipelineConfig::new()
            .with_generation_stage(StageConfig::new(Duration::from_secs(5), 0));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    // publish_delay of zero is valid: it means publish immediately.
    #[test]
    fn test_validate_allows_zero_publish_delay() {
        let config = PipelineConfig::new().with_publish_delay(Duration::ZERO);
        assert!(config.validate().is_ok());
    }
}
