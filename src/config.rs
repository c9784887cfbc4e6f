//! Client configuration.
//!
//! Values are layered: serde defaults, then an optional TOML file, then
//! `BLACKSMITH__*` environment variables, then CLI flags applied by `main`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryStrategy;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "blacksmith.toml";

/// Errors that can occur when loading client configuration.
#[derive(Debug, Error)]
pub enum ClientConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration sources could not be merged or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ConfigError),

    /// The configuration file path is invalid.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// A value parsed but is unusable.
    #[error("invalid configuration value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Timing of the title typewriter and the stage cards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Delay between characters of the title typewriter
    pub title_char_delay_ms: u64,
    /// Delay between two reveal steps of a stage card
    pub reveal_tick_ms: u64,
    /// Characters revealed per step
    pub reveal_chars_per_tick: usize,
    /// How long a fully revealed card is held before collapsing
    pub hold_ms: u64,
    /// Duration of the collapse transition
    pub collapse_ms: u64,
    /// Characters kept in the collapsed one-line preview
    pub preview_chars: usize,
    /// Redraw rate of the terminal UI
    pub frame_rate: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            title_char_delay_ms: 150,
            reveal_tick_ms: 30,
            reveal_chars_per_tick: 2,
            hold_ms: 1000,
            collapse_ms: 500,
            preview_chars: 100,
            frame_rate: 30,
        }
    }
}

impl AnimationConfig {
    pub fn title_char_delay(&self) -> Duration {
        Duration::from_millis(self.title_char_delay_ms)
    }

    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn collapse(&self) -> Duration {
        Duration::from_millis(self.collapse_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    /// Estimated time for a card to reveal, hold and collapse `text`.
    ///
    /// Used as the wait before the first poll. It is an approximation of the
    /// card's real timeline, computed from the character count.
    pub fn reveal_estimate(&self, text: &str) -> Duration {
        let chars = text.chars().count() as f64;
        let per_tick = self.reveal_chars_per_tick.max(1) as f64;
        let reveal_ms = chars / per_tick * self.reveal_tick_ms as f64;
        Duration::from_millis(reveal_ms as u64 + self.hold_ms + self.collapse_ms)
    }
}

/// Backoff settings for failed polls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub jitter_percent: u8,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter_percent: 10,
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry strategy.
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_attempts,
            self.jitter_percent,
        )
    }
}

/// Cadence and limits of the stage poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay before each stage request
    pub poll_delay_ms: u64,
    /// Pause after a card finishes before polling again
    pub resume_delay_ms: u64,
    /// Gap between hiding a card and showing it again with new content
    pub reshow_delay_ms: u64,
    /// Delay before the input box hides after a submit
    pub input_hide_delay_ms: u64,
    /// Stage requests allowed per session (0 = unlimited)
    pub max_polls: u32,
    /// Finish the session once the deploying card has animated
    pub stop_after_deploying: bool,
    /// Backoff applied to retryable failures
    pub retry: RetryConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 5000,
            resume_delay_ms: 500,
            reshow_delay_ms: 500,
            input_hide_delay_ms: 200,
            max_polls: 240,
            stop_after_deploying: true,
            retry: RetryConfig::default(),
        }
    }
}

impl PollingConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    pub fn reshow_delay(&self) -> Duration {
        Duration::from_millis(self.reshow_delay_ms)
    }

    pub fn input_hide_delay(&self) -> Duration {
        Duration::from_millis(self.input_hide_delay_ms)
    }
}

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the model-building backend
    pub base_url: String,
    /// Timeout for a single HTTP request
    pub request_timeout_secs: u64,
    pub animation: AnimationConfig,
    pub polling: PollingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            animation: AnimationConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an explicit file, `blacksmith.toml` if present,
    /// and `BLACKSMITH__` environment overrides.
    ///
    /// # Environment Variable Overrides
    ///
    /// Nested keys use a double underscore, e.g.
    /// `BLACKSMITH__POLLING__POLL_DELAY_MS=2000`.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file does not exist, a source cannot be
    /// parsed, or a value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientConfigError> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                let path_str = path
                    .to_str()
                    .ok_or_else(|| ClientConfigError::InvalidPath(format!("{:?}", path)))?;
                if !path.exists() {
                    return Err(ClientConfigError::FileNotFound(path_str.to_string()));
                }
                builder = builder.add_source(File::with_name(path_str));
            }
            None => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix("BLACKSMITH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let client_config: ClientConfig = config.try_deserialize()?;
        client_config.validate()?;
        Ok(client_config)
    }

    /// Override the base URL (from `--base-url`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values that would stall or break the client.
    pub fn validate(&self) -> Result<(), ClientConfigError> {
        if self.animation.reveal_tick_ms == 0 {
            return Err(ClientConfigError::InvalidValue {
                key: "animation.reveal_tick_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.animation.reveal_chars_per_tick == 0 {
            return Err(ClientConfigError::InvalidValue {
                key: "animation.reveal_chars_per_tick",
                reason: "must be greater than zero".to_string(),
            });
        }
        let is_http = reqwest::Url::parse(&self.base_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_http {
            return Err(ClientConfigError::InvalidValue {
                key: "base_url",
                reason: format!("`{}` is not an http(s) URL", self.base_url),
            });
        }
        Ok(())
    }
}
