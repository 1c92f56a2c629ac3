// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use batcher::{BatcherConfig, RetryStrategy};
use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::ReceiverError;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_BATCH_INTERVAL_SECS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
/// Largest `/log` body accepted
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 1024 * 1024;

const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JSON" => Ok(LogFormat::Json),
            "TEXT" => Ok(LogFormat::Text),
            other => Err(ReceiverError::InvalidConfig(format!(
                "Invalid log format '{other}'. Must be one of: JSON, TEXT"
            ))),
        }
    }
}

/// Configuration for the receiver process, read once at startup
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Units per batch that trigger an immediate flush
    pub batch_size: usize,
    /// Longest a non-empty batch waits before it is flushed
    pub batch_interval: Duration,
    /// Where batches are POSTed. Required.
    pub post_endpoint: Option<String>,
    /// Delivery attempts per batch
    pub retry_attempts: u32,
    /// Pause between delivery attempts
    pub retry_delay: Duration,
    /// Intake queue capacity, twice the batch size when unset
    pub queue_capacity: Option<usize>,
    /// Port the receiver listens on
    pub port: u16,
    /// Log level (debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// HTTPS proxy URL for the sink
    pub https_proxy: Option<String>,
    pub max_content_length: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: Duration::from_secs(DEFAULT_BATCH_INTERVAL_SECS),
            post_endpoint: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            queue_capacity: None,
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
            https_proxy: None,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

/// Reads `name` as a `T`. Unset means `default`; so does a value that does not parse.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring unparseable value '{val}' for {name}, using the default");
            default
        }),
        Err(_) => default,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

impl ReceiverConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ReceiverError> {
        let defaults = Self::default();

        let queue_capacity = env::var("QUEUE_CAPACITY")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok());
        // Unknown logging settings are not fatal, the service logs INFO as JSON instead
        let log_format = match non_empty_env("LOG_FORMAT").map(|val| val.parse::<LogFormat>()) {
            Some(Ok(format)) => format,
            Some(Err(e)) => {
                warn!("{e}, using JSON");
                defaults.log_format
            }
            None => defaults.log_format,
        };
        let log_level = match non_empty_env("LOG_LEVEL").map(|val| val.to_lowercase()) {
            Some(level) if VALID_LOG_LEVELS.contains(&level.as_str()) => level,
            Some(level) => {
                warn!("Unknown log level '{level}', using {DEFAULT_LOG_LEVEL}");
                defaults.log_level
            }
            None => defaults.log_level,
        };

        let config = Self {
            batch_size: env_or("BATCH_SIZE", defaults.batch_size),
            batch_interval: Duration::from_secs(env_or(
                "BATCH_INTERVAL",
                DEFAULT_BATCH_INTERVAL_SECS,
            )),
            post_endpoint: non_empty_env("POST_ENDPOINT"),
            retry_attempts: env_or("RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay: Duration::from_secs(env_or("RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS)),
            queue_capacity,
            port: env_or("PORT", defaults.port),
            log_level,
            log_format,
            https_proxy: non_empty_env("HTTPS_PROXY"),
            max_content_length: defaults.max_content_length,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if self.port == 0 {
            return Err(ReceiverError::InvalidConfig(
                "PORT must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ReceiverError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: DEBUG, INFO, WARN, ERROR",
                self.log_level
            )));
        }

        // Batch size, interval, endpoint, attempts and capacity are checked by the engine
        self.batcher_config()?.validate()?;
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn batcher_config(&self) -> Result<BatcherConfig, ReceiverError> {
        let max_batch_size = NonZeroUsize::new(self.batch_size).ok_or_else(|| {
            ReceiverError::InvalidConfig("BATCH_SIZE must be greater than 0".to_string())
        })?;
        if self.batch_interval.is_zero() {
            return Err(ReceiverError::InvalidConfig(
                "BATCH_INTERVAL must be greater than 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ReceiverError::InvalidConfig(
                "RETRY_ATTEMPTS must be greater than 0".to_string(),
            ));
        }
        let queue_capacity = match self.queue_capacity {
            Some(capacity) => Some(NonZeroUsize::new(capacity).ok_or_else(|| {
                ReceiverError::InvalidConfig("QUEUE_CAPACITY must be greater than 0".to_string())
            })?),
            None => None,
        };
        let post_endpoint = self
            .post_endpoint
            .clone()
            .ok_or_else(|| ReceiverError::InvalidConfig("POST_ENDPOINT is required".to_string()))?;

        Ok(BatcherConfig {
            retry_strategy: RetryStrategy::FixedDelay(self.retry_attempts, self.retry_delay),
            queue_capacity,
            https_proxy: self.https_proxy.clone(),
            ..BatcherConfig::new(max_batch_size, self.batch_interval, post_endpoint)
        })
    }
}
