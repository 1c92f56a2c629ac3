// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::constants;
use crate::errors::ConfigError;

/// How many times a batch is offered to the sink, and how long to wait between offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry right away, up to the given number of attempts.
    Immediate(u32),
    /// Wait a fixed delay between attempts, up to the given number of attempts.
    FixedDelay(u32, Duration),
}

impl RetryStrategy {
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryStrategy::Immediate(attempts) | RetryStrategy::FixedDelay(attempts, _) => {
                *attempts
            }
        }
    }

    /// Delay to apply after a failed attempt, before the next one.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryStrategy::Immediate(_) => None,
            RetryStrategy::FixedDelay(_, delay) if delay.is_zero() => None,
            RetryStrategy::FixedDelay(_, delay) => Some(*delay),
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::FixedDelay(
            constants::DEFAULT_RETRY_ATTEMPTS,
            constants::DEFAULT_RETRY_DELAY,
        )
    }
}

/// Configuration for one batcher instance. Fixed for the lifetime of the engine.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Number of units that triggers an immediate flush
    pub max_batch_size: NonZeroUsize,
    /// Maximum time a non-empty batch waits after the previous flush
    pub flush_interval: Duration,
    /// Where batches are POSTed
    pub sink_endpoint: String,
    pub retry_strategy: RetryStrategy,
    /// Intake queue capacity. `None` sizes it at twice the batch size.
    pub queue_capacity: Option<NonZeroUsize>,
    /// Timeout of a single delivery attempt
    pub request_timeout: Duration,
    pub https_proxy: Option<String>,
}

impl BatcherConfig {
    #[must_use]
    pub fn new(
        max_batch_size: NonZeroUsize,
        flush_interval: Duration,
        sink_endpoint: impl Into<String>,
    ) -> Self {
        BatcherConfig {
            max_batch_size,
            flush_interval,
            sink_endpoint: sink_endpoint.into(),
            retry_strategy: RetryStrategy::default(),
            queue_capacity: None,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
        }
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.map_or_else(
            || {
                self.max_batch_size
                    .get()
                    .saturating_mul(constants::QUEUE_CAPACITY_FACTOR)
            },
            NonZeroUsize::get,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        if self.retry_strategy.max_attempts() == 0 {
            return Err(ConfigError::Invalid(
                "retry attempts must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity() > constants::MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue capacity {} exceeds the maximum of {}",
                self.queue_capacity(),
                constants::MAX_QUEUE_CAPACITY
            )));
        }

        let endpoint = self.sink_endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid(
                "sink endpoint cannot be empty".to_string(),
            ));
        }
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| ConfigError::Invalid(format!("sink endpoint '{endpoint}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "sink endpoint '{endpoint}' must use http or https"
            )));
        }

        Ok(())
    }
}
