// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch to the sink with a bounded retry policy.
//!
//! A batch is serialized once into a JSON array and the same body is offered to the sink
//! on every attempt. The attempt sequence for a batch is:
//!
//! ```text
//!   Pending -> Attempting(1) -> Success
//!                  |
//!                  v (transport error or status >= 300)
//!              Attempting(2) -> ... -> Attempting(N) -> Exhausted
//! ```
//!
//! Exhaustion is terminal: the batch is dropped and only reported for logging.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RetryStrategy;
use crate::errors::{FlushError, ShippingError};
use crate::sink::Sink;

/// Successful delivery of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Number of attempts made, including the successful one
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct Flusher {
    sink: Arc<dyn Sink>,
    retry_strategy: RetryStrategy,
}

impl Flusher {
    pub fn new(sink: Arc<dyn Sink>, retry_strategy: RetryStrategy) -> Self {
        Flusher {
            sink,
            retry_strategy,
        }
    }

    /// Serializes `batch` and sends it whole, retrying per the configured strategy.
    pub async fn deliver<U: Serialize>(&self, batch: Vec<U>) -> Result<Delivery, FlushError> {
        let units = batch.len();
        let body = serde_json::to_vec(&batch)
            .map_err(|source| FlushError::Serialization { units, source })?;
        drop(batch);

        debug!("Delivering batch of {units} units ({} bytes)", body.len());
        self.send_with_retry(body).await
    }

    async fn send_with_retry(&self, body: Vec<u8>) -> Result<Delivery, FlushError> {
        let max_attempts = self.retry_strategy.max_attempts().max(1);
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match self.sink.send(body.clone()).await {
                Ok(status) if status.as_u16() < 300 => {
                    return Ok(Delivery {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(status) => ShippingError::Status(status),
                Err(e) => e,
            };

            if attempts >= max_attempts {
                return Err(FlushError::Exhausted {
                    attempts,
                    last_error: error,
                });
            }

            match self.retry_strategy.delay() {
                Some(delay) => {
                    warn!(
                        "Batch send attempt {attempts}/{max_attempts} failed: {error}. Retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!("Batch send attempt {attempts}/{max_attempts} failed: {error}. Retrying");
                }
            }
        }
    }
}
