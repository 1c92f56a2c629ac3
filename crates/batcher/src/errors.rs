// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use thiserror::Error;

/// Why a unit was not admitted. The unit is handed back to the caller.
#[derive(Debug, Error)]
pub enum SubmitError<U> {
    #[error("intake queue is full")]
    QueueFull(U),
    #[error("batcher is stopped")]
    Stopped(U),
}

impl<U> SubmitError<U> {
    pub fn into_inner(self) -> U {
        match self {
            SubmitError::QueueFull(unit) | SubmitError::Stopped(unit) => unit,
        }
    }
}

/// A single failed delivery attempt.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("sink responded with {0}")]
    Status(StatusCode),
}

/// Terminal outcome of a batch that could not be delivered. The batch is dropped.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("failed to serialize batch of {units} units: {source}")]
    Serialization {
        units: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deliver batch after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: ShippingError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid batcher configuration: {0}")]
    Invalid(String),
    #[error("failed to build http client: {0}")]
    Client(String),
}
