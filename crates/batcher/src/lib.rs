// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch aggregation and delivery.
//!
//! Units submitted through a [`BatcherHandle`] are accumulated by a single aggregation task
//! and POSTed to a sink as a JSON array whenever the batch reaches its size limit or the
//! flush interval elapses, whichever comes first. Delivery is retried a bounded number of
//! times; a batch that still fails is dropped and logged. [`Batcher::stop`] drains whatever
//! is pending before returning.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator_service;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod flusher;
pub mod intake;
pub mod sink;

pub use aggregator_service::EngineState;
pub use config::{BatcherConfig, RetryStrategy};
pub use engine::Batcher;
pub use errors::{ConfigError, FlushError, ShippingError, SubmitError};
pub use intake::BatcherHandle;
pub use sink::{HttpSink, Sink};
