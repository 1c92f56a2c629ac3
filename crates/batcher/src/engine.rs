// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator_service::{AggregatorService, EngineState};
use crate::config::BatcherConfig;
use crate::errors::{ConfigError, SubmitError};
use crate::intake::BatcherHandle;
use crate::sink::{HttpSink, Sink};

/// A running batch-aggregation engine.
///
/// Owns the aggregation task. Producers get cheap [`BatcherHandle`]s from [`Batcher::handle`];
/// whoever owns the `Batcher` decides when it stops.
pub struct Batcher<U> {
    handle: BatcherHandle<U>,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl<U> Batcher<U>
where
    U: Serialize + Send + 'static,
{
    /// Validates `config` and spawns the aggregation loop on the current tokio runtime.
    pub fn start(config: BatcherConfig, sink: Arc<dyn Sink>) -> Result<Self, ConfigError> {
        config.validate()?;

        let cancel_token = CancellationToken::new();
        let (service, handle) = AggregatorService::new(&config, sink, cancel_token.clone());

        info!(
            "Starting batcher with batch size: {}, interval: {:?}, queue capacity: {}, retry: {:?}",
            config.max_batch_size,
            config.flush_interval,
            config.queue_capacity(),
            config.retry_strategy,
        );
        let task = tokio::spawn(service.run());

        Ok(Batcher {
            handle,
            cancel_token,
            task,
        })
    }

    /// Starts an engine delivering to `config.sink_endpoint` over HTTP.
    pub fn start_http(config: BatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sink = HttpSink::from_config(&config)?;
        debug!("Batches will be posted to {}", sink.endpoint());
        Self::start(config, Arc::new(sink))
    }

    #[must_use]
    pub fn handle(&self) -> BatcherHandle<U> {
        self.handle.clone()
    }

    pub fn submit(&self, unit: U) -> Result<(), SubmitError<U>> {
        self.handle.submit(unit)
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    /// Requests shutdown and waits until the final drain flush has completed.
    ///
    /// Bounded by the retry policy of the batches still pending; there is no extra timeout.
    pub async fn stop(self) {
        info!("Batch processor stopping");
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            error!("Aggregator task failed: {e}");
        }
        info!("Batch processor stopped");
    }
}
