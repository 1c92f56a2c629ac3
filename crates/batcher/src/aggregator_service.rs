// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregation loop that owns the in-progress batch.
//!
//! Producers only ever touch the intake queue through a [`BatcherHandle`]; the service task
//! is the single consumer and the only writer of the current batch and the engine state:
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (many producers, try_send)
//!    └──────┬───────┘
//!           │ bounded mpsc
//!           v
//!    ┌──────────────┐    size >= max / interval elapsed / shutdown
//!    │   Service    │ ─────────────────────────────────────────────> Flusher -> Sink
//!    │ (one task)   │
//!    └──────────────┘
//! ```
//!
//! Flushes are strictly sequential: the loop awaits each delivery before looking at the
//! queue again, while producers keep filling the queue in the meantime.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::BatcherConfig;
use crate::errors::FlushError;
use crate::flusher::Flusher;
use crate::intake::BatcherHandle;
use crate::sink::Sink;

/// Lifecycle of one engine. Only the aggregation loop changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Running => write!(f, "running"),
            EngineState::Draining => write!(f, "draining"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

pub struct AggregatorService<U> {
    max_batch_size: NonZeroUsize,
    flush_interval: Duration,
    batch: Vec<U>,
    rx: mpsc::Receiver<U>,
    flusher: Flusher,
    state_tx: watch::Sender<EngineState>,
    cancel_token: CancellationToken,
}

impl<U> AggregatorService<U>
where
    U: Serialize + Send + 'static,
{
    /// Creates the service and the handle producers submit through.
    ///
    /// The service does nothing until [`AggregatorService::run`] is spawned. Cancelling
    /// `cancel_token` makes it drain and return.
    pub fn new(
        config: &BatcherConfig,
        sink: Arc<dyn Sink>,
        cancel_token: CancellationToken,
    ) -> (Self, BatcherHandle<U>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity());
        let (state_tx, state_rx) = watch::channel(EngineState::Running);

        let service = AggregatorService {
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval,
            batch: Vec::with_capacity(config.max_batch_size.get()),
            rx,
            flusher: Flusher::new(sink, config.retry_strategy.clone()),
            state_tx,
            cancel_token,
        };
        let handle = BatcherHandle::new(tx, state_rx);

        (service, handle)
    }

    /// Runs until shutdown is requested or every handle is dropped, then drains.
    pub async fn run(mut self) {
        debug!("Aggregator service started");

        // The first deadline is one interval after start, not immediate
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("Shutdown requested");
                    break;
                }
                unit = self.rx.recv() => match unit {
                    Some(unit) => {
                        self.batch.push(unit);
                        trace!("Unit added. Current batch size: {}", self.batch.len());
                        if self.batch.len() >= self.max_batch_size.get() {
                            debug!("Batch size limit ({}) reached. Flushing", self.max_batch_size);
                            self.flush(&mut ticker).await;
                        }
                    }
                    None => {
                        debug!("All batcher handles dropped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.batch.is_empty() {
                        trace!("Flush interval elapsed but no units to send");
                    } else {
                        debug!("Flush interval elapsed. Flushing {} units", self.batch.len());
                        self.flush(&mut ticker).await;
                    }
                }
            }
        }

        self.drain().await;
        debug!("Aggregator service stopped");
    }

    async fn flush(&mut self, ticker: &mut Interval) {
        let batch = std::mem::replace(
            &mut self.batch,
            Vec::with_capacity(self.max_batch_size.get()),
        );
        // The next time trigger is measured from this flush
        ticker.reset();
        Self::deliver(self.flusher.clone(), batch).await;
    }

    /// Stops admission, moves everything already admitted into the batch and flushes it.
    async fn drain(&mut self) {
        self.state_tx.send_replace(EngineState::Draining);

        self.rx.close();
        while let Ok(unit) = self.rx.try_recv() {
            self.batch.push(unit);
        }

        if self.batch.is_empty() {
            debug!("Nothing to drain");
        }
        while !self.batch.is_empty() {
            let rest = if self.batch.len() > self.max_batch_size.get() {
                self.batch.split_off(self.max_batch_size.get())
            } else {
                Vec::new()
            };
            let batch = std::mem::replace(&mut self.batch, rest);
            info!("Draining batch of {} units", batch.len());
            Self::deliver(self.flusher.clone(), batch).await;
        }

        self.state_tx.send_replace(EngineState::Stopped);
    }

    /// Hands `batch` to the flusher and waits for the outcome. Never fails the loop.
    ///
    /// Takes the flusher by value so the loop's future only needs `U: Send`.
    async fn deliver(flusher: Flusher, batch: Vec<U>) {
        let units = batch.len();

        // A panicking sink must not take the loop down with it
        let result = tokio::spawn(async move { flusher.deliver(batch).await }).await;

        match result {
            Ok(Ok(delivery)) => info!(
                "Successfully sent batch of {units} units in {:?} after {} attempt(s)",
                delivery.elapsed, delivery.attempts
            ),
            Ok(Err(e @ FlushError::Serialization { .. })) => {
                error!("{e}. Batch dropped");
            }
            Ok(Err(e @ FlushError::Exhausted { .. })) => {
                error!("Batch sending failed: {e}. {units} units dropped");
            }
            Err(e) => error!("Delivery task failed: {e}. {units} units dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryStrategy;
    use crate::errors::ShippingError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<u32>>>,
        fail: bool,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn send(&self, body: Vec<u8>) -> Result<StatusCode, ShippingError> {
            let batch: Vec<u32> = serde_json::from_slice(&body).expect("invalid body");
            self.batches.lock().unwrap().push(batch);
            if self.fail {
                Ok(StatusCode::INTERNAL_SERVER_ERROR)
            } else {
                Ok(StatusCode::OK)
            }
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl Sink for PanickingSink {
        async fn send(&self, _body: Vec<u8>) -> Result<StatusCode, ShippingError> {
            panic!("sink blew up");
        }
    }

    fn config(max_batch_size: usize) -> BatcherConfig {
        BatcherConfig {
            retry_strategy: RetryStrategy::Immediate(2),
            ..BatcherConfig::new(
                NonZeroUsize::new(max_batch_size).expect("non-zero"),
                Duration::from_secs(10),
                "http://localhost",
            )
        }
    }

    #[tokio::test]
    async fn test_state_transitions_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let (service, handle) = AggregatorService::<u32>::new(&config(5), sink, token.clone());
        assert_eq!(handle.state(), EngineState::Running);

        let task = tokio::spawn(service.run());
        token.cancel();
        task.await.expect("service task failed");

        assert_eq!(handle.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_drops_all_handles_drains() {
        let sink = Arc::new(RecordingSink::default());
        let (service, handle) =
            AggregatorService::<u32>::new(&config(5), sink.clone(), CancellationToken::new());

        handle.submit(1).expect("submit failed");
        handle.submit(2).expect("submit failed");
        drop(handle);

        service.run().await;

        assert_eq!(*sink.batches.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_drain_splits_oversized_remainder() {
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let (service, handle) =
            AggregatorService::<u32>::new(&config(2), sink.clone(), token.clone());

        // Loop not running yet: everything sits in the queue
        for i in 0..4 {
            handle.submit(i).expect("submit failed");
        }
        token.cancel();
        service.run().await;

        assert_eq!(*sink.batches.lock().unwrap(), vec![vec![0, 1], vec![2, 3]]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_exhausted_delivery_is_logged_and_loop_continues() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let token = CancellationToken::new();
        let (service, handle) = AggregatorService::<u32>::new(&config(1), sink.clone(), token.clone());

        handle.submit(1).expect("submit failed");
        handle.submit(2).expect("submit failed");
        token.cancel();
        // Run in the test's span so its logs are captured
        service.run().await;

        // Two batches, two attempts each
        assert_eq!(sink.batches.lock().unwrap().len(), 4);
        assert!(logs_contain("Batch sending failed"));
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_kill_loop() {
        let token = CancellationToken::new();
        let (service, handle) =
            AggregatorService::<u32>::new(&config(1), Arc::new(PanickingSink), token.clone());
        let task = tokio::spawn(service.run());

        handle.submit(1).expect("submit failed");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), EngineState::Running);
        handle.submit(2).expect("submit failed");

        token.cancel();
        task.await.expect("service task failed");
        assert_eq!(handle.state(), EngineState::Stopped);
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Running.to_string(), "running");
        assert_eq!(EngineState::Draining.to_string(), "draining");
        assert_eq!(EngineState::Stopped.to_string(), "stopped");
    }
}
