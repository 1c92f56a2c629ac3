// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory sink for engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use batcher::{BatcherConfig, RetryStrategy, ShippingError, Sink};
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Records every attempt and every successfully delivered batch.
///
/// Statuses are taken from `script` in order; once it runs out every attempt succeeds.
/// With a gate, each attempt waits for a permit before answering.
pub struct ChannelSink {
    attempts: AtomicUsize,
    script: Mutex<VecDeque<StatusCode>>,
    gate: Option<Arc<Semaphore>>,
    attempt_tx: mpsc::UnboundedSender<Vec<u64>>,
    delivered_tx: mpsc::UnboundedSender<Vec<u64>>,
}

pub struct SinkEvents {
    pub attempts: mpsc::UnboundedReceiver<Vec<u64>>,
    pub delivered: mpsc::UnboundedReceiver<Vec<u64>>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, SinkEvents) {
        Self::build(Vec::new(), None)
    }

    pub fn scripted(script: Vec<StatusCode>) -> (Arc<Self>, SinkEvents) {
        Self::build(script, None)
    }

    pub fn gated(gate: Arc<Semaphore>) -> (Arc<Self>, SinkEvents) {
        Self::build(Vec::new(), Some(gate))
    }

    fn build(script: Vec<StatusCode>, gate: Option<Arc<Semaphore>>) -> (Arc<Self>, SinkEvents) {
        let (attempt_tx, attempts) = mpsc::unbounded_channel();
        let (delivered_tx, delivered) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink {
            attempts: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            gate,
            attempt_tx,
            delivered_tx,
        });
        (
            sink,
            SinkEvents {
                attempts,
                delivered,
            },
        )
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(&self, body: Vec<u8>) -> Result<StatusCode, ShippingError> {
        let batch: Vec<u64> = serde_json::from_slice(&body).expect("body is not a JSON array");
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let _ = self.attempt_tx.send(batch.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let status = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StatusCode::OK);
        if status.is_success() {
            let _ = self.delivered_tx.send(batch);
        }
        Ok(status)
    }
}

pub fn config(max_batch_size: usize) -> BatcherConfig {
    BatcherConfig {
        retry_strategy: RetryStrategy::Immediate(3),
        ..BatcherConfig::new(
            NonZeroUsize::new(max_batch_size).expect("batch size must be non-zero"),
            FLUSH_INTERVAL,
            "http://127.0.0.1:1/unused",
        )
    }
}

/// Waits for the next delivered batch, failing the test if none arrives within `within`.
pub async fn next_batch(events: &mut SinkEvents, within: Duration) -> Vec<u64> {
    tokio::time::timeout(within, events.delivered.recv())
        .await
        .expect("timed out waiting for a batch")
        .expect("sink dropped")
}
