// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory sinks standing in for the downstream endpoint

#![allow(dead_code)]

use batcher::{ShippingError, Sink};
use hyper::StatusCode;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use webhook_receiver::Payload;

/// Accepts every batch and forwards it to the test.
///
/// With a gate, each attempt is reported as soon as it starts and then waits for a permit.
pub struct MockSink {
    started_tx: mpsc::UnboundedSender<Vec<Payload>>,
    delivered_tx: mpsc::UnboundedSender<Vec<Payload>>,
    gate: Option<Arc<Semaphore>>,
}

pub struct MockSinkEvents {
    pub started: mpsc::UnboundedReceiver<Vec<Payload>>,
    pub delivered: mpsc::UnboundedReceiver<Vec<Payload>>,
}

impl MockSink {
    pub fn new(gate: Option<Arc<Semaphore>>) -> (Arc<Self>, MockSinkEvents) {
        let (started_tx, started) = mpsc::unbounded_channel();
        let (delivered_tx, delivered) = mpsc::unbounded_channel();
        (
            Arc::new(MockSink {
                started_tx,
                delivered_tx,
                gate,
            }),
            MockSinkEvents { started, delivered },
        )
    }
}

#[async_trait::async_trait]
impl Sink for MockSink {
    async fn send(&self, body: Vec<u8>) -> Result<StatusCode, ShippingError> {
        let batch: Vec<Payload> = serde_json::from_slice(&body).expect("batch is not valid JSON");
        let _ = self.started_tx.send(batch.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let _ = self.delivered_tx.send(batch);
        Ok(StatusCode::OK)
    }
}
