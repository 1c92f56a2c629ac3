// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::aggregator_service::EngineState;
use crate::errors::SubmitError;

/// Producer side of the intake queue.
///
/// Cheap to clone and safe to use from any number of tasks. `submit` never waits: a full
/// queue rejects the unit immediately and hands it back.
pub struct BatcherHandle<U> {
    tx: mpsc::Sender<U>,
    state_rx: watch::Receiver<EngineState>,
}

// Manual impl so that cloning the handle does not require `U: Clone`
impl<U> Clone for BatcherHandle<U> {
    fn clone(&self) -> Self {
        BatcherHandle {
            tx: self.tx.clone(),
            state_rx: self.state_rx.clone(),
        }
    }
}

impl<U> std::fmt::Debug for BatcherHandle<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatcherHandle")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

impl<U> BatcherHandle<U> {
    pub(crate) fn new(tx: mpsc::Sender<U>, state_rx: watch::Receiver<EngineState>) -> Self {
        BatcherHandle { tx, state_rx }
    }

    /// Admits `unit` into the intake queue.
    ///
    /// # Errors
    ///
    /// - `SubmitError::QueueFull` if the queue is at capacity
    /// - `SubmitError::Stopped` once the engine is draining or stopped
    pub fn submit(&self, unit: U) -> Result<(), SubmitError<U>> {
        self.tx.try_send(unit).map_err(|e| match e {
            TrySendError::Full(unit) => SubmitError::QueueFull(unit),
            TrySendError::Closed(unit) => SubmitError::Stopped(unit),
        })
    }

    /// Last state published by the aggregation loop.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Units admitted but not yet picked up by the aggregation loop.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
