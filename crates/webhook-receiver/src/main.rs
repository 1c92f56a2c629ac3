// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::{anyhow, Context};
use batcher::Batcher;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use webhook_receiver::{logger, receiver, Payload, Receiver, ReceiverConfig};

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let config = ReceiverConfig::from_env().context("failed to load configuration")?;

    logger::init(&config.log_level, config.log_format)?;
    debug!("Logging subsystem enabled");

    let batcher = Batcher::<Payload>::start_http(config.batcher_config()?)
        .context("failed to start batcher")?;

    let listener = match receiver::bind(config.port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{e}. Shutting down");
            batcher.stop().await;
            return Err(e.into());
        }
    };

    let cancel_token = CancellationToken::new();
    let receiver = Receiver::new(batcher.handle(), config.max_content_length);
    let mut server = tokio::spawn(receiver.serve(listener, cancel_token.clone()));

    let outcome = tokio::select! {
        () = shutdown_signal() => Ok(()),
        result = &mut server => {
            let e = match result {
                Ok(Ok(())) => anyhow!("receiver stopped unexpectedly"),
                Ok(Err(e)) => e.into(),
                Err(e) => anyhow!("receiver task failed: {e}"),
            };
            error!("{e}");
            Err(e)
        }
    };

    // Stop taking requests before draining so nothing is admitted after the final flush
    cancel_token.cancel();
    if outcome.is_ok() {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Receiver failed during shutdown: {e}"),
            Err(e) => error!("Receiver task failed: {e}"),
        }
    }

    batcher.stop().await;
    info!("Shutdown complete");
    outcome
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
