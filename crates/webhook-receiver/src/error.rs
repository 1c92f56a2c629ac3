// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that stop the receiver from starting or keep it from serving
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Batcher(#[from] batcher::ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install logger: {0}")]
    Logging(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}
