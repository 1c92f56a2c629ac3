// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for serialized batches.

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::error::Error;
use std::time::Duration;
use tracing::debug;

use crate::config::BatcherConfig;
use crate::constants::CONTENT_TYPE_JSON;
use crate::errors::{ConfigError, ShippingError};

/// Receives one serialized batch per call.
///
/// A returned status is interpreted by the flusher: anything below 300 ends the retry loop.
/// An `Err` is a transport-level failure and counts as a failed attempt.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, body: Vec<u8>) -> Result<StatusCode, ShippingError>;
}

/// POSTs batches as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        proxy_url: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let client =
            build_client(proxy_url, timeout).map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(HttpSink {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &BatcherConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.sink_endpoint.trim(),
            config.request_timeout,
            config.https_proxy.as_deref(),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn send(&self, body: Vec<u8>) -> Result<StatusCode, ShippingError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| ShippingError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() >= 300 {
            // Only read the body when it is going to be logged
            debug!(
                "{}: sink rejected batch: {:?}",
                status,
                resp.text().await.unwrap_or_default()
            );
        }
        Ok(status)
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        // Redirects are reported to the flusher as failed attempts instead of being followed
        .redirect(reqwest::redirect::Policy::none());
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}
