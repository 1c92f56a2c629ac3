// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::error::ReceiverError;

/// Builds the filter for `level`, with the HTTP stack's own logs turned off.
pub fn env_filter(level: &str) -> Result<EnvFilter, ReceiverError> {
    let directives = format!("h2=off,hyper=off,hyper_util=off,reqwest=off,rustls=off,{level}");
    EnvFilter::try_new(directives)
        .map_err(|e| ReceiverError::InvalidConfig(format!("could not parse log level: {e}")))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: &str, format: LogFormat) -> Result<(), ReceiverError> {
    let builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let result = match format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
        LogFormat::Text => builder.with_ansi(false).try_init(),
    };
    result.map_err(|e| ReceiverError::Logging(e.to_string()))
}
