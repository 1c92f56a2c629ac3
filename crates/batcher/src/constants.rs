// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Default intake capacity, as a multiple of the batch size
pub const QUEUE_CAPACITY_FACTOR: usize = 2;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Largest accepted intake capacity
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
