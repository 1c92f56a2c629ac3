// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A webhook event accepted on `/log`. Forwarded downstream unchanged.
///
/// Missing fields take their zero value and unknown fields are ignored. A field present with
/// the wrong type rejects the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub user_id: i64,
    pub total: f64,
    pub title: String,
    pub meta: Meta,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    #[serde(deserialize_with = "null_as_empty")]
    pub logins: Vec<Login>,
    pub phone_numbers: PhoneNumbers,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Login {
    /// RFC 3339 timestamp
    pub time: DateTime<Utc>,
    pub ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneNumbers {
    pub home: String,
    pub mobile: String,
}

/// Senders encode an empty login list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Login>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<Login>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
