//! Beacon node client - fetches the current state of a single validator
//!
//! ## Endpoint
//!
//! ```text
//! GET {endpoint}/eth/v1/beacon/states/head/validators/{index | pubkey}
//! ```
//!
//! The client does no caching and no retries. A failed fetch is reported to
//! the monitor loop, which skips the validator until the next tick.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{instrument, trace};

use crate::config::{BeaconApi, ValidatorId};
use crate::{Gwei, ObservedState};

/// Per-request timeout enforced by the HTTP client
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("beacon node answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed validator response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field} in validator response: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Source of current validator states
///
/// The monitor loop only depends on this trait so tests can swap in
/// scripted fetchers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, validator: &ValidatorId) -> Result<ObservedState, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    data: ValidatorData,
}

#[derive(Debug, Deserialize)]
struct ValidatorData {
    index: String,
    balance: String,
    validator: ValidatorDetails,
}

#[derive(Debug, Deserialize)]
struct ValidatorDetails {
    pubkey: String,
    withdrawal_credentials: String,
    effective_balance: String,
}

impl ValidatorData {
    fn into_observed_state(self) -> Result<ObservedState, FetchError> {
        let index = self
            .index
            .parse::<u64>()
            .map_err(|_| FetchError::InvalidField {
                field: "index",
                value: self.index.clone(),
            })?;
        let balance = parse_gwei("balance", &self.balance)?;
        let effective_balance = parse_gwei("effective_balance", &self.validator.effective_balance)?;

        Ok(ObservedState {
            index,
            pubkey: self.validator.pubkey,
            balance,
            effective_balance,
            withdrawal_credentials: self.validator.withdrawal_credentials,
            observed_at: Utc::now(),
        })
    }
}

fn parse_gwei(field: &'static str, value: &str) -> Result<Gwei, FetchError> {
    value.parse().map_err(|_| FetchError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// HTTP client for one beacon node
#[derive(Debug, Clone)]
pub struct BeaconClient {
    api: BeaconApi,

    /// HTTP client (reused across requests)
    client: reqwest::Client,
}

impl BeaconClient {
    pub fn new(api: BeaconApi) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { api, client })
    }

    pub fn network(&self) -> &str {
        &self.api.network
    }

    fn validator_url(&self, validator: &ValidatorId) -> String {
        format!(
            "{}/eth/v1/beacon/states/head/validators/{validator}",
            self.api.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Fetcher for BeaconClient {
    #[instrument(skip(self), fields(network = %self.api.network))]
    async fn fetch(&self, validator: &ValidatorId) -> Result<ObservedState, FetchError> {
        let url = self.validator_url(validator);
        trace!("requesting validator state from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let parsed: ValidatorResponse =
            serde_json::from_str(&body).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;

        let state = parsed.data.into_observed_state()?;
        trace!("validator {} balance {}", state.index, state.balance);
        Ok(state)
    }
}
