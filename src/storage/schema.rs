//! Database row definitions
//!
//! ## Column encoding
//!
//! - `balance`, `effective_balance`: decimal strings, because SQLite
//!   integers are 64-bit signed and gwei quantities are parsed into `u128`
//! - `validator_index`: INTEGER, checked to fit `i64` on the way in
//! - `observed_at`: Unix milliseconds (UTC)

use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use crate::{Gwei, ObservedState};

/// A `validator_states` row as read from or written to SQLite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRow {
    pub validator_index: i64,
    pub pubkey: String,
    pub balance: String,
    pub effective_balance: String,
    pub withdrawal_credentials: String,
    pub observed_at: i64,
}

impl StateRow {
    pub fn from_observed_state(state: &ObservedState) -> StorageResult<Self> {
        let validator_index = i64::try_from(state.index).map_err(|_| {
            StorageError::InvalidValue(format!("validator index {} exceeds i64", state.index))
        })?;

        Ok(Self {
            validator_index,
            pubkey: state.pubkey.clone(),
            balance: state.balance.to_string(),
            effective_balance: state.effective_balance.to_string(),
            withdrawal_credentials: state.withdrawal_credentials.clone(),
            observed_at: state.observed_at.timestamp_millis(),
        })
    }

    pub fn into_observed_state(self) -> StorageResult<ObservedState> {
        let index = u64::try_from(self.validator_index).map_err(|_| {
            StorageError::InvalidValue(format!("negative validator index {}", self.validator_index))
        })?;
        let balance = parse_gwei("balance", &self.balance)?;
        let effective_balance = parse_gwei("effective_balance", &self.effective_balance)?;
        let observed_at = DateTime::<Utc>::from_timestamp_millis(self.observed_at).ok_or_else(
            || StorageError::InvalidValue(format!("observed_at {} out of range", self.observed_at)),
        )?;

        Ok(ObservedState {
            index,
            pubkey: self.pubkey,
            balance,
            effective_balance,
            withdrawal_credentials: self.withdrawal_credentials,
            observed_at,
        })
    }
}

fn parse_gwei(column: &str, value: &str) -> StorageResult<Gwei> {
    value
        .parse()
        .map_err(|_| StorageError::InvalidValue(format!("{column} {value:?} is not a gwei amount")))
}
