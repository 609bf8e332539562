pub mod actors;
pub mod alerts;
pub mod beacon;
pub mod config;
pub mod discord;
pub mod monitors;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Beacon chain balance quantity in Gwei
///
/// The beacon API transports balances as decimal strings. They are parsed
/// into a wide integer before any comparison so precision is never lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gwei(pub u128);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid gwei quantity: {0:?}")]
pub struct ParseGweiError(String);

impl FromStr for Gwei {
    type Err = ParseGweiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // u128::from_str accepts a leading '+', the beacon API never sends one
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseGweiError(s.to_string()));
        }

        s.parse::<u128>()
            .map(Gwei)
            .map_err(|_| ParseGweiError(s.to_string()))
    }
}

impl fmt::Display for Gwei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Gwei {
    fn from(value: u64) -> Self {
        Gwei(value as u128)
    }
}

impl Serialize for Gwei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Gwei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Withdrawal mode, derived from the first byte of the withdrawal credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalMode {
    /// `0x00`: BLS credentials, no automatic withdrawals
    Bls,
    /// `0x01`: execution address, excess balance is swept periodically
    Execution,
    /// `0x02`: compounding execution address
    Compounding,
    Unknown,
}

impl fmt::Display for WithdrawalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawalMode::Bls => write!(f, "bls (0x00)"),
            WithdrawalMode::Execution => write!(f, "execution (0x01)"),
            WithdrawalMode::Compounding => write!(f, "compounding (0x02)"),
            WithdrawalMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identity of a validator within one network, as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorKey {
    pub index: u64,
    pub pubkey: String,
}

/// One snapshot of a validator's balance-related fields
///
/// Produced once per successful fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub index: u64,
    pub pubkey: String,
    pub balance: Gwei,
    pub effective_balance: Gwei,
    pub withdrawal_credentials: String,
    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    pub fn key(&self) -> ValidatorKey {
        ValidatorKey {
            index: self.index,
            pubkey: self.pubkey.clone(),
        }
    }

    pub fn withdrawal_mode(&self) -> WithdrawalMode {
        let credentials = self.withdrawal_credentials.to_ascii_lowercase();
        if credentials.starts_with("0x00") {
            WithdrawalMode::Bls
        } else if credentials.starts_with("0x01") {
            WithdrawalMode::Execution
        } else if credentials.starts_with("0x02") {
            WithdrawalMode::Compounding
        } else {
            WithdrawalMode::Unknown
        }
    }
}
