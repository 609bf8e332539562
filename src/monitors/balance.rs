//! Balance trend evaluation
//!
//! ## Decreasing chain
//!
//! Given the current state and the history window newest-first
//! (`h[0]` newest), the trend holds when
//!
//! ```text
//! current < h[0]   and   h[i] < h[i-1]   for every i in 1..k
//! ```
//!
//! Only the first link compares against the current state. The remaining
//! links compare neighbouring historical entries with each other, so a
//! balance that dropped steadily across the whole window does not match
//! unless the current state is also below the newest entry and the older
//! history rose towards it.

use std::fmt;

use crate::ObservedState;

/// Alert produced by an evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub network: String,
    pub validator_index: u64,
    /// Number of historical entries the decision was based on
    pub consecutive_slots: usize,
}

impl fmt::Display for AlertMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALERT: {} Validator {} balance have been decreasing for {} consecutive slots.",
            self.network.to_uppercase(),
            self.validator_index,
            self.consecutive_slots
        )
    }
}

/// Decides whether the current state together with its history warrants an alert
///
/// Implementations must be pure: no I/O, no interior state.
pub trait AlertEvaluator: Send + Sync {
    fn evaluate(
        &self,
        network: &str,
        current: &ObservedState,
        history: &[ObservedState],
    ) -> Option<AlertMessage>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceTrendEvaluator;

impl BalanceTrendEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Check the decreasing chain described in the module docs
    pub fn is_decreasing(current: &ObservedState, history: &[ObservedState]) -> bool {
        let Some(newest) = history.first() else {
            return false;
        };

        current.balance < newest.balance
            && history
                .windows(2)
                .all(|pair| pair[1].balance < pair[0].balance)
    }
}

impl AlertEvaluator for BalanceTrendEvaluator {
    fn evaluate(
        &self,
        network: &str,
        current: &ObservedState,
        history: &[ObservedState],
    ) -> Option<AlertMessage> {
        if !Self::is_decreasing(current, history) {
            return None;
        }

        Some(AlertMessage {
            network: network.to_string(),
            validator_index: current.index,
            consecutive_slots: history.len(),
        })
    }
}
