//! Message types for actor communication
//!
//! Commands are request/response messages sent to a target monitor via its
//! mpsc channel. Replies travel back over oneshot channels.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

/// Commands that can be sent to a TargetMonitorActor
///
/// Commands are served between ticks only. One sent while the monitor is
/// cooling down after an alert waits until the cooldown is over.
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run one tick immediately (bypassing the interval timer)
    ///
    /// The reply is sent as soon as the tick completes. A cooldown triggered
    /// by that tick starts afterwards.
    PollNow {
        respond_to: oneshot::Sender<TickReport>,
    },

    /// Snapshot of the monitor's counters
    GetState {
        respond_to: oneshot::Sender<MonitorState>,
    },
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Validators whose state was fetched successfully
    pub processed: usize,

    pub fetch_failures: usize,

    /// Alert messages produced by the evaluator this tick
    pub messages_produced: usize,

    /// Messages the sender accepted
    pub messages_delivered: usize,
}

impl TickReport {
    pub fn alerted(&self) -> bool {
        self.messages_produced > 0
    }
}

/// Current state of a target monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorState {
    pub network: String,

    /// Ticks left before alert evaluation starts
    pub rounds_remaining: u32,

    /// Ticks completed since start, timer and PollNow alike
    pub ticks: u64,

    pub alerts_sent: u64,

    pub last_tick: Option<DateTime<Utc>>,
}
