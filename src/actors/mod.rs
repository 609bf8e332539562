//! Actor-based monitoring system
//!
//! Each configured target runs as an independent async task. Tasks share the
//! history store, the evaluator and the alert sender, and nothing else.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │   Coordinator    │── CancellationToken
//!                  └────────┬─────────┘
//!                           │ spawns
//!            ┌──────────────┼──────────────┐
//!            │                             │
//!    ┌───────▼────────┐            ┌───────▼────────┐
//!    │ TargetMonitor  │    ...     │ TargetMonitor  │
//!    │ (mainnet)      │            │ (holesky)      │
//!    └───────┬────────┘            └───────┬────────┘
//!            │                             │
//!            └──────────────┬──────────────┘
//!                           │ Arc<dyn StorageBackend>
//!                  ┌────────▼─────────┐
//!                  │   History store  │
//!                  └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each monitor has an mpsc command channel (PollNow, GetState)
//! 2. **Request/Response**: oneshot channels carry the replies
//! 3. **Shutdown**: a shared cancellation token observed between ticks

pub mod coordinator;
pub mod messages;
pub mod monitor;
