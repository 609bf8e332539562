//! TargetMonitorActor - Polls one beacon node for a set of validators
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → for each validator: fetch → read window → evaluate → append
//!     ↑                                                       │
//!     │                                            alert? → send → cooldown
//!     └─── Commands (PollNow, GetState) / CancellationToken
//! ```
//!
//! A tick never runs concurrently with another tick of the same target.
//! Commands and the shutdown signal are only observed between ticks and
//! during the cooldown pause.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::ObservedState;
use crate::alerts::AlertSender;
use crate::beacon::{FetchError, Fetcher};
use crate::config::{AlertOptions, DispatchMode, ResolvedTarget, ValidatorId};
use crate::monitors::balance::{AlertEvaluator, AlertMessage};
use crate::storage::StorageBackend;

use super::messages::{MonitorCommand, MonitorState, TickReport};

/// Collaborators shared by every target monitor
#[derive(Clone)]
pub struct MonitorContext {
    pub store: Arc<dyn StorageBackend>,
    pub evaluator: Arc<dyn AlertEvaluator>,
    pub sender: Arc<dyn AlertSender>,
    pub options: AlertOptions,
}

/// Actor that monitors the validators of a single target
pub struct TargetMonitorActor {
    target: ResolvedTarget,

    fetcher: Arc<dyn Fetcher>,

    ctx: MonitorContext,

    command_rx: mpsc::Receiver<MonitorCommand>,

    token: CancellationToken,

    /// Ticks left before evaluation starts
    rounds_remaining: u32,

    ticks: u64,

    alerts_sent: u64,

    last_tick: Option<chrono::DateTime<Utc>>,
}

impl TargetMonitorActor {
    pub fn new(
        target: ResolvedTarget,
        fetcher: Arc<dyn Fetcher>,
        ctx: MonitorContext,
        command_rx: mpsc::Receiver<MonitorCommand>,
        token: CancellationToken,
    ) -> Self {
        let rounds_remaining = ctx.options.warmup_rounds;

        Self {
            target,
            fetcher,
            ctx,
            command_rx,
            token,
            rounds_remaining,
            ticks: 0,
            alerts_sent: 0,
            last_tick: None,
        }
    }

    /// Run the actor's main loop until the token is cancelled
    #[instrument(skip(self), fields(network = %self.target.network()))]
    pub async fn run(mut self) {
        let period = self.target.interval();
        info!(
            validators = self.target.validators.len(),
            frequency_secs = period.as_secs(),
            "starting target monitor"
        );

        // first tick one full period after start
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if !self.cool_down(&report, &mut ticker).await {
                        break;
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let report = self.tick().await;
                            let _ = respond_to.send(report);
                            if !self.cool_down(&report, &mut ticker).await {
                                break;
                            }
                        }

                        MonitorCommand::GetState { respond_to } => {
                            let _ = respond_to.send(self.state());
                        }
                    }
                }
            }
        }

        info!("target monitor stopped");
    }

    fn state(&self) -> MonitorState {
        MonitorState {
            network: self.target.network().to_string(),
            rounds_remaining: self.rounds_remaining,
            ticks: self.ticks,
            alerts_sent: self.alerts_sent,
            last_tick: self.last_tick,
        }
    }

    /// Pause after an alerting tick
    ///
    /// Returns `false` when shutdown was requested during the pause. Ticks
    /// that fell into the pause are dropped.
    async fn cool_down(&self, report: &TickReport, ticker: &mut Interval) -> bool {
        let cooldown = self.ctx.options.cooldown;
        if !report.alerted() || cooldown.is_zero() {
            return true;
        }

        debug!("cooling down for {}s", cooldown.as_secs());
        tokio::select! {
            _ = self.token.cancelled() => {
                debug!("shutdown requested during cooldown");
                false
            }
            _ = tokio::time::sleep(cooldown) => {
                ticker.reset();
                true
            }
        }
    }

    /// Process every validator of the target once
    #[instrument(skip(self), fields(network = %self.target.network(), tick = self.ticks + 1))]
    async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let evaluating = self.rounds_remaining == 0;
        let network = self.target.network();
        let mut pending: Option<AlertMessage> = None;

        for validator in &self.target.validators {
            let current = match self.fetch(validator).await {
                Ok(current) => current,
                Err(e) => {
                    error!("failed to fetch validator {validator}: {e}");
                    report.fetch_failures += 1;
                    continue;
                }
            };
            report.processed += 1;

            if let Some(message) = self.evaluate(&current, evaluating).await {
                report.messages_produced += 1;
                warn!(
                    validator = current.index,
                    withdrawal_mode = %current.withdrawal_mode(),
                    balance = %current.balance,
                    "{message}"
                );

                match self.ctx.options.dispatch {
                    DispatchMode::PerEntity => {
                        if self.deliver(&message).await {
                            report.messages_delivered += 1;
                        }
                    }
                    // last message of the tick wins
                    DispatchMode::Batched => pending = Some(message),
                }
            }

            if let Err(e) = self.ctx.store.append(network, &current).await {
                error!("failed to store state of validator {}: {e}", current.index);
            }
        }

        if let Some(message) = pending {
            if self.deliver(&message).await {
                report.messages_delivered += 1;
            }
        }

        self.ticks += 1;
        self.alerts_sent += report.messages_delivered as u64;
        self.last_tick = Some(Utc::now());
        if !report.alerted() && self.rounds_remaining > 0 {
            self.rounds_remaining -= 1;
            trace!("{} warm-up rounds remaining", self.rounds_remaining);
        }

        debug!(
            processed = report.processed,
            fetch_failures = report.fetch_failures,
            messages = report.messages_produced,
            "tick complete"
        );
        report
    }

    async fn fetch(&self, validator: &ValidatorId) -> Result<ObservedState, FetchError> {
        trace!("fetching validator {validator}");
        self.fetcher.fetch(validator).await
    }

    /// Read the history window and run the evaluator on it
    ///
    /// The window is read during warm-up as well, only the evaluation is
    /// skipped.
    async fn evaluate(&self, current: &ObservedState, evaluating: bool) -> Option<AlertMessage> {
        let network = self.target.network();
        let history = match self
            .ctx
            .store
            .recent_window(network, &current.key(), self.ctx.options.window)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                error!("failed to read history of validator {}: {e}", current.index);
                return None;
            }
        };

        if !evaluating {
            trace!(
                "warm-up: skipping evaluation of validator {} ({} states)",
                current.index,
                history.len()
            );
            return None;
        }

        self.ctx.evaluator.evaluate(network, current, &history)
    }

    async fn deliver(&self, message: &AlertMessage) -> bool {
        match self
            .ctx
            .sender
            .send(self.target.network(), &message.to_string())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("failed to send alert: {e}");
                false
            }
        }
    }
}

/// Handle for controlling a TargetMonitorActor
#[derive(Clone)]
pub struct TargetHandle {
    sender: mpsc::Sender<MonitorCommand>,

    pub network: String,
}

impl TargetHandle {
    /// Spawn a new monitor for `target`
    ///
    /// The task runs until `token` is cancelled.
    pub fn spawn(
        target: ResolvedTarget,
        fetcher: Arc<dyn Fetcher>,
        ctx: MonitorContext,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let network = target.network().to_string();

        let actor = TargetMonitorActor::new(target, fetcher, ctx, cmd_rx, token);
        let join = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                network,
            },
            join,
        )
    }

    /// Run one tick now and wait for its report
    pub async fn poll_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive tick report")
    }

    pub async fn get_state(&self) -> Result<MonitorState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::GetState { respond_to: tx })
            .await
            .context("failed to send GetState command")?;

        rx.await.context("failed to receive monitor state")
    }
}
