//! Timer driven tests for tick scheduling, cooldown and shutdown
//!
//! Most of these run with paused tokio time, so the timeline is exact.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use validator_watcher::{actors::monitor::TargetHandle, storage::MemoryBackend};

use crate::helpers::*;

fn spawn_draining(
    frequency: u64,
    cooldown_secs: u64,
    sender: Arc<RecordingSender>,
) -> (Arc<ScriptedFetcher>, CancellationToken, tokio::task::JoinHandle<()>, TargetHandle) {
    let mut target = create_test_target("holesky", "http://unused", &[7]);
    target.frequency = frequency;

    let fetcher = ScriptedFetcher::draining(7);
    let token = CancellationToken::new();
    let (handle, join) = TargetHandle::spawn(
        target,
        fetcher.clone(),
        create_test_context(
            Arc::new(MemoryBackend::new()),
            sender,
            create_test_options(0, 1, cooldown_secs),
        ),
        token.clone(),
    );

    (fetcher, token, join, handle)
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_after_one_period() {
    let (fetcher, token, join, _handle) = spawn_draining(12, 60, RecordingSender::new());

    sleep(Duration::from_secs(11)).await;
    assert_eq!(fetcher.fetches(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(fetcher.fetches(), 1);

    token.cancel();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_second_alert_during_cooldown() {
    let sender = RecordingSender::new();
    let (fetcher, token, join, handle) = spawn_draining(12, 60, sender.clone());

    // ticks at 12 (no history) and 24 (alert). The cooldown runs until 84,
    // then the ticker restarts and fires at 96.
    sleep(Duration::from_secs(90)).await;
    assert_eq!(sender.messages().len(), 1);
    assert_eq!(fetcher.fetches(), 2);

    sleep(Duration::from_secs(10)).await;
    let times = sender.send_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs(60));
    // ticks that fell into the cooldown were dropped, not replayed
    assert_eq!(fetcher.fetches(), 3);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.alerts_sent, 2);

    token.cancel();
    join.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_cooldown_alerts_every_tick() {
    let sender = RecordingSender::new();
    let (_fetcher, token, join, _handle) = spawn_draining(12, 0, sender.clone());

    sleep(Duration::from_secs(12 * 4 + 1)).await;
    // first tick has no history to compare against
    assert_eq!(sender.messages().len(), 3);

    token.cancel();
    join.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_during_cooldown() {
    let sender = RecordingSender::new();
    let (_fetcher, token, join, handle) = spawn_draining(3600, 3600, sender.clone());

    handle.poll_now().await.unwrap();
    let report = handle.poll_now().await.unwrap();
    assert!(report.alerted());

    // the monitor is now sleeping for an hour
    let started = Instant::now();
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("monitor did not stop during cooldown")
        .expect("monitor panicked");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sender.messages().len(), 1);
}
