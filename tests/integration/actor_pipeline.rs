//! End-to-end tests: beacon node → monitor → store → sender

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use validator_watcher::{
    Gwei, ValidatorKey,
    actors::monitor::TargetHandle,
    beacon::BeaconClient,
    storage::{MemoryBackend, StorageBackend},
};
use wiremock::MockServer;

use crate::helpers::*;

async fn spawn_monitor(
    server: &MockServer,
    indices: &[u64],
    store: Arc<MemoryBackend>,
    sender: Arc<RecordingSender>,
    warmup_rounds: u32,
) -> (TargetHandle, CancellationToken) {
    let target = create_test_target("mainnet", &server.uri(), indices);
    let fetcher = Arc::new(BeaconClient::new(target.beacon_api.clone()).unwrap());
    let token = CancellationToken::new();

    let (handle, _join) = TargetHandle::spawn(
        target,
        fetcher,
        create_test_context(store, sender, create_test_options(warmup_rounds, 3, 0)),
        token.clone(),
    );

    (handle, token)
}

#[tokio::test]
async fn test_steady_decline_alerts_only_on_first_drop() {
    let mock_server = MockServer::start().await;
    mount_balance_sequence(&mock_server, 1, vec![100, 90, 80, 70]).await;

    let sender = RecordingSender::new();
    let (handle, token) = spawn_monitor(
        &mock_server,
        &[1],
        Arc::new(MemoryBackend::new()),
        sender.clone(),
        0,
    )
    .await;

    let mut produced = Vec::new();
    for _ in 0..4 {
        produced.push(handle.poll_now().await.unwrap().messages_produced);
    }

    // tick 2 compares 90 against [100] only. On ticks 3 and 4 the older
    // history entries are falling, which breaks the chain.
    assert_eq!(produced, vec![0, 1, 0, 0]);
    assert_eq!(
        sender.messages(),
        vec!["ALERT: MAINNET Validator 1 balance have been decreasing for 1 consecutive slots."]
    );

    token.cancel();
}

#[tokio::test]
async fn test_drop_after_rise_alerts_with_full_window() {
    let mock_server = MockServer::start().await;
    mount_balance_sequence(&mock_server, 1, vec![70, 80, 90, 60]).await;

    let sender = RecordingSender::new();
    let (handle, token) = spawn_monitor(
        &mock_server,
        &[1],
        Arc::new(MemoryBackend::new()),
        sender.clone(),
        0,
    )
    .await;

    for _ in 0..3 {
        assert!(!handle.poll_now().await.unwrap().alerted());
    }
    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.messages_produced, 1);
    assert_eq!(report.messages_delivered, 1);

    assert_eq!(
        sender.messages(),
        vec!["ALERT: MAINNET Validator 1 balance have been decreasing for 3 consecutive slots."]
    );

    token.cancel();
}

#[tokio::test]
async fn test_every_tick_is_persisted() {
    let mock_server = MockServer::start().await;
    mount_balance_sequence(&mock_server, 5, vec![32_000_000_100, 32_000_000_200]).await;

    let store = Arc::new(MemoryBackend::new());
    let (handle, token) = spawn_monitor(
        &mock_server,
        &[5],
        store.clone(),
        RecordingSender::new(),
        3,
    )
    .await;

    handle.poll_now().await.unwrap();
    handle.poll_now().await.unwrap();

    let key = ValidatorKey {
        index: 5,
        pubkey: format!("0x{:096x}", 5),
    };
    let window = store.recent_window("mainnet", &key, 10).await.unwrap();
    let balances: Vec<Gwei> = window.iter().map(|s| s.balance).collect();
    assert_eq!(balances, vec![Gwei(32_000_000_200), Gwei(32_000_000_100)]);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.rounds_remaining, 1);
    assert_eq!(state.ticks, 2);

    token.cancel();
}

#[tokio::test]
async fn test_warmup_rounds_delay_first_alert() {
    let mock_server = MockServer::start().await;
    mount_balance_sequence(&mock_server, 1, vec![100, 200, 300, 50]).await;

    let sender = RecordingSender::new();
    let (handle, token) = spawn_monitor(
        &mock_server,
        &[1],
        Arc::new(MemoryBackend::new()),
        sender.clone(),
        3,
    )
    .await;

    for expected_remaining in [2, 1, 0] {
        handle.poll_now().await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.rounds_remaining, expected_remaining);
    }
    assert!(sender.messages().is_empty());

    let report = handle.poll_now().await.unwrap();
    assert!(report.alerted());
    assert_eq!(sender.messages().len(), 1);

    token.cancel();
}
