//! Failure tests for the monitor loop
//!
//! Failures of one validator, the store or the sender must never stop the
//! loop or affect the other validators of the tick.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use validator_watcher::{
    ValidatorKey,
    actors::monitor::TargetHandle,
    beacon::BeaconClient,
    storage::{MemoryBackend, StorageBackend},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn key(index: u64) -> ValidatorKey {
    ValidatorKey {
        index,
        pubkey: format!("0x{index:096x}"),
    }
}

#[tokio::test]
async fn test_one_failed_fetch_does_not_block_others() {
    let mock_server = MockServer::start().await;
    mount_balance_sequence(&mock_server, 1, vec![100, 50]).await;
    mount_balance_sequence(&mock_server, 3, vec![100, 50]).await;

    // validator 2 is unknown to the node
    Mock::given(method("GET"))
        .and(path("/eth/v1/beacon/states/head/validators/2"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": 404,
            "message": "Validator not found"
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    let sender = RecordingSender::new();
    let target = create_test_target("mainnet", &mock_server.uri(), &[1, 2, 3]);
    let fetcher = Arc::new(BeaconClient::new(target.beacon_api.clone()).unwrap());
    let token = CancellationToken::new();

    let mut options = create_test_options(0, 3, 0);
    options.dispatch = validator_watcher::config::DispatchMode::PerEntity;
    let (handle, _join) = TargetHandle::spawn(
        target,
        fetcher,
        create_test_context(store.clone(), sender.clone(), options),
        token.clone(),
    );

    handle.poll_now().await.unwrap();
    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.messages_delivered, 2);

    let messages = sender.messages();
    assert!(messages[0].contains("Validator 1 "));
    assert!(messages[1].contains("Validator 3 "));

    for index in [1, 3] {
        let window = store.recent_window("mainnet", &key(index), 10).await.unwrap();
        assert_eq!(window.len(), 2, "validator {index} should have two states");
    }
    let missing = store.recent_window("mainnet", &key(2), 10).await.unwrap();
    assert!(missing.is_empty());

    token.cancel();
}

#[tokio::test]
async fn test_unreachable_node_keeps_loop_alive() {
    let store = Arc::new(MemoryBackend::new());
    let target = create_test_target("mainnet", "http://127.0.0.1:9", &[1, 2]);
    let fetcher = Arc::new(BeaconClient::new(target.beacon_api.clone()).unwrap());
    let token = CancellationToken::new();

    let (handle, join) = TargetHandle::spawn(
        target,
        fetcher,
        create_test_context(store.clone(), RecordingSender::new(), create_test_options(0, 3, 0)),
        token.clone(),
    );

    for _ in 0..2 {
        let report = handle.poll_now().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.fetch_failures, 2);
    }
    assert_eq!(handle.get_state().await.unwrap().ticks, 2);

    let stats = store.get_stats().await.unwrap();
    assert!(stats.contains("0 states"), "{stats}");

    token.cancel();
    join.await.unwrap();
}

#[tokio::test]
async fn test_malformed_response_is_skipped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/eth/v1/beacon/states/head/validators/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": 42}"))
        .mount(&mock_server)
        .await;

    let target = create_test_target("mainnet", &mock_server.uri(), &[1]);
    let fetcher = Arc::new(BeaconClient::new(target.beacon_api.clone()).unwrap());
    let token = CancellationToken::new();

    let (handle, _join) = TargetHandle::spawn(
        target,
        fetcher,
        create_test_context(
            Arc::new(MemoryBackend::new()),
            RecordingSender::new(),
            create_test_options(0, 3, 0),
        ),
        token.clone(),
    );

    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.fetch_failures, 1);

    token.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_still_cools_down() {
    let sender = RecordingSender::failing();
    let fetcher = ScriptedFetcher::draining(1);
    let token = CancellationToken::new();

    let (handle, _join) = TargetHandle::spawn(
        create_test_target("mainnet", "http://unused", &[1]),
        fetcher.clone(),
        create_test_context(
            Arc::new(MemoryBackend::new()),
            sender.clone(),
            create_test_options(0, 1, 60),
        ),
        token.clone(),
    );

    handle.poll_now().await.unwrap();
    let started = tokio::time::Instant::now();
    let report = handle.poll_now().await.unwrap();
    assert_eq!(report.messages_produced, 1);
    assert_eq!(report.messages_delivered, 0);

    // served only once the cooldown is over
    let state = handle.get_state().await.unwrap();
    assert!(started.elapsed() >= std::time::Duration::from_secs(60));
    assert_eq!(state.alerts_sent, 0);
    assert_eq!(sender.messages().len(), 1);

    token.cancel();
}
