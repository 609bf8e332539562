//! Concurrency tests: several target monitors over one shared store

use std::sync::Arc;
use std::time::Duration;

use validator_watcher::{
    ValidatorKey,
    actors::coordinator::Coordinator,
    beacon::Fetcher,
    storage::{MemoryBackend, StorageBackend},
};

use crate::helpers::*;

fn key(index: u64) -> ValidatorKey {
    ValidatorKey {
        index,
        pubkey: format!("0x{index:096x}"),
    }
}

#[tokio::test]
async fn test_targets_share_store_without_interference() {
    let store = Arc::new(MemoryBackend::new());
    let sender = RecordingSender::new();

    let networks = ["mainnet", "holesky", "sepolia", "hoodi"];
    let monitors = networks
        .iter()
        .map(|network| {
            let fetcher: Arc<dyn Fetcher> =
                ScriptedFetcher::new(&[(1, (0..20).rev().collect()), (2, (0..20).collect())]);
            (create_test_target(network, "http://unused", &[1, 2]), fetcher)
        })
        .collect();

    let coordinator = Coordinator::start_with_fetchers(
        monitors,
        create_test_context(store.clone(), sender.clone(), create_test_options(0, 3, 0)),
    );

    let mut tasks = vec![];
    for handle in coordinator.handles().iter().cloned() {
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                handle.poll_now().await.unwrap();
            }
            handle.get_state().await.unwrap()
        }));
    }

    for task in tasks {
        let state = task.await.unwrap();
        assert_eq!(state.ticks, 5);
    }

    for network in networks {
        for index in [1, 2] {
            let window = store.recent_window(network, &key(index), 100).await.unwrap();
            assert_eq!(window.len(), 5, "{network}/{index}");
        }
    }

    // only the draining validator alerts, once per network on tick 2
    let messages = sender.messages();
    assert_eq!(messages.len(), networks.len());
    assert!(messages.iter().all(|m| m.contains("Validator 1 ")));

    coordinator.shutdown();
    assert_eq!(coordinator.wait().await, 0);
}

#[tokio::test]
async fn test_concurrent_poll_now_requests_are_serialized() {
    let fetcher = ScriptedFetcher::new(&[(1, (0..100).collect())]);
    let coordinator = Coordinator::start_with_fetchers(
        vec![(
            create_test_target("mainnet", "http://unused", &[1]),
            fetcher.clone() as Arc<dyn Fetcher>,
        )],
        create_test_context(
            Arc::new(MemoryBackend::new()),
            RecordingSender::new(),
            create_test_options(0, 3, 0),
        ),
    );
    let handle = coordinator.handles()[0].clone();

    let mut tasks = vec![];
    for _ in 0..10 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move { handle.poll_now().await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fetcher.fetches(), 10);
    assert_eq!(handle.get_state().await.unwrap().ticks, 10);

    coordinator.shutdown();
    let failed = tokio::time::timeout(Duration::from_secs(5), coordinator.wait())
        .await
        .unwrap();
    assert_eq!(failed, 0);
}
