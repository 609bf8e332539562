//! In-memory storage backend (no persistence)
//!
//! Used when `storage.backend` is `none` and throughout the tests.
//!
//! ## Limitations
//!
//! - **No persistence**: All history lost on restart
//! - **Unbounded**: Nothing is ever evicted, like the SQLite backend

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, StorageBackend, network_key};
use super::error::{StorageError, StorageResult};
use crate::{ObservedState, ValidatorKey};

type NetworkHistory = HashMap<ValidatorKey, Vec<ObservedState>>;

/// In-memory storage backend
///
/// States are kept per network and validator, sorted by observation time.
#[derive(Default)]
pub struct MemoryBackend {
    networks: RwLock<HashMap<String, NetworkHistory>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the history ordered by `observed_at`, oldest first
    ///
    /// A state goes after every state with the same timestamp, so reading
    /// from the back yields equal timestamps latest insert first.
    fn insert_ordered(states: &mut Vec<ObservedState>, state: ObservedState) {
        let position = states.partition_point(|s| s.observed_at <= state.observed_at);
        states.insert(position, state);
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn append(&self, network: &str, state: &ObservedState) -> StorageResult<()> {
        let network = network_key(network);
        trace!("in-memory append for validator {} on {network}", state.index);

        let mut networks = self.networks.write().await;
        let states = networks
            .entry(network)
            .or_default()
            .entry(state.key())
            .or_default();
        Self::insert_ordered(states, state.clone());

        Ok(())
    }

    async fn latest(&self, network: &str, key: &ValidatorKey) -> StorageResult<ObservedState> {
        let network = network_key(network);
        let networks = self.networks.read().await;

        networks
            .get(&network)
            .and_then(|history| history.get(key))
            .and_then(|states| states.last().cloned())
            .ok_or(StorageError::NotFound {
                network,
                index: key.index,
            })
    }

    async fn recent_window(
        &self,
        network: &str,
        key: &ValidatorKey,
        limit: usize,
    ) -> StorageResult<Vec<ObservedState>> {
        let network = network_key(network);
        debug!("querying latest {limit} states for validator {} on {network}", key.index);

        let networks = self.networks.read().await;
        let window: Vec<ObservedState> = networks
            .get(&network)
            .and_then(|history| history.get(key))
            .map(|states| states.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();

        Ok(window)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let networks = self.networks.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("networks".to_string(), networks.len().to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let networks = self.networks.read().await;
        let validators: usize = networks.values().map(HashMap::len).sum();
        let states: usize = networks
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum();

        Ok(format!(
            "In-Memory: {states} states for {validators} validators across {} networks",
            networks.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
