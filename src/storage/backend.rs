//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! history stores implement.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::{StorageError, StorageResult};
use crate::{ObservedState, ValidatorKey};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Normalize a network name into its storage key
pub fn network_key(network: &str) -> String {
    network.trim().to_lowercase()
}

/// Run the backend health check, turning an unhealthy report into an error
pub async fn ensure_healthy(backend: &dyn StorageBackend) -> StorageResult<HealthStatus> {
    let status = backend.health_check().await?;
    if !status.healthy {
        return Err(StorageError::ConnectionFailed(status.message));
    }
    Ok(status)
}

/// Append-only validator history store
///
/// History is keyed by (network, validator). Network names are normalized
/// with [`network_key`] before every read and write.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// target loop. Each validator has a single writer loop in practice, but
/// backends must not corrupt data when that assumption is violated.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append an observed state
    ///
    /// Creates the network record on first write. Appending the same state
    /// twice stores it twice.
    async fn append(&self, network: &str, state: &ObservedState) -> StorageResult<()>;

    /// Most recent state for a validator
    ///
    /// Fails with `StorageError::NotFound` when nothing is recorded yet.
    async fn latest(&self, network: &str, key: &ValidatorKey) -> StorageResult<ObservedState>;

    /// Up to `limit` most recent states, newest first
    ///
    /// Returns an empty vector when the validator (or the network) has no
    /// history yet.
    async fn recent_window(
        &self,
        network: &str,
        key: &ValidatorKey,
        limit: usize,
    ) -> StorageResult<Vec<ObservedState>>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Get backend-specific statistics
    ///
    /// Returns human-readable stats (e.g., "SQLite: 1200 states, 2 networks").
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
