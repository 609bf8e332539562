//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the writer
//! - **Connection pooling**: Shared by every target loop
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Concurrency
//!
//! Every append runs in its own transaction (network upsert + state insert).
//! Concurrent writers serialize on the SQLite write lock; if the busy
//! timeout expires the append fails with `StorageError` instead of leaving a
//! partial write behind.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend, network_key};
use super::error::{StorageError, StorageResult};
use super::schema::StateRow;
use crate::{ObservedState, ValidatorKey};

const SELECT_STATES: &str = r#"
    SELECT s.validator_index, s.pubkey, s.balance, s.effective_balance,
           s.withdrawal_credentials, s.observed_at
    FROM validator_states s
    JOIN networks n ON n.id = s.network_id
    WHERE n.name = ? AND s.validator_index = ? AND s.pubkey = ?
    ORDER BY s.observed_at DESC, s.id DESC
    LIMIT ?
"#;

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Configure SQLite (WAL mode, busy timeout)
    /// 3. Run migrations to create tables
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use validator_watcher::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./validators.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn state_from_row(row: &SqliteRow) -> StorageResult<ObservedState> {
        StateRow {
            validator_index: row.try_get("validator_index")?,
            pubkey: row.try_get("pubkey")?,
            balance: row.try_get("balance")?,
            effective_balance: row.try_get("effective_balance")?,
            withdrawal_credentials: row.try_get("withdrawal_credentials")?,
            observed_at: row.try_get("observed_at")?,
        }
        .into_observed_state()
    }

    async fn query_states(
        &self,
        network: &str,
        key: &ValidatorKey,
        limit: usize,
    ) -> StorageResult<Vec<ObservedState>> {
        let validator_index = i64::try_from(key.index).map_err(|_| {
            StorageError::InvalidValue(format!("validator index {} exceeds i64", key.index))
        })?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(SELECT_STATES)
            .bind(network)
            .bind(validator_index)
            .bind(&key.pubkey)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::state_from_row).collect()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, state), fields(index = state.index))]
    async fn append(&self, network: &str, state: &ObservedState) -> StorageResult<()> {
        let network = network_key(network);
        let row = StateRow::from_observed_state(state)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO networks (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(&network)
            .execute(&mut *tx)
            .await?;

        let (network_id,): (i64,) = sqlx::query_as("SELECT id FROM networks WHERE name = ?")
            .bind(&network)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO validator_states (
                network_id, validator_index, pubkey, balance,
                effective_balance, withdrawal_credentials, observed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(network_id)
        .bind(row.validator_index)
        .bind(&row.pubkey)
        .bind(&row.balance)
        .bind(&row.effective_balance)
        .bind(&row.withdrawal_credentials)
        .bind(row.observed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("appended state for validator {} on {network}", state.index);
        Ok(())
    }

    #[instrument(skip(self, key), fields(index = key.index))]
    async fn latest(&self, network: &str, key: &ValidatorKey) -> StorageResult<ObservedState> {
        let network = network_key(network);

        self.query_states(&network, key, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound {
                network,
                index: key.index,
            })
    }

    #[instrument(skip(self, key), fields(index = key.index))]
    async fn recent_window(
        &self,
        network: &str,
        key: &ValidatorKey,
        limit: usize,
    ) -> StorageResult<Vec<ObservedState>> {
        let network = network_key(network);
        debug!("querying latest {limit} states for validator {} on {network}", key.index);

        let window = self.query_states(&network, key, limit).await?;
        debug!("query returned {} states", window.len());
        Ok(window)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (states,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM validator_states")
            .fetch_one(&self.pool)
            .await?;

        let (validators,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (SELECT DISTINCT network_id, validator_index FROM validator_states)",
        )
        .fetch_one(&self.pool)
        .await?;

        let (networks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM networks")
            .fetch_one(&self.pool)
            .await?;

        let file_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0) as f64
            / 1_000_000.0;

        Ok(format!(
            "SQLite: {states} states for {validators} validators across {networks} networks, {file_size_mb:.2} MB on disk"
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
