//! Validator history storage
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` allows swapping implementations
//! - **Async**: All operations are async for use from the monitor loops
//! - **Append-only**: No update or delete operations are exposed
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, durable history
//! - **In-Memory**: No persistence, for `backend: none` and tests
//!
//! ## Usage
//!
//! ```no_run
//! use validator_watcher::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./validators.db").await?;
//!     println!("{}", backend.get_stats().await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend, ensure_healthy, network_key};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
