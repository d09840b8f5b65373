//! Durable checkpoint storage.
//!
//! Sessions only produce and consume [`Checkpoint`] values; where they live
//! is up to the caller. A JSON file suits a single CLI user, SQLite suits
//! several sessions sharing one database.

mod json_file;
mod sqlite;

pub use json_file::JsonFileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::crawl::Checkpoint;

/// Result type for checkpoint store operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors from checkpoint store operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Stores at most one checkpoint per session id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save, replacing any previous checkpoint for `session`.
    async fn save(&self, session: &str, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    async fn load(&self, session: &str) -> CheckpointResult<Option<Checkpoint>>;

    /// Remove the checkpoint. Returns whether one existed.
    async fn clear(&self, session: &str) -> CheckpointResult<bool>;
}

/// Pick a store by file extension: `.db`/`.sqlite`/`.sqlite3` use SQLite,
/// anything else is a JSON file.
pub fn open_store(path: &Path) -> CheckpointResult<Arc<dyn CheckpointStore>> {
    let is_sqlite = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "db" | "sqlite" | "sqlite3"));

    if is_sqlite {
        Ok(Arc::new(SqliteCheckpointStore::open(path)?))
    } else {
        Ok(Arc::new(JsonFileCheckpointStore::new(path)))
    }
}
