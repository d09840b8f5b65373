//! Checkpoints in a SQLite table.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::crawl::Checkpoint;

/// Open a database connection with proper concurrency settings.
fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
    "#,
    )?;
    Ok(conn)
}

/// Initialize the checkpoint table in the database.
fn init_checkpoint_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_checkpoints (
            session TEXT PRIMARY KEY,
            checkpoint TEXT NOT NULL,
            taken_at TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#,
    )?;
    Ok(())
}

/// SQLite-backed store. Each operation opens its own connection on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Open (and create if needed) the database at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let db_path = db_path.into();
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = open_db(&db_path)?;
        init_checkpoint_table(&conn)?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> CheckpointResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CheckpointResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> CheckpointResult<T> {
            let conn = open_db(&db_path)?;
            f(&conn)
        })
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, session: &str, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let session = session.to_string();
        let json = serde_json::to_string(checkpoint)?;
        let taken_at = checkpoint.taken_at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO crawl_checkpoints (session, checkpoint, taken_at, updated_at)
                   VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                   ON CONFLICT(session) DO UPDATE SET
                       checkpoint = excluded.checkpoint,
                       taken_at = excluded.taken_at,
                       updated_at = CURRENT_TIMESTAMP"#,
                params![session, json, taken_at],
            )?;
            debug!("Saved checkpoint for '{}'", session);
            Ok(())
        })
        .await
    }

    async fn load(&self, session: &str) -> CheckpointResult<Option<Checkpoint>> {
        let session = session.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT checkpoint FROM crawl_checkpoints WHERE session = ?1",
                    params![session],
                    |row| row.get(0),
                )
                .optional()?;
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn clear(&self, session: &str) -> CheckpointResult<bool> {
        let session = session.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM crawl_checkpoints WHERE session = ?1",
                params![session],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
