//! Checkpoints in one JSON file, keyed by session id.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::crawl::Checkpoint;

/// JSON file store. Writes go to a temp file in the same directory and are
/// renamed into place, so a crash never leaves a half-written file.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

type CheckpointFile = BTreeMap<String, Checkpoint>;

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> CheckpointResult<CheckpointFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(CheckpointFile::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CheckpointFile::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, checkpoints: CheckpointFile) -> CheckpointResult<()> {
        let path = self.path.clone();
        let content = serde_json::to_vec_pretty(&checkpoints)?;
        tokio::task::spawn_blocking(move || -> CheckpointResult<()> {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&content)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| CheckpointError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn save(&self, session: &str, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let mut all = self.read_all().await?;
        all.insert(session.to_string(), checkpoint.clone());
        self.write_all(all).await?;
        debug!(
            "Saved checkpoint for '{}' to {}",
            session,
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self, session: &str) -> CheckpointResult<Option<Checkpoint>> {
        Ok(self.read_all().await?.remove(session))
    }

    async fn clear(&self, session: &str) -> CheckpointResult<bool> {
        let mut all = self.read_all().await?;
        let existed = all.remove(session).is_some();
        if existed {
            self.write_all(all).await?;
        }
        Ok(existed)
    }
}
