//! Crawl snapshots for resuming after interruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::session::CrawlSession;
use super::state::{CrawlPhase, DiscoveredItemSet, IterationState};

/// Point-in-time copy of a session's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: IterationState,
    /// Discovered keys, sorted.
    pub discovered: Vec<String>,
    pub taken_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether two checkpoints describe the same progress, ignoring when
    /// they were taken.
    pub fn same_progress(&self, other: &Checkpoint) -> bool {
        self.state == other.state && self.discovered == other.discovered
    }
}

impl CrawlSession {
    /// Snapshot the current progress. Does not touch the session.
    pub fn create_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            discovered: self.discovered.to_sorted_vec(),
            taken_at: Utc::now(),
        }
    }

    /// Replace state and discovered set with the checkpoint's. Items harvested
    /// but not yet taken are discarded.
    pub fn restore_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.state = checkpoint.state.clone();
        self.discovered = checkpoint.discovered.iter().collect::<DiscoveredItemSet>();
        self.harvested.clear();
        self.phase = if self.state.complete {
            CrawlPhase::Complete
        } else {
            CrawlPhase::Idle
        };
        info!(
            "Restored checkpoint from {}: page {}, {} items discovered, next {}",
            checkpoint.taken_at.format("%Y-%m-%d %H:%M:%S"),
            self.state.iteration_count,
            self.discovered.len(),
            self.state.cursor
        );
    }
}
