//! Iterative catalog crawl.
//!
//! A [`CrawlSession`] walks a paginated collection one page at a time,
//! deduplicating items and tracking its position in an [`IterationState`]
//! that can be snapshotted into a [`Checkpoint`] and restored later.

mod checkpoint;
mod session;
mod state;

pub use checkpoint::Checkpoint;
pub use session::{CrawlSession, PageReport};
pub use state::{CrawlPhase, Cursor, DiscoveredItemSet, IterationState};

use crate::discovery::ExtractError;
use crate::http_client::FetchError;

/// Why a crawl step failed. State is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlError {
    #[error("fetching page at {cursor} failed: {source}")]
    Fetch { cursor: Cursor, source: FetchError },
    #[error("page at {cursor} could not be parsed: {source}")]
    Extract { cursor: Cursor, source: ExtractError },
    #[error("crawl was cancelled")]
    Cancelled,
}
