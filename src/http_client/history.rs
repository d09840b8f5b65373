//! Bounded request history for diagnostics.
//!
//! Every completed fetch is appended; once full, the oldest entry is evicted.
//! Nothing in the crawl depends on this buffer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::FetchResult;

/// Default number of retained history entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// One completed fetch.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&FetchResult> for RequestRecord {
    fn from(result: &FetchResult) -> Self {
        Self {
            url: result.url.clone(),
            success: result.success,
            status_code: result.status_code,
            duration_ms: result.duration_ms,
            retry_count: result.retry_count,
            error: result.error.as_ref().map(|e| e.to_string()),
            timestamp: result.timestamp,
        }
    }
}

/// Aggregate statistics over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub avg_duration_ms: f64,
}

/// Ring buffer of recent fetches.
#[derive(Debug)]
pub struct RequestHistory {
    capacity: usize,
    entries: Mutex<VecDeque<RequestRecord>>,
}

impl RequestHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, result: &FetchResult) {
        let mut entries = self.lock_entries();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(RequestRecord::from(result));
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        let entries = self.lock_entries();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RequestStats {
        let entries = self.lock_entries();
        if entries.is_empty() {
            return RequestStats::default();
        }

        let successes = entries.iter().filter(|r| r.success).count() as u64;
        let total_duration: u64 = entries.iter().map(|r| r.duration_ms).sum();
        RequestStats {
            total_requests: entries.len() as u64,
            successes,
            failures: entries.len() as u64 - successes,
            retries: entries.iter().map(|r| u64::from(r.retry_count)).sum(),
            avg_duration_ms: total_duration as f64 / entries.len() as f64,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<RequestRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
