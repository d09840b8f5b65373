//! Crawl progress state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CatalogItem;

/// Position of the next page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cursor {
    /// Item offset of the next page.
    Offset(u64),
    /// Opaque continuation token from the previous page.
    Token(String),
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Offset(0)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Offset(offset) => write!(f, "offset {}", offset),
            Cursor::Token(token) => write!(f, "token {}", token),
        }
    }
}

/// Progress of one crawl. Only successful pages move it forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    /// Pages merged so far.
    pub iteration_count: u64,
    /// Items seen across all pages, duplicates included.
    pub total_items_seen: u64,
    pub cursor: Cursor,
    pub has_more_data: bool,
    pub complete: bool,
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Server-supplied link for the next page, used instead of the base
    /// endpoint when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_endpoint: Option<String>,
    /// Page size the upstream actually serves, once it has reported one.
    /// Later requests ask for this size so page numbers line up with offsets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            iteration_count: 0,
            total_items_seen: 0,
            cursor: Cursor::default(),
            has_more_data: true,
            complete: false,
            last_timestamp: None,
            next_endpoint: None,
            page_size: None,
        }
    }
}

impl IterationState {
    /// Whether any page has been merged.
    pub fn is_started(&self) -> bool {
        self.iteration_count > 0
    }
}

/// Where a session is in its page cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Fetching,
    Merging,
    Complete,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlPhase::Idle => "idle",
            CrawlPhase::Fetching => "fetching",
            CrawlPhase::Merging => "merging",
            CrawlPhase::Complete => "complete",
        }
    }
}

/// Identifiers already harvested. Keys are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredItemSet {
    keys: HashSet<String>,
}

impl DiscoveredItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identifier. Returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.keys.insert(CatalogItem::key_for(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains(&CatalogItem::key_for(id))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Stored keys in sorted order.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().cloned().collect();
        keys.sort();
        keys
    }
}

impl<S: AsRef<str>> FromIterator<S> for DiscoveredItemSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_set_ignores_case() {
        let mut set = DiscoveredItemSet::new();
        assert!(set.insert("SKU-1"));
        assert!(!set.insert("sku-1"));
        assert!(set.insert("SKU-2"));
        assert!(set.contains("Sku-2"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_sorted_vec(), vec!["sku-1", "sku-2"]);
    }

    #[test]
    fn test_fresh_state() {
        let state = IterationState::default();
        assert_eq!(state.cursor, Cursor::Offset(0));
        assert!(state.has_more_data);
        assert!(!state.complete);
        assert!(!state.is_started());
    }

    #[test]
    fn test_cursor_serialization() {
        let json = serde_json::to_string(&Cursor::Token("abc".into())).unwrap();
        assert_eq!(json, r#"{"kind":"token","value":"abc"}"#);
        let back: Cursor = serde_json::from_str(r#"{"kind":"offset","value":40}"#).unwrap();
        assert_eq!(back, Cursor::Offset(40));
    }
}
