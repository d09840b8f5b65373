//! Pagination completion decisions.

use tracing::{debug, warn};

use crate::crawl::Cursor;
use crate::models::CatalogItem;

/// Offset pagination block reported by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationDescriptor {
    /// Offset of the first item on this page.
    pub offset: u64,
    /// Page size the server used, when reported.
    pub page_size: Option<u32>,
    pub total_count: u64,
    /// Server-supplied URL for the next page.
    pub next_endpoint: Option<String>,
}

/// What a page said about pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMetadata {
    /// No pagination information on the page.
    Absent,
    /// Pagination block present but unusable.
    Malformed(String),
    Offset(PaginationDescriptor),
    /// Opaque continuation token; `None` or empty ends the crawl.
    Continuation {
        token: Option<String>,
        total_count: Option<u64>,
    },
}

/// Items plus pagination metadata extracted from one page body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub items: Vec<CatalogItem>,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("response is not valid JSON: {0}")]
    Parse(String),
    #[error("no results array at '{0}'")]
    MissingResults(String),
}

/// Turns a page body into items and pagination metadata.
///
/// Implementations decide what to extract; the crawl loop only relies on
/// item identifiers and the metadata.
pub trait PageExtractor: Send + Sync {
    /// Parse a collection page.
    fn extract_page(&self, body: &str) -> Result<ExtractedPage, ExtractError>;

    /// Parse a single-item detail page. `Ok(None)` means the body holds no item.
    fn extract_item(&self, body: &str) -> Result<Option<CatalogItem>, ExtractError>;
}

/// Decision after merging one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDecision {
    pub complete: bool,
    /// Cursor for the next page. `None` when complete.
    pub next_cursor: Option<Cursor>,
    pub next_endpoint: Option<String>,
    /// Page size the server reported, to be requested from now on.
    pub page_size: Option<u32>,
}

impl PageDecision {
    fn complete() -> Self {
        Self {
            complete: true,
            next_cursor: None,
            next_endpoint: None,
            page_size: None,
        }
    }
}

/// Decides whether more pages remain and where the next one starts.
#[derive(Debug, Clone, Copy)]
pub struct PageDiscovery {
    page_size: u32,
}

impl PageDiscovery {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// True once this page reaches the reported total.
    pub fn is_complete(descriptor: &PaginationDescriptor, items_on_page: usize) -> bool {
        descriptor.offset.saturating_add(items_on_page as u64) >= descriptor.total_count
    }

    /// Evaluate a page's metadata. Missing or malformed metadata ends the crawl.
    pub fn evaluate(
        &self,
        metadata: &PageMetadata,
        items_on_page: usize,
        current: &Cursor,
    ) -> PageDecision {
        match metadata {
            PageMetadata::Absent => {
                debug!("No pagination metadata, treating crawl as complete");
                PageDecision::complete()
            }
            PageMetadata::Malformed(reason) => {
                warn!(
                    "Malformed pagination metadata ({}), treating crawl as complete",
                    reason
                );
                PageDecision::complete()
            }
            PageMetadata::Offset(descriptor) => {
                if Self::is_complete(descriptor, items_on_page) {
                    return PageDecision::complete();
                }
                let reported = descriptor.page_size.filter(|size| *size > 0);
                let step = reported.unwrap_or(self.page_size);
                PageDecision {
                    complete: false,
                    next_cursor: Some(Cursor::Offset(
                        descriptor.offset.saturating_add(u64::from(step)),
                    )),
                    next_endpoint: descriptor.next_endpoint.clone(),
                    page_size: reported,
                }
            }
            PageMetadata::Continuation { token, .. } => match token.as_deref() {
                None | Some("") => PageDecision::complete(),
                Some(token) if matches!(current, Cursor::Token(t) if t == token) => {
                    warn!(
                        "Continuation token '{}' repeated, treating crawl as complete",
                        token
                    );
                    PageDecision::complete()
                }
                Some(token) => PageDecision {
                    complete: false,
                    next_cursor: Some(Cursor::Token(token.to_string())),
                    next_endpoint: None,
                    page_size: None,
                },
            },
        }
    }
}
