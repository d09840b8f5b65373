//! Sequential page-by-page crawl of one catalog collection.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{CrawlPhase, DiscoveredItemSet, IterationState};
use super::CrawlError;
use crate::discovery::{PageDiscovery, PageExtractor};
use crate::http_client::{FetchError, FetchOptions, HttpClient};
use crate::models::CatalogItem;

/// Outcome of one `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageReport {
    /// Iteration number of the merged page (1-based). Zero if nothing was fetched.
    pub page: u64,
    pub items_on_page: usize,
    pub new_items: usize,
    pub duplicates: usize,
    pub complete: bool,
}

/// One crawl over a paginated collection.
///
/// Pages are fetched strictly one after another. A failed page leaves the
/// state untouched so the same cursor is retried on the next `step()`.
pub struct CrawlSession {
    client: HttpClient,
    extractor: Arc<dyn PageExtractor>,
    discovery: PageDiscovery,
    endpoint: String,
    max_pages: Option<u64>,
    pub(super) state: IterationState,
    pub(super) discovered: DiscoveredItemSet,
    pub(super) phase: CrawlPhase,
    pub(super) harvested: Vec<CatalogItem>,
}

impl CrawlSession {
    /// New session crawling `endpoint` (relative to the client's base URL).
    pub fn new(client: HttpClient, extractor: Arc<dyn PageExtractor>, endpoint: &str) -> Self {
        let page_size = client.pagination().page_size;
        Self {
            client,
            extractor,
            discovery: PageDiscovery::new(page_size),
            endpoint: endpoint.to_string(),
            max_pages: None,
            state: IterationState::default(),
            discovered: DiscoveredItemSet::new(),
            phase: CrawlPhase::Idle,
            harvested: Vec::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.discovery = PageDiscovery::new(page_size);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<u64>) -> Self {
        self.set_max_pages(max_pages);
        self
    }

    /// Change the page cap. A session that stopped only because of the old
    /// cap becomes resumable again when the new cap allows more pages.
    pub fn set_max_pages(&mut self, max_pages: Option<u64>) {
        self.max_pages = max_pages;
        if self.state.complete
            && self.state.has_more_data
            && !self.page_cap_reached()
        {
            debug!(
                "Page cap raised to {:?}, crawl can continue from {}",
                max_pages, self.state.cursor
            );
            self.state.complete = false;
            self.phase = CrawlPhase::Idle;
        }
    }

    pub fn max_pages(&self) -> Option<u64> {
        self.max_pages
    }

    /// Items per page requested next: the size the upstream reported, or
    /// the configured size until it reports one.
    pub fn page_size(&self) -> u32 {
        self.state.page_size.unwrap_or(self.discovery.page_size())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn discovered(&self) -> &DiscoveredItemSet {
        &self.discovered
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Items harvested since the last `take_harvested()`, in discovery order.
    pub fn harvested(&self) -> &[CatalogItem] {
        &self.harvested
    }

    pub fn take_harvested(&mut self) -> Vec<CatalogItem> {
        std::mem::take(&mut self.harvested)
    }

    /// Back to a fresh crawl from the first page.
    pub fn reset(&mut self) {
        self.state = IterationState::default();
        self.discovered.clear();
        self.harvested.clear();
        self.phase = CrawlPhase::Idle;
    }

    fn page_cap_reached(&self) -> bool {
        self.max_pages
            .is_some_and(|max| self.state.iteration_count >= max)
    }

    /// Fetch and merge one page.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<PageReport, CrawlError> {
        if self.state.complete {
            return Ok(PageReport {
                page: 0,
                items_on_page: 0,
                new_items: 0,
                duplicates: 0,
                complete: true,
            });
        }

        self.phase = CrawlPhase::Fetching;
        let target = self
            .state
            .next_endpoint
            .clone()
            .unwrap_or_else(|| self.endpoint.clone());
        let options = FetchOptions::at(self.state.cursor.clone()).page_size(self.page_size());

        let body = match self.client.fetch(&target, &options, cancel).await.into_body() {
            Ok(body) => body,
            Err(FetchError::Cancelled) => {
                self.phase = CrawlPhase::Idle;
                return Err(CrawlError::Cancelled);
            }
            Err(e) => {
                self.phase = CrawlPhase::Idle;
                return Err(CrawlError::Fetch {
                    cursor: self.state.cursor.clone(),
                    source: e,
                });
            }
        };

        let page = match self.extractor.extract_page(&body) {
            Ok(page) => page,
            Err(e) => {
                self.phase = CrawlPhase::Idle;
                return Err(CrawlError::Extract {
                    cursor: self.state.cursor.clone(),
                    source: e,
                });
            }
        };

        self.phase = CrawlPhase::Merging;
        let items_on_page = page.items.len();
        let decision = self
            .discovery
            .evaluate(&page.metadata, items_on_page, &self.state.cursor);

        let mut new_items = 0;
        for item in page.items {
            if self.discovered.insert(&item.id) {
                self.harvested.push(item);
                new_items += 1;
            }
        }
        let duplicates = items_on_page - new_items;

        self.state.iteration_count += 1;
        self.state.total_items_seen += items_on_page as u64;
        self.state.last_timestamp = Some(Utc::now());
        if let Some(cursor) = decision.next_cursor {
            self.state.cursor = cursor;
        }
        self.state.next_endpoint = decision.next_endpoint;
        if let Some(size) = decision.page_size {
            if self.state.page_size != Some(size) && size != self.discovery.page_size() {
                debug!(
                    "Upstream serves {} items per page (asked for {})",
                    size,
                    self.discovery.page_size()
                );
            }
            self.state.page_size = Some(size);
        }
        self.state.has_more_data = !decision.complete;
        self.state.complete = decision.complete || self.page_cap_reached();

        self.phase = if self.state.complete {
            CrawlPhase::Complete
        } else {
            CrawlPhase::Idle
        };

        info!(
            "Page {}: {} items ({} new, {} duplicate), {} unique so far{}",
            self.state.iteration_count,
            items_on_page,
            new_items,
            duplicates,
            self.discovered.len(),
            if self.state.complete { ", done" } else { "" }
        );

        Ok(PageReport {
            page: self.state.iteration_count,
            items_on_page,
            new_items,
            duplicates,
            complete: self.state.complete,
        })
    }

    /// Step until complete. Returns the number of pages merged by this call.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<u64, CrawlError> {
        let mut pages = 0;
        while !self.state.complete {
            self.step(cancel).await?;
            pages += 1;
        }
        Ok(pages)
    }
}
