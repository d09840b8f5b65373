//! Page discovery: interpreting a page body and deciding whether more pages
//! remain.
//!
//! Extraction sits behind [`PageExtractor`] so callers can plug in whatever
//! parsing the upstream needs. [`JsonPageExtractor`] covers JSON APIs.

mod json;
mod protocol;

pub use json::{extract_path, ExtractorSettings, JsonPageExtractor};
pub use protocol::{
    ExtractError, ExtractedPage, PageDecision, PageDiscovery, PageExtractor, PageMetadata,
    PaginationDescriptor,
};
