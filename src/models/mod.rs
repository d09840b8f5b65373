//! Data models for the catalog harvester.

mod item;

pub use item::CatalogItem;
