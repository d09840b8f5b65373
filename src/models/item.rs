//! Catalog item model.

use serde::{Deserialize, Serialize};

/// One harvested catalog record.
///
/// The harvester only relies on `id`; everything else the extractor found is
/// kept verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Upstream identifier. Deduplication compares it case-insensitively.
    pub id: String,
    /// Canonical detail URL, when the listing provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            fields: serde_json::Value::Null,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = fields;
        self
    }

    /// Key used for deduplication and cache lookups.
    pub fn dedup_key(&self) -> String {
        Self::key_for(&self.id)
    }

    pub fn key_for(id: &str) -> String {
        id.to_lowercase()
    }

    /// Look up a top-level field as a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedup_key_is_case_insensitive() {
        assert_eq!(
            CatalogItem::new("SKU-001").dedup_key(),
            CatalogItem::new("sku-001").dedup_key()
        );
        assert_ne!(
            CatalogItem::new("sku-001").dedup_key(),
            CatalogItem::new("sku-001 ").dedup_key()
        );
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let item: CatalogItem = serde_json::from_value(json!({"id": "p1"})).unwrap();
        assert_eq!(item, CatalogItem::new("p1"));
    }

    #[test]
    fn test_field_str() {
        let item = CatalogItem::new("p1").with_fields(json!({"name": "Hammer", "price": 12}));
        assert_eq!(item.field_str("name"), Some("Hammer"));
        assert_eq!(item.field_str("price"), None);
    }
}
