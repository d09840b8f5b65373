//! JSON page extractor driven by dotted paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::protocol::{
    ExtractError, ExtractedPage, PageExtractor, PageMetadata, PaginationDescriptor,
};
use crate::models::CatalogItem;

/// Where items and pagination live in a JSON response.
///
/// Paths use dot notation (`data.results`, `meta.page.total`); numeric
/// segments index arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Array of items on a collection page.
    pub results_path: String,
    /// Identifier field within each item.
    pub id_field: String,
    /// Detail URL field within each item.
    pub url_field: Option<String>,
    /// Object holding the offset pagination fields.
    pub pagination_path: String,
    pub offset_field: String,
    pub page_size_field: String,
    pub total_field: String,
    /// Next-page link inside the pagination object.
    pub next_field: String,
    /// Continuation token location. When set, offset fields are ignored.
    pub cursor_path: Option<String>,
    /// Item object within a detail response. Empty means the root.
    pub item_path: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            results_path: "items".to_string(),
            id_field: "id".to_string(),
            url_field: Some("url".to_string()),
            pagination_path: "pagination".to_string(),
            offset_field: "offset".to_string(),
            page_size_field: "page_size".to_string(),
            total_field: "total".to_string(),
            next_field: "next".to_string(),
            cursor_path: None,
            item_path: String::new(),
        }
    }
}

/// Extract a value from nested JSON using dot-notation path.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&Value::Null),
                Err(_) => &Value::Null,
            },
            _ => &Value::Null,
        };
    }

    current
}

/// Outcome of reading a numeric pagination field.
enum Numeric {
    Missing,
    Value(u64),
    Invalid,
}

/// Numbers and numeric strings are both accepted.
fn read_u64(value: &Value) -> Numeric {
    match value {
        Value::Null => Numeric::Missing,
        Value::Number(n) => n.as_u64().map_or(Numeric::Invalid, Numeric::Value),
        Value::String(s) => s.trim().parse().map_or(Numeric::Invalid, Numeric::Value),
        _ => Numeric::Invalid,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reference [`PageExtractor`] for JSON APIs.
#[derive(Debug, Clone, Default)]
pub struct JsonPageExtractor {
    settings: ExtractorSettings,
}

impl JsonPageExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    fn parse(body: &str) -> Result<Value, ExtractError> {
        serde_json::from_str(body).map_err(|e| ExtractError::Parse(e.to_string()))
    }

    fn item_from(&self, value: &Value) -> Option<CatalogItem> {
        let id = scalar_string(extract_path(value, &self.settings.id_field))?;
        let url = self
            .settings
            .url_field
            .as_deref()
            .and_then(|field| scalar_string(extract_path(value, field)));

        let mut item = CatalogItem::new(id).with_fields(value.clone());
        item.url = url;
        Some(item)
    }

    fn metadata(&self, data: &Value) -> PageMetadata {
        if let Some(cursor_path) = &self.settings.cursor_path {
            let total_count = match read_u64(extract_path(
                extract_path(data, &self.settings.pagination_path),
                &self.settings.total_field,
            )) {
                Numeric::Value(total) => Some(total),
                _ => None,
            };
            return match extract_path(data, cursor_path) {
                Value::Null => PageMetadata::Continuation {
                    token: None,
                    total_count,
                },
                Value::String(token) => PageMetadata::Continuation {
                    token: Some(token.clone()),
                    total_count,
                },
                other => PageMetadata::Malformed(format!(
                    "continuation token at '{}' is not a string: {}",
                    cursor_path, other
                )),
            };
        }

        let block = extract_path(data, &self.settings.pagination_path);
        if block.is_null() {
            return PageMetadata::Absent;
        }
        if !block.is_object() {
            return PageMetadata::Malformed(format!(
                "'{}' is not an object",
                self.settings.pagination_path
            ));
        }

        let offset = match read_u64(extract_path(block, &self.settings.offset_field)) {
            Numeric::Value(v) => v,
            Numeric::Missing => {
                return PageMetadata::Malformed(format!(
                    "missing '{}'",
                    self.settings.offset_field
                ))
            }
            Numeric::Invalid => {
                return PageMetadata::Malformed(format!(
                    "'{}' is not a number",
                    self.settings.offset_field
                ))
            }
        };
        let total_count = match read_u64(extract_path(block, &self.settings.total_field)) {
            Numeric::Value(v) => v,
            Numeric::Missing => {
                return PageMetadata::Malformed(format!("missing '{}'", self.settings.total_field))
            }
            Numeric::Invalid => {
                return PageMetadata::Malformed(format!(
                    "'{}' is not a number",
                    self.settings.total_field
                ))
            }
        };
        let page_size = match read_u64(extract_path(block, &self.settings.page_size_field)) {
            Numeric::Value(v) => u32::try_from(v).ok().filter(|size| *size > 0),
            Numeric::Missing => None,
            Numeric::Invalid => {
                return PageMetadata::Malformed(format!(
                    "'{}' is not a number",
                    self.settings.page_size_field
                ))
            }
        };
        let next_endpoint = scalar_string(extract_path(block, &self.settings.next_field));

        PageMetadata::Offset(PaginationDescriptor {
            offset,
            page_size,
            total_count,
            next_endpoint,
        })
    }
}

impl PageExtractor for JsonPageExtractor {
    fn extract_page(&self, body: &str) -> Result<ExtractedPage, ExtractError> {
        let data = Self::parse(body)?;

        let results = extract_path(&data, &self.settings.results_path)
            .as_array()
            .ok_or_else(|| ExtractError::MissingResults(self.settings.results_path.clone()))?;

        let mut items = Vec::with_capacity(results.len());
        for value in results {
            match self.item_from(value) {
                Some(item) => items.push(item),
                None => debug!(
                    "Skipping result without '{}' field",
                    self.settings.id_field
                ),
            }
        }

        Ok(ExtractedPage {
            items,
            metadata: self.metadata(&data),
        })
    }

    fn extract_item(&self, body: &str) -> Result<Option<CatalogItem>, ExtractError> {
        let data = Self::parse(body)?;
        let value = extract_path(&data, &self.settings.item_path);
        if value.is_null() {
            return Ok(None);
        }
        Ok(self.item_from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> JsonPageExtractor {
        JsonPageExtractor::default()
    }

    #[test]
    fn test_extract_path() {
        let data = json!({"data": {"results": [{"id": 1}, {"id": 2}]}});
        assert_eq!(extract_path(&data, "data.results.1.id"), &json!(2));
        assert!(extract_path(&data, "data.missing.id").is_null());
        assert_eq!(extract_path(&data, ""), &data);
    }

    #[test]
    fn test_offset_page() {
        let body = json!({
            "items": [
                {"id": "A1", "url": "/p/a1", "name": "Anvil"},
                {"id": 42, "name": "Numeric id"},
                {"name": "no id"}
            ],
            "pagination": {"offset": 0, "page_size": "20", "total": 22}
        })
        .to_string();

        let page = extractor().extract_page(&body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "A1");
        assert_eq!(page.items[0].url.as_deref(), Some("/p/a1"));
        assert_eq!(page.items[1].id, "42");
        assert_eq!(
            page.metadata,
            PageMetadata::Offset(PaginationDescriptor {
                offset: 0,
                page_size: Some(20),
                total_count: 22,
                next_endpoint: None,
            })
        );
    }

    #[test]
    fn test_metadata_absent_and_malformed() {
        let absent = extractor()
            .extract_page(&json!({"items": []}).to_string())
            .unwrap();
        assert_eq!(absent.metadata, PageMetadata::Absent);

        let bad_total = extractor()
            .extract_page(
                &json!({"items": [], "pagination": {"offset": 0, "total": "lots"}}).to_string(),
            )
            .unwrap();
        assert!(matches!(bad_total.metadata, PageMetadata::Malformed(_)));

        let missing_offset = extractor()
            .extract_page(&json!({"items": [], "pagination": {"total": 3}}).to_string())
            .unwrap();
        assert!(matches!(missing_offset.metadata, PageMetadata::Malformed(_)));
    }

    #[test]
    fn test_continuation_page() {
        let extractor = JsonPageExtractor::new(ExtractorSettings {
            results_path: "data".into(),
            cursor_path: Some("meta.next_cursor".into()),
            ..ExtractorSettings::default()
        });

        let page = extractor
            .extract_page(&json!({"data": [{"id": "x"}], "meta": {"next_cursor": "c2"}}).to_string())
            .unwrap();
        assert_eq!(
            page.metadata,
            PageMetadata::Continuation {
                token: Some("c2".into()),
                total_count: None
            }
        );

        let last = extractor
            .extract_page(&json!({"data": [], "meta": {"next_cursor": null}}).to_string())
            .unwrap();
        assert_eq!(
            last.metadata,
            PageMetadata::Continuation {
                token: None,
                total_count: None
            }
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            extractor().extract_page("<html>"),
            Err(ExtractError::Parse(_))
        ));
        assert_eq!(
            extractor().extract_page("{\"results\": []}"),
            Err(ExtractError::MissingResults("items".into()))
        );
    }

    #[test]
    fn test_extract_item() {
        let extractor = JsonPageExtractor::new(ExtractorSettings {
            item_path: "product".into(),
            ..ExtractorSettings::default()
        });
        let item = extractor
            .extract_item(&json!({"product": {"id": "B2", "name": "Bolt"}}).to_string())
            .unwrap()
            .unwrap();
        assert_eq!(item.id, "B2");
        assert_eq!(item.field_str("name"), Some("Bolt"));

        assert_eq!(extractor.extract_item("{}").unwrap(), None);
    }
}
