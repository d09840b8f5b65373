//! Query parameters that carry the pagination cursor to the upstream.

use serde::{Deserialize, Serialize};

use crate::crawl::Cursor;

/// How the upstream expects pagination to be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    /// `?page=N&page_size=M`
    #[default]
    Page,
    /// `?offset=N&page_size=M`
    Offset,
    /// `?cursor=TOKEN&page_size=M`, no cursor on the first page
    Cursor,
}

/// Pagination query parameter names and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationParams {
    pub style: PaginationStyle,
    pub page_param: String,
    pub page_size_param: String,
    pub offset_param: String,
    pub cursor_param: String,
    pub page_size: u32,
    /// Number of the first page for `Page` style (usually 0 or 1).
    pub first_page: u64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            style: PaginationStyle::Page,
            page_param: "page".to_string(),
            page_size_param: "page_size".to_string(),
            offset_param: "offset".to_string(),
            cursor_param: "cursor".to_string(),
            page_size: 20,
            first_page: 1,
        }
    }
}

impl PaginationParams {
    /// Query pairs for fetching at `cursor` with `page_size` items per page.
    /// Without a cursor (detail pages) no pagination parameters are sent.
    ///
    /// A continuation token always goes in `cursor_param`, whatever the style.
    pub fn query_pairs(&self, cursor: Option<&Cursor>, page_size: u32) -> Vec<(String, String)> {
        let Some(cursor) = cursor else {
            return Vec::new();
        };
        let page_size = page_size.max(1);
        let mut pairs = Vec::with_capacity(2);

        match cursor {
            Cursor::Token(token) => {
                pairs.push((self.cursor_param.clone(), token.clone()));
            }
            Cursor::Offset(offset) => match self.style {
                PaginationStyle::Page => {
                    let page = offset / u64::from(page_size) + self.first_page;
                    pairs.push((self.page_param.clone(), page.to_string()));
                }
                PaginationStyle::Offset => {
                    pairs.push((self.offset_param.clone(), offset.to_string()));
                }
                PaginationStyle::Cursor => {}
            },
        }

        pairs.push((self.page_size_param.clone(), page_size.to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(params: &PaginationParams, cursor: Cursor, size: u32) -> Vec<(String, String)> {
        params.query_pairs(Some(&cursor), size)
    }

    fn kv(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_page_style_converts_offset_to_page_number() {
        let params = PaginationParams::default();
        assert_eq!(
            pairs(&params, Cursor::Offset(0), 20),
            vec![kv("page", "1"), kv("page_size", "20")]
        );
        assert_eq!(
            pairs(&params, Cursor::Offset(40), 20),
            vec![kv("page", "3"), kv("page_size", "20")]
        );

        let zero_based = PaginationParams {
            first_page: 0,
            ..PaginationParams::default()
        };
        assert_eq!(pairs(&zero_based, Cursor::Offset(20), 20)[0], kv("page", "1"));
    }

    #[test]
    fn test_no_cursor_sends_nothing() {
        assert!(PaginationParams::default().query_pairs(None, 20).is_empty());
    }

    #[test]
    fn test_offset_style() {
        let params = PaginationParams {
            style: PaginationStyle::Offset,
            ..PaginationParams::default()
        };
        assert_eq!(
            pairs(&params, Cursor::Offset(60), 20),
            vec![kv("offset", "60"), kv("page_size", "20")]
        );
    }

    #[test]
    fn test_cursor_style_omits_cursor_on_first_page() {
        let params = PaginationParams {
            style: PaginationStyle::Cursor,
            ..PaginationParams::default()
        };
        assert_eq!(
            pairs(&params, Cursor::Offset(0), 50),
            vec![kv("page_size", "50")]
        );
        assert_eq!(
            pairs(&params, Cursor::Token("abc".into()), 50),
            vec![kv("cursor", "abc"), kv("page_size", "50")]
        );
    }
}
