use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Queries
// =============================================================================

/// An expanded search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    /// True when a recency suffix was appended by the expander.
    pub time_enriched: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time_enriched: false,
        }
    }

    pub fn enriched(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time_enriched: true,
        }
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// URL → originating query. The last query to surface a URL owns it.
#[derive(Debug, Clone, Default)]
pub struct QueryUrlMapping {
    inner: HashMap<String, String>,
}

impl QueryUrlMapping {
    pub fn record(&mut self, url: impl Into<String>, query: impl Into<String>) {
        self.inner.insert(url.into(), query.into());
    }

    pub fn query_for(&self, url: &str) -> Option<&str> {
        self.inner.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

// =============================================================================
// Pages
// =============================================================================

/// What one extraction method produced for a URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
    pub has_tabular_data: bool,
}

/// Extracted text plus the tabular-data flag that frames summarisation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub text: String,
    pub has_tabular_data: bool,
}

impl PageContent {
    pub fn content_type_hint(&self) -> &'static str {
        if self.has_tabular_data {
            "Contains tables/charts"
        } else {
            "Text only"
        }
    }
}

/// A URL that some method extracted successfully. Text is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub content: PageContent,
    pub extraction_method: String,
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Failed => "failed",
        }
    }
}

/// One output record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    pub agent_id: String,
    pub extraction_method: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_query_wins_for_a_url() {
        let mut mapping = QueryUrlMapping::default();
        mapping.record("https://a.example", "first");
        mapping.record("https://a.example", "second");
        assert_eq!(mapping.query_for("https://a.example"), Some("second"));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn result_serialises_status_lowercase_and_skips_empty_summary() {
        let result = WebSearchResult {
            url: "https://a.example".into(),
            title: "A".into(),
            content: "body".into(),
            timestamp: DateTime::parse_from_rfc3339("2026-10-14T09:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            status: ResultStatus::Success,
            summary: None,
            agent_id: "id".into(),
            extraction_method: "http".into(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["timestamp"], "2026-10-14T09:30:00Z");
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn content_type_hint() {
        let page = PageContent {
            text: "x".into(),
            has_tabular_data: true,
        };
        assert_eq!(page.content_type_hint(), "Contains tables/charts");
    }
}
