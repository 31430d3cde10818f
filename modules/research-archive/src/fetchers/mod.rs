//! Extraction methods: each turns a URL into an `ExtractedPage` or fails.

mod browserless;
mod chrome;
mod http;

pub use browserless::BrowserlessMethod;
pub use chrome::ChromeMethod;
pub use http::HttpMethod;

use research_common::ExtractedPage;
use tracing::{info, warn};

use crate::error::{ArchiveError, Result};
use crate::html::page_from_html;

/// Readability-convert fetched HTML, failing when nothing readable is left.
pub(crate) fn finish_page(method: &'static str, url: &str, html: &[u8]) -> Result<ExtractedPage> {
    if html.is_empty() {
        warn!(url, method, "Empty HTML response");
        return Err(ArchiveError::EmptyContent {
            method,
            url: url.to_string(),
        });
    }

    let page = page_from_html(html, url);
    if page.text.trim().is_empty() {
        warn!(url, method, "Empty content after Readability extraction");
        return Err(ArchiveError::EmptyContent {
            method,
            url: url.to_string(),
        });
    }

    info!(
        url,
        method,
        bytes = page.text.len(),
        tabular = page.has_tabular_data,
        "Extracted successfully"
    );
    Ok(page)
}
