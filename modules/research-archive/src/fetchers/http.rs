use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use research_common::{ExtractedPage, ExtractionMethod};
use tracing::info;

use super::finish_page;
use crate::error::ArchiveError;

const NAME: &str = "http";

/// Plain GET with the configured headers, then Readability.
pub struct HttpMethod {
    client: reqwest::Client,
}

impl HttpMethod {
    pub fn new(headers: &BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {name}"))?;
            let header_value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {name}"))?;
            default_headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

/// HTML, XHTML and XML can be read. A missing content type is given a chance.
fn is_readable(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        }
    }
}

#[async_trait]
impl ExtractionMethod for HttpMethod {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, url: &str) -> Result<ExtractedPage> {
        info!(url, method = NAME, "Fetching URL");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::fetch(url, format!("HTTP {status}")).into());
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_readable(content_type.as_deref()) {
            return Err(ArchiveError::fetch(
                url,
                format!("unsupported content type {}", content_type.unwrap_or_default()),
            )
            .into());
        }

        let body = resp.bytes().await.map_err(|e| ArchiveError::fetch(url, e))?;
        Ok(finish_page(NAME, url, &body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_content_types() {
        assert!(is_readable(Some("text/html; charset=utf-8")));
        assert!(is_readable(Some("application/xhtml+xml")));
        assert!(is_readable(None));
        assert!(!is_readable(Some("application/pdf")));
        assert!(!is_readable(Some("image/png")));
    }

    #[test]
    fn rejects_invalid_header_names() {
        let headers = BTreeMap::from([("Bad Header".to_string(), "x".to_string())]);
        assert!(HttpMethod::new(&headers, Duration::from_secs(1)).is_err());
    }
}
