use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use research_common::{ExtractedPage, ExtractionMethod};
use tracing::info;

use super::finish_page;
use crate::error::ArchiveError;

const NAME: &str = "browserless";

/// Fully-rendered HTML from a Browserless `/content` endpoint.
pub struct BrowserlessMethod {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessMethod {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        info!(base_url, "Using Browserless extraction");
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build Browserless HTTP client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => format!("{}/content?token={token}", self.base_url),
            None => format!("{}/content", self.base_url),
        }
    }
}

#[async_trait]
impl ExtractionMethod for BrowserlessMethod {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, url: &str) -> Result<ExtractedPage> {
        info!(url, method = NAME, "Fetching URL");

        let resp = self
            .client
            .post(self.endpoint())
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| ArchiveError::fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ArchiveError::fetch(url, format!("Browserless {status}: {message}")).into());
        }

        let html = resp.text().await.map_err(|e| ArchiveError::fetch(url, e))?;
        Ok(finish_page(NAME, url, html.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_token() {
        let m = BrowserlessMethod::new("http://browserless:3000/", Some("t0k"), Duration::from_secs(5)).unwrap();
        assert_eq!(m.endpoint(), "http://browserless:3000/content?token=t0k");
        let m = BrowserlessMethod::new("http://browserless:3000", None, Duration::from_secs(5)).unwrap();
        assert_eq!(m.endpoint(), "http://browserless:3000/content");
    }
}
