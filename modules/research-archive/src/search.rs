// Serper (Google Search) provider.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use research_common::SearchProvider;
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Serper returns at most this many organic results per page.
const PAGE_SIZE: usize = 10;

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
}

#[derive(Debug, serde::Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    page: usize,
}

pub struct SerperSearch {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Serper HTTP client")?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: SERPER_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn page(&self, query: &str, num: usize, page: usize) -> Result<Vec<String>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, num, page })
            .send()
            .await
            .map_err(|e| ArchiveError::Search(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArchiveError::Search(format!("Serper returned {status}: {body}")));
        }

        let data: SerperResponse = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Search(format!("invalid response: {e}")))?;

        Ok(data
            .organic
            .into_iter()
            .map(|r| r.link)
            .filter(|link| !link.is_empty())
            .collect())
    }
}

/// Pages needed for `num` results, each with its requested size.
fn page_plan(num: usize) -> Vec<(usize, usize)> {
    (0..num.div_ceil(PAGE_SIZE))
        .map(|i| (i + 1, (num - i * PAGE_SIZE).min(PAGE_SIZE)))
        .collect()
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str, num: usize, pause: Duration) -> anyhow::Result<Vec<String>> {
        info!(query, num, "Serper search");

        let mut urls: Vec<String> = Vec::with_capacity(num);
        for (i, (page, size)) in page_plan(num).into_iter().enumerate() {
            if i > 0 {
                debug!(query, page, pause_ms = pause.as_millis() as u64, "Pausing between result pages");
                tokio::time::sleep(pause).await;
            }
            let links = self.page(query, size, page).await?;
            let exhausted = links.len() < size;
            for link in links {
                if !urls.contains(&link) {
                    urls.push(link);
                }
            }
            if exhausted {
                break;
            }
        }
        urls.truncate(num);

        info!(query, count = urls.len(), "Serper search complete");
        Ok(urls)
    }
}
