use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ExtractedPage, WebSearchResult};

/// Web search backend returning result URLs in rank order.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// `pause` is the provider-side delay between result pages.
    async fn search(&self, query: &str, num: usize, pause: Duration) -> Result<Vec<String>>;
}

/// One strategy for turning a URL into text.
#[async_trait]
pub trait ExtractionMethod: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, url: &str) -> Result<ExtractedPage>;

    /// `true` when `fetch` enforces its own time budget, started after any
    /// internal queueing. Callers must not wrap such methods in a timeout.
    fn bounds_own_time(&self) -> bool {
        false
    }
}

/// Secondary persistence for results.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn test_connection(&self) -> bool;
    /// Returns the number of rows written.
    async fn insert_article_summaries(&self, records: &[WebSearchResult]) -> Result<u64>;
}

/// Time source. Injected so rate limits and backoff can be tested.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;
    fn wall_now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
