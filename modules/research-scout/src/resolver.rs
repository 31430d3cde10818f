use std::sync::Arc;
use std::time::Duration;

use research_common::{Clock, QueryUrlMapping, SearchConfig, SearchProvider};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Search-provider front: enforces the minimum delay between requests and
/// retries with linear backoff. Exhaustion yields no URLs, never an error.
pub struct UrlResolver {
    provider: Arc<dyn SearchProvider>,
    clock: Arc<dyn Clock>,
    config: SearchConfig,
    /// Monotonic time of the last provider call. Held across the wait + call
    /// so two resolves never issue requests closer than the delay.
    last_request: Mutex<Option<Duration>>,
}

impl UrlResolver {
    pub fn new(provider: Arc<dyn SearchProvider>, clock: Arc<dyn Clock>, config: SearchConfig) -> Self {
        Self {
            provider,
            clock,
            config,
            last_request: Mutex::new(None),
        }
    }

    /// Up to `num` URLs for `query`, recorded in `mapping` against it.
    pub async fn resolve(&self, query: &str, num: usize, mapping: &mut QueryUrlMapping) -> Vec<String> {
        let max_retries = self.config.max_retries.max(1);
        let delay = self.config.request_delay();

        for attempt in 1..=max_retries {
            match self.request(query, num).await {
                Ok(urls) if !urls.is_empty() => {
                    info!(query, count = urls.len(), "URLs found");
                    for (i, url) in urls.iter().enumerate() {
                        info!(query, index = i + 1, url = url.as_str(), "URL");
                        mapping.record(url.as_str(), query);
                    }
                    return urls;
                }
                Ok(_) => {
                    warn!(query, attempt, max = max_retries, "Search returned no results");
                }
                Err(e) => {
                    error!(query, attempt, max = max_retries, error = %e, "Search attempt failed");
                    if attempt < max_retries {
                        let backoff = delay * attempt;
                        info!(query, backoff_secs = backoff.as_secs_f64(), "Retrying search after backoff");
                        self.clock.sleep(backoff).await;
                    }
                }
            }
        }

        error!(query, "All search attempts failed");
        Vec::new()
    }

    async fn request(&self, query: &str, num: usize) -> anyhow::Result<Vec<String>> {
        let mut last = self.last_request.lock().await;
        let delay = self.config.request_delay();

        if let Some(previous) = *last {
            let elapsed = self.clock.now().saturating_sub(previous);
            if elapsed < delay {
                let wait = delay - elapsed;
                info!(sleep_secs = wait.as_secs_f64(), "Rate limiting search");
                self.clock.sleep(wait).await;
            }
        }

        let result = self.provider.search(query, num, self.config.pause()).await;
        *last = Some(self.clock.now());
        result
    }
}
