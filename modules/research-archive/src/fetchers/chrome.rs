use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use research_common::{ExtractedPage, ExtractionMethod};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{info, warn};

use super::finish_page;
use crate::error::ArchiveError;

const NAME: &str = "chrome";

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS,
/// multiple child processes).
const MAX_CONCURRENT_CHROME: usize = 2;

/// Max attempts for transient Chrome failures (e.g. "Cannot fork").
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// Base backoff. Actual delay is base * 3^attempt + up to 1s jitter.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);

/// Headless Chromium `--dump-dom` for JS-rendered pages, then Readability.
///
/// `budget` covers every attempt and backoff for one URL. It starts once a
/// process slot is free, so time spent queued behind other pages is not
/// charged to it.
pub struct ChromeMethod {
    semaphore: Semaphore,
    chrome_bin: String,
    budget: Duration,
}

enum Attempt {
    Done(Vec<u8>),
    Retry(&'static str),
}

fn is_transient(message: &str) -> bool {
    message.contains("Cannot fork") || message.contains("Resource temporarily unavailable")
}

fn backoff(attempt: u32) -> Duration {
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    CHROME_RETRY_BASE * 3u32.pow(attempt) + jitter
}

impl ChromeMethod {
    pub fn new(chrome_bin: impl Into<String>, budget: Duration) -> Self {
        info!("Using Chrome extraction (dump-dom + Readability, max_concurrent={MAX_CONCURRENT_CHROME})");
        Self {
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
            chrome_bin: chrome_bin.into(),
            budget,
        }
    }

    async fn attempt(&self, url: &str, limit: Duration, is_last: bool) -> Result<Attempt> {
        let tmp_dir = tempfile::tempdir().context("Failed to create temp profile dir")?;

        let result = tokio::time::timeout(
            limit,
            tokio::process::Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    &format!("--user-data-dir={}", tmp_dir.path().display()),
                    "--dump-dom",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                if output.stdout.is_empty() && !is_last {
                    return Ok(Attempt::Retry("Chrome returned empty DOM"));
                }
                Ok(Attempt::Done(output.stdout))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if is_transient(&stderr) && !is_last {
                    return Ok(Attempt::Retry("Chrome cannot fork"));
                }
                warn!(url, method = NAME, stderr = %stderr, "Chrome exited with error");
                Err(ArchiveError::fetch(url, format!("Chrome exited with {}", output.status)).into())
            }
            Ok(Err(e)) => {
                if is_transient(&e.to_string()) && !is_last {
                    return Ok(Attempt::Retry("Chrome launch failed"));
                }
                Err(ArchiveError::fetch(url, format!("failed to run Chrome: {e}")).into())
            }
            Err(_) => {
                if !is_last {
                    return Ok(Attempt::Retry("Chrome timed out"));
                }
                Err(ArchiveError::fetch(
                    url,
                    format!("Chrome timed out after {:.1}s", limit.as_secs_f64()),
                )
                .into())
            }
        }
    }

    async fn run_chrome(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url).context("Invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only http/https URLs are allowed, got: {}", parsed.scheme());
        }

        let deadline = Instant::now() + self.budget;
        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let is_last = attempt + 1 == CHROME_MAX_ATTEMPTS;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.attempt(url, remaining, is_last).await? {
                Attempt::Done(html) => return Ok(html),
                Attempt::Retry(reason) => {
                    let delay = backoff(attempt);
                    if delay >= deadline.saturating_duration_since(Instant::now()) {
                        return Err(ArchiveError::fetch(
                            url,
                            format!(
                                "{reason}, no retry fits in the {}s budget",
                                self.budget.as_secs_f64()
                            ),
                        )
                        .into());
                    }
                    warn!(
                        url,
                        attempt = attempt + 1,
                        backoff_ms = delay.as_millis() as u64,
                        "{reason}, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl ExtractionMethod for ChromeMethod {
    fn name(&self) -> &str {
        NAME
    }

    fn bounds_own_time(&self) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<ExtractedPage> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Chrome semaphore closed"))?;

        info!(url, method = NAME, "Fetching URL");

        let html = self.run_chrome(url).await?;
        Ok(finish_page(NAME, url, &html)?)
    }
}
