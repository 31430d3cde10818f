// Result persistence. The JSON file is the durable record; the database is a
// best-effort secondary sink whose failures are reported, never propagated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use research_common::{SummaryStore, WebSearchResult};
use tracing::{error, info, warn};

/// What happened to the database copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseOutcome {
    Inserted(u64),
    /// Connection test failed.
    Unavailable,
    Failed(String),
    /// No store configured.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub records: usize,
    pub database: DatabaseOutcome,
}

/// `<dir>/results_<YYYYmmdd_HHMMSS>.json`
pub fn default_output_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("results_{}.json", now.format("%Y%m%d_%H%M%S")))
}

/// Read back a results file as written by `ResultSink::save`.
pub fn load_results(path: &Path) -> Result<Vec<WebSearchResult>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid results file {}", path.display()))
}

pub struct ResultSink {
    store: Option<Arc<dyn SummaryStore>>,
}

impl ResultSink {
    pub fn new(store: Option<Arc<dyn SummaryStore>>) -> Self {
        Self { store }
    }

    pub fn file_only() -> Self {
        Self { store: None }
    }

    /// Write `results` to `path` (creating directories), then try the database.
    /// Only the file write can fail.
    pub async fn save(&self, results: &[WebSearchResult], path: &Path) -> Result<SaveReport> {
        log_article_details(results);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(results).context("Failed to serialize results")?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), records = results.len(), "Results saved to file");

        let database = self.save_to_database(results).await;
        Ok(SaveReport {
            path: path.to_path_buf(),
            records: results.len(),
            database,
        })
    }

    async fn save_to_database(&self, results: &[WebSearchResult]) -> DatabaseOutcome {
        let Some(store) = &self.store else {
            return DatabaseOutcome::Disabled;
        };
        if !store.test_connection().await {
            error!("Database connection test failed");
            return DatabaseOutcome::Unavailable;
        }
        info!("Database connection successful");

        match store.insert_article_summaries(results).await {
            Ok(rows) => {
                info!(rows, "Inserted article summaries into database");
                DatabaseOutcome::Inserted(rows)
            }
            Err(e) => {
                error!(error = %e, "Database error");
                DatabaseOutcome::Failed(e.to_string())
            }
        }
    }
}

fn field<'a>(summary: &'a serde_json::Value, key: &str) -> &'a str {
    summary
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Not available")
}

fn log_article_details(results: &[WebSearchResult]) {
    info!(count = results.len(), "=== ARTICLE SUMMARIES ===");
    for result in results {
        let Some(summary) = &result.summary else {
            continue;
        };
        let key_points = summary
            .get("key_points")
            .and_then(serde_json::Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        let pretty = serde_json::to_string_pretty(summary).unwrap_or_else(|e| {
            warn!(url = result.url.as_str(), error = %e, "Unprintable summary");
            String::new()
        });

        info!(
            url = result.url.as_str(),
            title = result.title.as_str(),
            method = result.extraction_method.as_str(),
            summary = field(summary, "summary"),
            key_points = key_points.as_str(),
            market_impact = field(summary, "market_impact"),
            trading_implications = field(summary, "trading_implications"),
            "Article details"
        );
        tracing::debug!(url = result.url.as_str(), summary = pretty.as_str(), "Full summary");
    }
}
