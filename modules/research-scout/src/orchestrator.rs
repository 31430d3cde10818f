// Run orchestration: EXPAND → per query { RESOLVE → FETCH → SUMMARIZE } → AGGREGATE.
//
// A run always completes. Per-URL and per-summary failures are counted in
// the stats; only startup (building the components) can fail.

use std::sync::Arc;

use ai_client::truncate_to_char_boundary;
use research_common::{
    Clock, FetchedPage, QueryUrlMapping, ResultStatus, RunConfig, SearchQuery, WebSearchResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::expander::QueryExpander;
use crate::fetcher::{ContentFetcher, FetchOutcome};
use crate::resolver::UrlResolver;
use crate::stats::{QueryStats, RunStats};
use crate::summarizer::{Summarizer, SummaryOutcome};

/// The slice of `RunConfig` the orchestrator itself needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub urls_per_query: usize,
    pub content_max_length: usize,
    pub max_concurrent_requests: usize,
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            urls_per_query: config.urls_per_query,
            content_max_length: config.content_max_length,
            max_concurrent_requests: config.max_concurrent_requests,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub queries: Vec<SearchQuery>,
    /// Successful results in query order, then URL order.
    pub results: Vec<WebSearchResult>,
    /// URLs that exhausted every method, with per-method reasons.
    pub failed_fetches: Vec<FetchOutcome>,
    pub mapping: QueryUrlMapping,
    pub stats: RunStats,
}

pub struct Orchestrator {
    expander: QueryExpander,
    resolver: UrlResolver,
    fetcher: ContentFetcher,
    summarizer: Option<Summarizer>,
    settings: RunSettings,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        expander: QueryExpander,
        resolver: UrlResolver,
        fetcher: ContentFetcher,
        summarizer: Option<Summarizer>,
        settings: RunSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            expander,
            resolver,
            fetcher,
            summarizer,
            settings,
            clock,
        }
    }

    pub async fn run(&self, base_query: &str, cancel: &CancellationToken) -> RunReport {
        info!(query = base_query, "Starting research run");

        let queries = self.expander.expand(base_query).await;
        info!(original = base_query, total = queries.len(), "Search process starting");

        let mut mapping = QueryUrlMapping::default();
        let mut results = Vec::new();
        let mut failed_fetches = Vec::new();
        let mut stats = RunStats {
            base_query: base_query.to_string(),
            ..Default::default()
        };

        for (idx, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = queries.len() - idx, "Run cancelled, skipping remaining queries");
                stats.cancelled = true;
                break;
            }
            info!(index = idx + 1, total = queries.len(), query = %query, "Processing query");

            let urls = self
                .resolver
                .resolve(&query.text, self.settings.urls_per_query, &mut mapping)
                .await;

            let mut pages = Vec::with_capacity(urls.len());
            for outcome in self.fetcher.fetch_all(&urls, &mapping, cancel).await {
                match outcome {
                    FetchOutcome::Fetched(page) => pages.push(page),
                    failed => failed_fetches.push(failed),
                }
            }

            let summaries = self.summarize_all(&pages, cancel).await;
            for outcome in summaries.iter().flatten() {
                if outcome.defaulted {
                    stats.summaries_defaulted += 1;
                } else {
                    stats.summaries_generated += 1;
                }
            }

            let query_stats = QueryStats {
                query: query.text.clone(),
                urls_found: urls.len(),
                succeeded: pages.len(),
                failed: urls.len() - pages.len(),
                results: 0,
            };
            info!(
                query = %query,
                urls_processed = query_stats.urls_found,
                successful = query_stats.succeeded,
                failed = query_stats.failed,
                "Query results summary"
            );
            stats.queries.push(query_stats);

            results.extend(
                pages
                    .into_iter()
                    .zip(summaries)
                    .map(|(page, summary)| self.to_result(page, summary)),
            );
        }

        for q in &mut stats.queries {
            q.results = results
                .iter()
                .filter(|r| mapping.query_for(&r.url) == Some(q.query.as_str()))
                .count();
        }

        info!(
            queries = stats.queries.len(),
            urls = stats.processed(),
            successful = stats.succeeded(),
            failed = stats.failed(),
            "Final search summary"
        );
        for q in &stats.queries {
            info!(query = q.query.as_str(), results = q.results, "Results by query");
        }

        RunReport {
            queries,
            results,
            failed_fetches,
            mapping,
            stats,
        }
    }

    /// One entry per page, in page order. `None` when summarisation is off or
    /// the run was cancelled before the page's batch started. Batches hold at
    /// most `max_concurrent_requests` pages.
    async fn summarize_all(&self, pages: &[FetchedPage], cancel: &CancellationToken) -> Vec<Option<SummaryOutcome>> {
        let Some(summarizer) = &self.summarizer else {
            return vec![None; pages.len()];
        };
        let mut outcomes = Vec::with_capacity(pages.len());
        for chunk in pages.chunks(self.settings.max_concurrent_requests.max(1)) {
            if cancel.is_cancelled() {
                outcomes.resize(pages.len(), None);
                break;
            }
            outcomes.extend(summarizer.summarize_batch(chunk).await.into_iter().map(Some));
        }
        outcomes
    }

    fn to_result(&self, page: FetchedPage, summary: Option<SummaryOutcome>) -> WebSearchResult {
        let content = truncate_to_char_boundary(&page.content.text, self.settings.content_max_length);
        WebSearchResult {
            url: page.url,
            title: page.title,
            content: content.to_string(),
            timestamp: self.clock.wall_now(),
            status: ResultStatus::Success,
            summary: summary.map(|s| s.summary),
            agent_id: Uuid::new_v4().to_string(),
            extraction_method: page.extraction_method,
        }
    }
}
