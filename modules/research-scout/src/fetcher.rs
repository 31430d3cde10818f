use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use research_common::{
    Clock, ExtractedPage, ExtractionMethod, FetchedPage, PageContent, QueryUrlMapping,
};
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Why one method did not produce content for a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodFailure {
    pub method: String,
    pub reason: String,
}

/// Per-URL result of the method cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(FetchedPage),
    Failed { url: String, failures: Vec<MethodFailure> },
}

impl FetchOutcome {
    pub fn url(&self) -> &str {
        match self {
            FetchOutcome::Fetched(page) => &page.url,
            FetchOutcome::Failed { url, .. } => url,
        }
    }

    pub fn page(&self) -> Option<&FetchedPage> {
        match self {
            FetchOutcome::Fetched(page) => Some(page),
            FetchOutcome::Failed { .. } => None,
        }
    }

    pub fn into_page(self) -> Option<FetchedPage> {
        match self {
            FetchOutcome::Fetched(page) => Some(page),
            FetchOutcome::Failed { .. } => None,
        }
    }
}

/// Tries each extraction method in priority order; the first non-empty text wins.
/// `timeout` bounds each attempt, except for methods that bound their own time.
pub struct ContentFetcher {
    methods: Vec<Arc<dyn ExtractionMethod>>,
    max_concurrent: usize,
    timeout: Duration,
    pause: Duration,
    clock: Arc<dyn Clock>,
}

impl ContentFetcher {
    /// Select `order` from the registered methods. Unregistered names are
    /// skipped; an empty selection is a startup error.
    pub fn new(
        registered: Vec<Arc<dyn ExtractionMethod>>,
        order: &[String],
        max_concurrent: usize,
        timeout: Duration,
        pause: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut methods = Vec::with_capacity(order.len());
        for name in order {
            match registered.iter().find(|m| m.name() == name) {
                Some(method) => methods.push(method.clone()),
                None => warn!(method = name.as_str(), "Extraction method not available, skipping"),
            }
        }
        if methods.is_empty() {
            bail!("No usable extraction method among {order:?}");
        }

        info!(
            methods = ?methods.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
            max_concurrent,
            "Content fetcher ready"
        );

        Ok(Self {
            methods,
            max_concurrent: max_concurrent.max(1),
            timeout,
            pause,
            clock,
        })
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    /// One outcome per URL, in URL order.
    pub async fn fetch_all(
        &self,
        urls: &[String],
        mapping: &QueryUrlMapping,
        cancel: &CancellationToken,
    ) -> Vec<FetchOutcome> {
        stream::iter(urls)
            .map(|url| self.fetch(url, mapping, cancel))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    pub async fn fetch(&self, url: &str, mapping: &QueryUrlMapping, cancel: &CancellationToken) -> FetchOutcome {
        let query = mapping.query_for(url).unwrap_or("Unknown query");
        info!(url, query, "Processing URL");

        let mut failures = Vec::new();
        for (i, method) in self.methods.iter().enumerate() {
            if cancel.is_cancelled() {
                failures.push(MethodFailure {
                    method: method.name().to_string(),
                    reason: "run cancelled".to_string(),
                });
                break;
            }
            if i > 0 && !self.pause.is_zero() {
                self.clock.sleep(self.pause).await;
            }

            let name = method.name();
            info!(url, method = name, "Trying extraction method");

            let fetched: Result<Result<ExtractedPage>, Elapsed> = if method.bounds_own_time() {
                Ok(method.fetch(url).await)
            } else {
                tokio::time::timeout(self.timeout, method.fetch(url)).await
            };
            let reason = match fetched {
                Ok(Ok(page)) if !page.text.trim().is_empty() => {
                    let content = PageContent {
                        text: page.text,
                        has_tabular_data: page.has_tabular_data,
                    };
                    info!(url, method = name, content_type = content.content_type_hint(), "Extraction succeeded");
                    return FetchOutcome::Fetched(FetchedPage {
                        url: url.to_string(),
                        title: if page.title.trim().is_empty() {
                            url.to_string()
                        } else {
                            page.title
                        },
                        content,
                        extraction_method: name.to_string(),
                    });
                }
                Ok(Ok(_)) => "empty content".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", self.timeout.as_secs_f64()),
            };

            warn!(url, method = name, reason = reason.as_str(), "Extraction method failed");
            failures.push(MethodFailure {
                method: name.to_string(),
                reason,
            });
        }

        error!(url, attempts = failures.len(), "All extraction methods failed");
        FetchOutcome::Failed {
            url: url.to_string(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClock, QueuedMethod, ScriptedMethod};

    fn fetcher(methods: Vec<Arc<dyn ExtractionMethod>>, order: &[&str], clock: Arc<MockClock>) -> ContentFetcher {
        let order: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        ContentFetcher::new(
            methods,
            &order,
            4,
            Duration::from_secs(5),
            Duration::from_millis(100),
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn falls_through_to_the_next_method() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(ScriptedMethod::new("http").fail("https://a.example", "403 Forbidden"));
        let chrome = Arc::new(ScriptedMethod::new("chrome").page("https://a.example", "ACME", "ACME beat estimates", true));
        let fetcher = fetcher(vec![http.clone(), chrome.clone()], &["http", "chrome"], clock.clone());

        let outcome = fetcher
            .fetch("https://a.example", &QueryUrlMapping::default(), &CancellationToken::new())
            .await;

        let page = outcome.page().expect("fetched");
        assert_eq!(page.extraction_method, "chrome");
        assert_eq!(page.title, "ACME");
        assert!(page.content.has_tabular_data);
        assert_eq!(http.calls(), vec!["https://a.example"]);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn empty_text_counts_as_failure() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(ScriptedMethod::new("http").page("https://a.example", "", "  \n", false));
        let fetcher = fetcher(vec![http], &["http"], clock);

        let outcome = fetcher
            .fetch("https://a.example", &QueryUrlMapping::default(), &CancellationToken::new())
            .await;

        match outcome {
            FetchOutcome::Failed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].reason, "empty content");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_title_falls_back_to_url() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(ScriptedMethod::new("http").page("https://a.example", "", "body", false));
        let fetcher = fetcher(vec![http], &["http"], clock);
        let outcome = fetcher
            .fetch("https://a.example", &QueryUrlMapping::default(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.page().unwrap().title, "https://a.example");
    }

    #[tokio::test]
    async fn unregistered_methods_are_skipped() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(ScriptedMethod::new("http"));
        let fetcher = fetcher(vec![http], &["browserless", "http"], clock);
        assert_eq!(fetcher.method_names(), vec!["http"]);
    }

    #[test]
    fn no_usable_method_is_an_error() {
        let http: Arc<dyn ExtractionMethod> = Arc::new(ScriptedMethod::new("http"));
        let result = ContentFetcher::new(
            vec![http],
            &["chrome".to_string()],
            4,
            Duration::from_secs(5),
            Duration::ZERO,
            Arc::new(MockClock::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_all_keeps_url_order() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(
            ScriptedMethod::new("http")
                .page("https://a.example", "A", "a", false)
                .fail("https://b.example", "timeout")
                .page("https://c.example", "C", "c", false),
        );
        let fetcher = fetcher(vec![http], &["http"], clock);
        let urls: Vec<String> = ["a", "b", "c"].iter().map(|s| format!("https://{s}.example")).collect();

        let outcomes = fetcher
            .fetch_all(&urls, &QueryUrlMapping::default(), &CancellationToken::new())
            .await;

        let order: Vec<_> = outcomes.iter().map(|o| o.url()).collect();
        assert_eq!(order, vec!["https://a.example", "https://b.example", "https://c.example"]);
        assert!(outcomes[1].page().is_none());
    }

    #[tokio::test]
    async fn cancelled_run_starts_no_method() {
        let clock = Arc::new(MockClock::new());
        let http = Arc::new(ScriptedMethod::new("http").page("https://a.example", "A", "a", false));
        let fetcher = fetcher(vec![http.clone()], &["http"], clock);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetcher
            .fetch("https://a.example", &QueryUrlMapping::default(), &cancel)
            .await;

        assert!(outcome.page().is_none());
        assert!(http.calls().is_empty());
    }

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://q{i}.example")).collect()
    }

    fn queued_fetcher(method: Arc<QueuedMethod>, timeout: Duration) -> ContentFetcher {
        ContentFetcher::new(
            vec![method],
            &["chrome".to_string()],
            4,
            timeout,
            Duration::ZERO,
            Arc::new(MockClock::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn queue_time_is_not_charged_to_self_timed_methods() {
        // One slot, 100ms of work each: the fourth URL starts ~300ms in,
        // well past the 150ms attempt timeout.
        let method = Arc::new(QueuedMethod::new("chrome", 1, Duration::from_millis(100)));
        let fetcher = queued_fetcher(method.clone(), Duration::from_millis(150));

        let outcomes = fetcher
            .fetch_all(&urls(4), &QueryUrlMapping::default(), &CancellationToken::new())
            .await;

        let methods: Vec<_> = outcomes
            .iter()
            .map(|o| o.page().map(|p| p.extraction_method.as_str()))
            .collect();
        assert_eq!(methods, vec![Some("chrome"); 4]);
        assert_eq!(method.started(), 4);
    }

    #[tokio::test]
    async fn caller_timeout_applies_to_other_methods() {
        let method = Arc::new(QueuedMethod::new("chrome", 1, Duration::from_secs(5)).timed_by_caller());
        let fetcher = queued_fetcher(method, Duration::from_millis(50));

        let outcome = fetcher
            .fetch("https://q1.example", &QueryUrlMapping::default(), &CancellationToken::new())
            .await;

        match outcome {
            FetchOutcome::Failed { failures, .. } => assert!(failures[0].reason.starts_with("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
