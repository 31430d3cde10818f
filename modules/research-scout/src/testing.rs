// Test mocks for the research pipeline.
//
// One mock per collaborator trait:
// - MockLlm (Completion): per-task scripted replies, records every prompt
// - MockSearch (SearchProvider): query → URLs, scripted failures, call times
// - ScriptedMethod (ExtractionMethod): URL → page or failure
// - QueuedMethod (ExtractionMethod): slow work behind a small semaphore
// - MockClock (Clock): virtual monotonic time advanced by sleeps, fixed wall clock
// - MockStore (SummaryStore): in-memory rows, scripted outages
//
// Plus fixtures: a parsed RunConfig, a PromptRegistry and sample records.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai_client::{Completion, LlmOutput, PromptContext};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use research_common::{
    parse_config, Clock, ExtractedPage, ExtractionMethod, PromptRegistry, PromptSources, ResultStatus,
    RunConfig, SearchProvider, SummaryStore, WebSearchResult,
};
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TEST_CONFIG: &str = r#"
query = "ACME stock outlook"
methods = ["http", "chrome"]
default_method = "http"
rate_limit = 0.0
urls_per_query = 9
max_queries = 3

[search]
request_delay_secs = 5.0
max_retries = 3
pause_secs = 0.0

[analyst]
focus = "equities"

[prompts]
query_generation_system = "prompts/query_generation_system.md"
query_generation = "prompts/query_generation.md"
content_analysis_system = "prompts/content_analysis_system.md"
content_analysis = "prompts/content_analysis.md"

[llm_configs.search_query_generation]
client = "openai"
model = "gpt-4o-mini"
max_tokens = 200

[llm_configs.content_analysis]
client = "openai"
model = "gpt-4o-mini"
response_format = "structured_output"
max_tokens = 2000

[llm_configs.content_analysis.schema_config]
schema_name = "MarketSummary"
schema_description = "Structured market analysis of one page"
"#;

fn parsed_test_config() -> (RunConfig, toml::Value) {
    parse_config(TEST_CONFIG, Path::new("research.toml")).expect("test config parses")
}

pub fn test_run_config() -> RunConfig {
    parsed_test_config().0
}

pub fn test_prompts() -> PromptRegistry {
    let (_, value) = parsed_test_config();
    let sources = PromptSources {
        query_generation_system: "You write web search queries for {{config.analyst.focus}} research.".into(),
        query_generation: "Base query: {{query}}\n\
                           Current date: {{current_month}} {{current_year}}\n\
                           Return two time-scoped search queries, one per line."
            .into(),
        content_analysis_system: "You are a {{config.analyst.focus}} analyst.".into(),
        content_analysis: "URL: {{url}}\nCONTENT TYPE: {{content_type}}\n\nCONTENT:\n{{content}}".into(),
    };
    PromptRegistry::from_sources(sources, &value).expect("test prompts are valid")
}

/// A `MarketSummary` that passes validation.
pub fn market_summary_json(summary: &str) -> serde_json::Value {
    serde_json::json!({
        "analysis_type": "general",
        "summary": summary,
        "key_points": ["Revenue up 12%"],
        "market_impact": "Positive for the sector",
        "trading_implications": "Momentum may continue",
        "metrics": [{"name": "revenue_growth", "value": "12", "unit": "%"}],
        "sources": ["https://a.example/acme"]
    })
}

pub fn sample_result(url: &str) -> WebSearchResult {
    WebSearchResult {
        url: url.to_string(),
        title: "ACME quarterly results".to_string(),
        content: "ACME beat estimates.".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0).unwrap(),
        status: ResultStatus::Success,
        summary: Some(market_summary_json("ACME beat estimates")),
        agent_id: uuid::Uuid::new_v4().to_string(),
        extraction_method: "http".to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockClock
// ---------------------------------------------------------------------------

/// Virtual time. `sleep` returns immediately after advancing `now`.
pub struct MockClock {
    now: Mutex<Duration>,
    wall: DateTime<Utc>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    /// Wall clock fixed at 2026-10-14 09:30 UTC.
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0).unwrap())
    }

    pub fn at(wall: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
            wall,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.wall
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

/// Replies are consumed per task in order; a task's default answers once
/// its script runs out.
pub struct MockLlm {
    scripted: Mutex<HashMap<String, VecDeque<Result<LlmOutput, String>>>>,
    defaults: HashMap<String, LlmOutput>,
    prompts: Mutex<Vec<PromptContext>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            defaults: HashMap::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on_task(self, task: &str, reply: Result<LlmOutput, String>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn default_for(mut self, task: &str, reply: LlmOutput) -> Self {
        self.defaults.insert(task.to_string(), reply);
        self
    }

    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Completion for MockLlm {
    async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput> {
        self.prompts.lock().unwrap().push(ctx.clone());

        let next = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&ctx.task)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!("MockLlm: {message}")),
            None => self
                .defaults
                .get(&ctx.task)
                .cloned()
                .ok_or_else(|| anyhow!("MockLlm: no reply scripted for {}", ctx.task)),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Unregistered queries return no URLs.
pub struct MockSearch {
    clock: Arc<MockClock>,
    results: HashMap<String, Vec<String>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl MockSearch {
    pub fn new(clock: Arc<MockClock>) -> Self {
        Self {
            clock,
            results: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, urls: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    /// Fail the next `times` calls for `query`.
    pub fn fail_times(self, query: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(query.to_string(), times);
        self
    }

    /// Virtual time of each provider call, in call order.
    pub fn call_times(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, num: usize, _pause: Duration) -> Result<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), self.clock.now()));

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(query) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("MockSearch: scripted failure for {query}");
            }
        }

        Ok(self
            .results
            .get(query)
            .map(|urls| urls.iter().take(num).cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// ScriptedMethod
// ---------------------------------------------------------------------------

/// Extraction method with canned pages. Unregistered URLs fail.
pub struct ScriptedMethod {
    name: String,
    pages: HashMap<String, Result<ExtractedPage, String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedMethod {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pages: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn page(mut self, url: &str, title: &str, text: &str, has_tabular_data: bool) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(ExtractedPage {
                title: title.to_string(),
                text: text.to_string(),
                has_tabular_data,
            }),
        );
        self
    }

    pub fn fail(mut self, url: &str, reason: &str) -> Self {
        self.pages.insert(url.to_string(), Err(reason.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionMethod for ScriptedMethod {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, url: &str) -> Result<ExtractedPage> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(reason)) => bail!("{reason}"),
            None => bail!("ScriptedMethod {}: no page for {url}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// QueuedMethod
// ---------------------------------------------------------------------------

/// Every URL succeeds after `work` of real time, at most `permits` at once.
/// Bounds its own time by default, like the browser method.
pub struct QueuedMethod {
    name: String,
    semaphore: Semaphore,
    work: Duration,
    bounds_own_time: bool,
    started: AtomicUsize,
}

impl QueuedMethod {
    pub fn new(name: &str, permits: usize, work: Duration) -> Self {
        Self {
            name: name.to_string(),
            semaphore: Semaphore::new(permits),
            work,
            bounds_own_time: true,
            started: AtomicUsize::new(0),
        }
    }

    /// Leave timing to the caller's timeout.
    pub fn timed_by_caller(mut self) -> Self {
        self.bounds_own_time = false;
        self
    }

    /// Fetches that got past the semaphore.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionMethod for QueuedMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds_own_time(&self) -> bool {
        self.bounds_own_time
    }

    async fn fetch(&self, url: &str) -> Result<ExtractedPage> {
        let _permit = self.semaphore.acquire().await?;
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        Ok(ExtractedPage {
            title: format!("Page at {url}"),
            text: format!("Rendered content of {url}"),
            has_tabular_data: false,
        })
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

pub struct MockStore {
    connected: bool,
    insert_error: Option<String>,
    inserted: Mutex<Vec<WebSearchResult>>,
}

impl MockStore {
    pub fn connected() -> Self {
        Self {
            connected: true,
            insert_error: None,
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            connected: false,
            ..Self::connected()
        }
    }

    /// Connects, then fails every insert with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            insert_error: Some(message.to_string()),
            ..Self::connected()
        }
    }

    pub fn inserted(&self) -> Vec<WebSearchResult> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryStore for MockStore {
    async fn test_connection(&self) -> bool {
        self.connected
    }

    async fn insert_article_summaries(&self, records: &[WebSearchResult]) -> Result<u64> {
        if let Some(message) = &self.insert_error {
            bail!("{message}");
        }
        self.inserted.lock().unwrap().extend_from_slice(records);
        Ok(records.len() as u64)
    }
}
