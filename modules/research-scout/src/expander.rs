//! Query expansion: one base query becomes a short list of time-aware
//! search queries. Never fails; an unusable LLM reply degrades to a single
//! fallback query.

use std::sync::{Arc, LazyLock};

use ai_client::{Completion, PromptContext};
use anyhow::{bail, Result};
use regex::Regex;
use research_common::{Clock, PromptRegistry, SearchQuery, TaskConfig, QUERY_GENERATION_TASK};
use tracing::{error, info};

/// Lines the model adds around its queries.
const BOILERPLATE_PREFIXES: &[&str] = &["Query:", "Please", "Format", "Make"];

const RECENCY_KEYWORDS: &[&str] = &["latest", "recent", "current", "last"];

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s*").expect("valid regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-•*]\s*").expect("valid regex"));

/// Current year and month name, as injected into prompts and used for recency checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeContext {
    pub year: String,
    pub month: String,
}

impl TimeContext {
    pub fn from_clock(clock: &dyn Clock) -> Self {
        let now = clock.wall_now();
        Self {
            year: now.format("%Y").to_string(),
            month: now.format("%B").to_string(),
        }
    }

    pub fn is_recent(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        [self.year.as_str(), self.month.as_str()]
            .into_iter()
            .chain(RECENCY_KEYWORDS.iter().copied())
            .any(|indicator| lower.contains(&indicator.to_lowercase()))
    }

    /// `query` unchanged if it already reads as recent, else `"<query> <year> latest"`.
    pub fn enrich(&self, query: &str) -> SearchQuery {
        if self.is_recent(query) {
            SearchQuery::new(query)
        } else {
            SearchQuery::enriched(self.fallback(query))
        }
    }

    pub fn fallback(&self, base: &str) -> String {
        format!("{base} {} latest", self.year)
    }
}

/// Candidate queries from a free-text LLM reply, one per line.
pub fn parse_queries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !BOILERPLATE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .map(|line| {
            let line = NUMBERING_RE.replace(line, "");
            let line = BULLET_RE.replace(&line, "");
            line.trim().trim_matches('"').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

pub struct QueryExpander {
    llm: Arc<dyn Completion>,
    prompts: Arc<PromptRegistry>,
    task: TaskConfig,
    max_queries: usize,
    clock: Arc<dyn Clock>,
}

impl QueryExpander {
    pub fn new(
        llm: Arc<dyn Completion>,
        prompts: Arc<PromptRegistry>,
        task: TaskConfig,
        max_queries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            llm,
            prompts,
            task,
            max_queries,
            clock,
        }
    }

    /// Ordered, deduplicated queries. Always at least one.
    pub async fn expand(&self, base: &str) -> Vec<SearchQuery> {
        let time = TimeContext::from_clock(self.clock.as_ref());
        match self.generate(base, &time).await {
            Ok(queries) => queries,
            Err(e) => {
                error!(query = base, error = %e, "Query generation failed, using fallback query");
                vec![SearchQuery::enriched(time.fallback(base))]
            }
        }
    }

    async fn generate(&self, base: &str, time: &TimeContext) -> Result<Vec<SearchQuery>> {
        let prompt = self.prompts.query_generation(base, &time.year, &time.month);
        let ctx = PromptContext::new(
            QUERY_GENERATION_TASK,
            self.task.settings(),
            prompt.system,
            prompt.user,
        );

        let output = self.llm.complete(&ctx).await?;
        let Some(text) = output.str_content() else {
            bail!("No response content from query generation");
        };
        info!(response = text, "Query generation response");

        let base_query = time.enrich(base);
        let mut queries = vec![base_query.clone()];
        for candidate in parse_queries(text) {
            let query = time.enrich(&candidate);
            if !queries.iter().any(|q| q.text == query.text) {
                queries.push(query);
            }
        }
        queries.truncate(self.max_queries.max(1));

        info!(original = base, time_modified = %base_query, count = queries.len(), "Generated search queries");
        for (i, query) in queries.iter().enumerate() {
            info!(index = i + 1, query = %query, enriched = query.time_enriched, "Search query");
        }
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use ai_client::LlmOutput;

    use super::*;
    use crate::testing::{test_prompts, test_run_config, MockClock, MockLlm};

    fn october_2026() -> TimeContext {
        TimeContext {
            year: "2026".into(),
            month: "October".into(),
        }
    }

    fn expander(llm: MockLlm, max_queries: usize) -> QueryExpander {
        let config = test_run_config();
        QueryExpander::new(
            Arc::new(llm),
            Arc::new(test_prompts()),
            config.task(QUERY_GENERATION_TASK).unwrap().clone(),
            max_queries,
            Arc::new(MockClock::new()),
        )
    }

    #[test]
    fn parse_strips_markers_and_boilerplate() {
        let text = "Query: here are your queries\n\
                    1. ACME earnings October 2026\n\
                    - ACME guidance recent\n\
                    • \"ACME buyback\"\n\
                    \n\
                    Please let me know if you need more.";
        assert_eq!(
            parse_queries(text),
            vec!["ACME earnings October 2026", "ACME guidance recent", "ACME buyback"]
        );
    }

    #[test]
    fn recency_is_case_insensitive() {
        let time = october_2026();
        assert!(time.is_recent("ACME LATEST news"));
        assert!(time.is_recent("acme october outlook"));
        assert!(time.is_recent("ACME 2026"));
        assert!(!time.is_recent("ACME stock outlook"));
    }

    #[test]
    fn enrich_appends_year_and_latest() {
        let time = october_2026();
        let q = time.enrich("ACME stock outlook");
        assert_eq!(q.text, "ACME stock outlook 2026 latest");
        assert!(q.time_enriched);
        assert!(!time.enrich("ACME recent filings").time_enriched);
    }

    #[tokio::test]
    async fn base_query_leads_and_every_query_is_recent() {
        let llm = MockLlm::new().on_task(
            QUERY_GENERATION_TASK,
            Ok(LlmOutput::text("1. ACME earnings October 2026\n2. ACME dividend history")),
        );
        let queries = expander(llm, 3).expand("ACME stock outlook").await;
        let texts: Vec<_> = queries.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "ACME stock outlook 2026 latest",
                "ACME earnings October 2026",
                "ACME dividend history 2026 latest",
            ]
        );
        let time = october_2026();
        assert!(queries.iter().all(|q| time.is_recent(&q.text)));
    }

    #[tokio::test]
    async fn duplicates_removed_and_list_capped() {
        let llm = MockLlm::new().on_task(
            QUERY_GENERATION_TASK,
            Ok(LlmOutput::text(
                "ACME stock outlook\nACME latest news\nACME latest news\nACME recent filings",
            )),
        );
        let queries = expander(llm, 2).expand("ACME stock outlook").await;
        let texts: Vec<_> = queries.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["ACME stock outlook 2026 latest", "ACME latest news"]);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_single_query() {
        let llm = MockLlm::new().on_task(QUERY_GENERATION_TASK, Err("upstream 503".into()));
        let queries = expander(llm, 3).expand("ACME stock outlook").await;
        assert_eq!(queries, vec![SearchQuery::enriched("ACME stock outlook 2026 latest")]);
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_single_query() {
        let llm = MockLlm::new().on_task(QUERY_GENERATION_TASK, Ok(LlmOutput::text("   ")));
        let queries = expander(llm, 3).expand("ACME recent news").await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "ACME recent news 2026 latest");
    }

    #[tokio::test]
    async fn prompt_carries_query_and_date() {
        let llm = Arc::new(
            MockLlm::new().on_task(QUERY_GENERATION_TASK, Ok(LlmOutput::text("ACME latest"))),
        );
        let config = test_run_config();
        let expander = QueryExpander::new(
            llm.clone(),
            Arc::new(test_prompts()),
            config.task(QUERY_GENERATION_TASK).unwrap().clone(),
            3,
            Arc::new(MockClock::new()),
        );
        expander.expand("ACME stock outlook").await;

        let seen = llm.prompts();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].task, QUERY_GENERATION_TASK);
        assert!(seen[0].user.contains("ACME stock outlook"));
        assert!(seen[0].user.contains("October 2026"));
    }
}
