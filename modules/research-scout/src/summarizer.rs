use std::sync::Arc;
use std::time::Duration;

use ai_client::{
    parse_json_object, truncate_to_char_boundary, Completion, LlmOutput, PromptContext, StructuredTool,
};
use anyhow::{anyhow, Result};
use research_common::{
    Clock, FetchedPage, PromptRegistry, SchemaEntry, SchemaRegistry, TaskConfig, CONTENT_ANALYSIS_TASK,
};
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

/// A schema-conformant summary. `defaulted` marks the empty instance used
/// after every attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub summary: serde_json::Value,
    pub attempts: u32,
    pub defaulted: bool,
}

/// Structured content analysis of one page, validated against a named schema.
pub struct Summarizer {
    llm: Arc<dyn Completion>,
    prompts: Arc<PromptRegistry>,
    task: TaskConfig,
    schema: SchemaEntry,
    tool: StructuredTool,
    content_max_length: usize,
    clock: Arc<dyn Clock>,
}

impl Summarizer {
    pub fn new(
        llm: Arc<dyn Completion>,
        prompts: Arc<PromptRegistry>,
        task: TaskConfig,
        schemas: &SchemaRegistry,
        content_max_length: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let schema_config = task
            .schema_config
            .as_ref()
            .ok_or_else(|| anyhow!("[llm_configs.{CONTENT_ANALYSIS_TASK}] requires a [schema_config]"))?;
        let schema = *schemas.get(&schema_config.schema_name)?;
        let tool = StructuredTool {
            schema_name: schema.name.to_string(),
            schema_description: schema_config.schema_description.clone(),
            instruction_string: schema_config.instruction_string.clone(),
            json_schema: schema.json_schema(),
        };

        Ok(Self {
            llm,
            prompts,
            task,
            schema,
            tool,
            content_max_length,
            clock,
        })
    }

    pub fn schema_name(&self) -> &str {
        self.schema.name
    }

    fn context(&self, page: &FetchedPage) -> PromptContext {
        let content = truncate_to_char_boundary(&page.content.text, self.content_max_length);
        let prompt = self
            .prompts
            .content_analysis(&page.url, page.content.content_type_hint(), content);
        PromptContext::new(CONTENT_ANALYSIS_TASK, self.task.settings(), prompt.system, prompt.user)
            .with_structured(self.tool.clone(), self.task.use_schema_instruction)
    }

    fn read(&self, output: LlmOutput) -> Result<serde_json::Value> {
        let raw = match output.json {
            Some(json) => json,
            None => output
                .str_content()
                .and_then(parse_json_object)
                .ok_or_else(|| anyhow!("response contained no JSON object"))?,
        };
        Ok(self.schema.validate(raw)?)
    }

    fn default_outcome(&self, page: &FetchedPage) -> SummaryOutcome {
        warn!(url = page.url.as_str(), schema = self.schema.name, "Using empty summary");
        SummaryOutcome {
            summary: self.schema.default_instance(),
            attempts: MAX_ATTEMPTS,
            defaulted: true,
        }
    }

    /// Never fails: after the last attempt the schema's default instance is returned.
    pub async fn summarize(&self, page: &FetchedPage) -> SummaryOutcome {
        self.summarize_batch(std::slice::from_ref(page))
            .await
            .pop()
            .unwrap_or_else(|| self.default_outcome(page))
    }

    /// Outcomes in page order. Each round sends every page still lacking a
    /// valid summary in one `complete_batch` call; rounds are spaced by
    /// `1s * attempt`.
    pub async fn summarize_batch(&self, pages: &[FetchedPage]) -> Vec<SummaryOutcome> {
        let contexts: Vec<PromptContext> = pages.iter().map(|page| self.context(page)).collect();
        let mut outcomes: Vec<Option<SummaryOutcome>> = vec![None; pages.len()];
        let mut pending: Vec<usize> = (0..pages.len()).collect();

        for attempt in 1..=MAX_ATTEMPTS {
            if pending.is_empty() {
                break;
            }
            if attempt > 1 {
                self.clock.sleep(RETRY_BASE * (attempt - 1)).await;
            }

            let batch: Vec<PromptContext> = pending.iter().map(|&i| contexts[i].clone()).collect();
            let replies = self.llm.complete_batch(&batch).await;

            let mut retry = Vec::new();
            for (i, reply) in pending.into_iter().zip(replies) {
                let url = pages[i].url.as_str();
                match reply.and_then(|output| self.read(output)) {
                    Ok(summary) => {
                        info!(url, schema = self.schema.name, attempt, "Summary generated");
                        outcomes[i] = Some(SummaryOutcome {
                            summary,
                            attempts: attempt,
                            defaulted: false,
                        });
                    }
                    Err(e) => {
                        warn!(
                            url,
                            schema = self.schema.name,
                            attempt,
                            max = MAX_ATTEMPTS,
                            error = %e,
                            "Summary attempt failed"
                        );
                        retry.push(i);
                    }
                }
            }
            pending = retry;
        }

        outcomes
            .into_iter()
            .zip(pages)
            .map(|(outcome, page)| outcome.unwrap_or_else(|| self.default_outcome(page)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use research_common::{MarketSummary, PageContent};
    use serde_json::json;

    use super::*;
    use crate::testing::{market_summary_json, test_prompts, test_run_config, MockClock, MockLlm};

    fn page(text: &str, tabular: bool) -> FetchedPage {
        FetchedPage {
            url: "https://a.example/acme".into(),
            title: "ACME".into(),
            content: PageContent {
                text: text.into(),
                has_tabular_data: tabular,
            },
            extraction_method: "http".into(),
        }
    }

    fn summarizer(llm: Arc<MockLlm>, clock: Arc<MockClock>, max_len: usize) -> Summarizer {
        let config = test_run_config();
        Summarizer::new(
            llm,
            Arc::new(test_prompts()),
            config.task(CONTENT_ANALYSIS_TASK).unwrap().clone(),
            &SchemaRegistry::with_defaults(),
            max_len,
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn third_attempt_wins_after_two_invalid_replies() {
        let good = market_summary_json("ACME beat estimates");
        let llm = Arc::new(
            MockLlm::new()
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::json(json!({"summary": ""}))))
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::text("not json at all")))
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::json(good.clone()))),
        );
        let clock = Arc::new(MockClock::new());
        let outcome = summarizer(llm, clock.clone(), 1000)
            .summarize(&page("ACME beat estimates", false))
            .await;

        assert!(!outcome.defaulted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.summary["summary"], "ACME beat estimates");
        assert_eq!(outcome.summary["analysis_type"], good["analysis_type"]);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn all_attempts_failing_yields_default_instance() {
        let llm = Arc::new(
            MockLlm::new()
                .on_task(CONTENT_ANALYSIS_TASK, Err("rate limited".into()))
                .on_task(CONTENT_ANALYSIS_TASK, Err("rate limited".into()))
                .on_task(CONTENT_ANALYSIS_TASK, Err("rate limited".into())),
        );
        let outcome = summarizer(llm, Arc::new(MockClock::new()), 1000)
            .summarize(&page("body", false))
            .await;

        assert!(outcome.defaulted);
        assert_eq!(
            outcome.summary,
            serde_json::to_value(MarketSummary::default()).unwrap()
        );
    }

    #[tokio::test]
    async fn batch_retries_only_the_pages_that_failed() {
        let llm = Arc::new(
            MockLlm::new()
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::json(market_summary_json("first"))))
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::text("no json")))
                .on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::json(market_summary_json("second")))),
        );
        let clock = Arc::new(MockClock::new());
        let mut second = page("ACME filing", false);
        second.url = "https://b.example/acme".into();

        let outcomes = summarizer(llm.clone(), clock.clone(), 1000)
            .summarize_batch(&[page("ACME news", false), second])
            .await;

        assert_eq!(outcomes[0].summary["summary"], "first");
        assert_eq!(outcomes[0].attempts, 1);
        assert_eq!(outcomes[1].summary["summary"], "second");
        assert_eq!(outcomes[1].attempts, 2);
        let urls: Vec<_> = llm.prompts().iter().map(|p| p.user.contains("b.example")).collect();
        assert_eq!(urls, vec![false, true, true]);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn json_in_fenced_text_is_accepted() {
        let body = format!("```json\n{}\n```", market_summary_json("From text"));
        let llm = Arc::new(MockLlm::new().on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::text(body))));
        let outcome = summarizer(llm, Arc::new(MockClock::new()), 1000)
            .summarize(&page("body", false))
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.summary["summary"], "From text");
    }

    #[tokio::test]
    async fn prompt_is_truncated_and_carries_the_content_type() {
        let llm = Arc::new(
            MockLlm::new().on_task(CONTENT_ANALYSIS_TASK, Ok(LlmOutput::json(market_summary_json("ok")))),
        );
        let text = "x".repeat(50);
        summarizer(llm.clone(), Arc::new(MockClock::new()), 10)
            .summarize(&page(&text, true))
            .await;

        let seen = llm.prompts();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].user.contains("Contains tables/charts"));
        assert!(seen[0].user.contains(&"x".repeat(10)));
        assert!(!seen[0].user.contains(&"x".repeat(11)));
        let tool = seen[0].structured.as_ref().unwrap();
        assert_eq!(tool.schema_name, "MarketSummary");
    }

    #[test]
    fn unknown_schema_is_rejected() {
        let config = test_run_config();
        let mut task = config.task(CONTENT_ANALYSIS_TASK).unwrap().clone();
        if let Some(schema) = task.schema_config.as_mut() {
            schema.schema_name = "Nope".into();
        }
        let result = Summarizer::new(
            Arc::new(MockLlm::new()),
            Arc::new(test_prompts()),
            task,
            &SchemaRegistry::with_defaults(),
            1000,
            Arc::new(MockClock::new()),
        );
        assert!(result.is_err());
    }
}
