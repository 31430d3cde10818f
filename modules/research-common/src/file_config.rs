use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ai_client::{ClientKind, LlmSettings, RequestLimits, ResponseFormat};
use serde::Deserialize;

use crate::error::{ResearchError, ResearchResult};
use crate::schemas::SchemaRegistry;

pub const QUERY_GENERATION_TASK: &str = "search_query_generation";
pub const CONTENT_ANALYSIS_TASK: &str = "content_analysis";

/// TOML-backed run configuration. Secrets stay as env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Base query used when none is given on the command line.
    #[serde(default)]
    pub query: String,
    #[serde(default = "defaults::max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Seconds to pause between extraction-method attempts on one URL.
    #[serde(default = "defaults::rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "defaults::content_max_length")]
    pub content_max_length: usize,
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "defaults::urls_per_query")]
    pub urls_per_query: usize,
    #[serde(default = "defaults::max_queries")]
    pub max_queries: usize,
    #[serde(default = "defaults::yes")]
    pub use_ai_summary: bool,
    #[serde(default = "defaults::methods")]
    pub methods: Vec<String>,
    #[serde(default = "defaults::default_method")]
    pub default_method: String,
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "defaults::headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm_limits: RequestLimits,
    /// Free-form values for `{{config.analyst.*}}` in prompts.
    #[serde(default)]
    pub analyst: toml::Table,
    pub prompts: PromptsConfig,
    pub llm_configs: HashMap<String, TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "defaults::request_delay_secs")]
    pub request_delay_secs: f64,
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    #[serde(default = "defaults::pause_secs")]
    pub pause_secs: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            request_delay_secs: defaults::request_delay_secs(),
            max_retries: defaults::max_retries(),
            pause_secs: defaults::pause_secs(),
        }
    }
}

impl SearchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs.max(0.0))
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs_f64(self.pause_secs.max(0.0))
    }
}

/// Prompt file paths, relative to the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsConfig {
    pub query_generation_system: PathBuf,
    pub query_generation: PathBuf,
    pub content_analysis_system: PathBuf,
    pub content_analysis: PathBuf,
}

/// One `[llm_configs.<task>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub client: ClientKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "defaults::max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "defaults::yes")]
    pub use_cache: bool,
    #[serde(default)]
    pub schema_config: Option<SchemaConfig>,
    #[serde(default = "defaults::yes")]
    pub use_schema_instruction: bool,
}

impl TaskConfig {
    pub fn settings(&self) -> LlmSettings {
        LlmSettings {
            client: self.client,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: self.response_format,
            use_cache: self.use_cache,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub schema_name: String,
    #[serde(default)]
    pub schema_description: String,
    #[serde(default = "defaults::instruction_string")]
    pub instruction_string: String,
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn max_concurrent_requests() -> usize {
        50
    }
    pub fn rate_limit() -> f64 {
        0.1
    }
    pub fn content_max_length() -> usize {
        1_000_000
    }
    pub fn request_timeout_secs() -> u64 {
        30
    }
    pub fn urls_per_query() -> usize {
        9
    }
    pub fn max_queries() -> usize {
        3
    }
    pub fn yes() -> bool {
        true
    }
    pub fn methods() -> Vec<String> {
        vec!["http".to_string(), "chrome".to_string()]
    }
    pub fn default_method() -> String {
        "http".to_string()
    }
    pub fn output_dir() -> PathBuf {
        PathBuf::from("outputs/web_search")
    }
    pub fn headers() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "User-Agent".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
        ])
    }
    pub fn request_delay_secs() -> f64 {
        5.0
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn pause_secs() -> f64 {
        2.0
    }
    pub fn max_tokens() -> u32 {
        400
    }
    pub fn instruction_string() -> String {
        "Respond only with a JSON object that conforms to this JSON schema:".to_string()
    }
}

impl RunConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn method_pause(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit.max(0.0))
    }

    pub fn task(&self, name: &str) -> ResearchResult<&TaskConfig> {
        self.llm_configs
            .get(name)
            .ok_or_else(|| ResearchError::Config(format!("Missing [llm_configs.{name}]")))
    }

    /// Methods to try per URL: the default first, then the configured list, deduplicated.
    pub fn method_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::with_capacity(self.methods.len() + 1);
        for name in std::iter::once(&self.default_method).chain(&self.methods) {
            if !name.is_empty() && !order.contains(name) {
                order.push(name.clone());
            }
        }
        order
    }

    /// Startup checks. A failure here aborts the run before any query.
    pub fn validate(&self, schemas: &SchemaRegistry) -> ResearchResult<()> {
        for (name, value) in [
            ("max_concurrent_requests", self.max_concurrent_requests),
            ("urls_per_query", self.urls_per_query),
            ("max_queries", self.max_queries),
            ("content_max_length", self.content_max_length),
        ] {
            if value == 0 {
                return Err(ResearchError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.method_order().is_empty() {
            return Err(ResearchError::Config("No extraction methods configured".to_string()));
        }

        for task in [QUERY_GENERATION_TASK, CONTENT_ANALYSIS_TASK] {
            let config = self.task(task)?;
            config
                .settings()
                .validate()
                .map_err(|e| ResearchError::Config(format!("[llm_configs.{task}]: {e}")))?;
        }

        let analysis = self.task(CONTENT_ANALYSIS_TASK)?;
        let schema = analysis.schema_config.as_ref().ok_or_else(|| {
            ResearchError::Config(format!(
                "[llm_configs.{CONTENT_ANALYSIS_TASK}] requires a [schema_config]"
            ))
        })?;
        schemas.get(&schema.schema_name)?;

        Ok(())
    }
}

/// Load and parse a TOML config file, returning the typed config and the raw
/// value tree used for template resolution.
pub fn load_config(path: &Path) -> ResearchResult<(RunConfig, toml::Value)> {
    let content = std::fs::read_to_string(path).map_err(|source| ResearchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, path)
}

pub fn parse_config(content: &str, path: &Path) -> ResearchResult<(RunConfig, toml::Value)> {
    let toml_err = |source| ResearchError::Toml {
        path: path.to_path_buf(),
        source,
    };
    let config: RunConfig = toml::from_str(content).map_err(toml_err)?;
    let value: toml::Value = toml::from_str(content).map_err(toml_err)?;
    Ok((config, value))
}
