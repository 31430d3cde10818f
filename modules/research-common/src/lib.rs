pub mod config;
pub mod error;
pub mod file_config;
pub mod prompt_registry;
pub mod schemas;
pub mod template;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ResearchError, ResearchResult};
pub use file_config::{
    load_config, parse_config, PromptsConfig, RunConfig, SchemaConfig, SearchConfig, TaskConfig, CONTENT_ANALYSIS_TASK,
    QUERY_GENERATION_TASK,
};
pub use prompt_registry::{PromptRegistry, PromptSources, RenderedPrompt};
pub use schemas::{
    AnalysisType, ArticleSummary, MarketSummary, SchemaEntry, SchemaRegistry, SummarySchema,
};
pub use traits::{Clock, ExtractionMethod, SearchProvider, SummaryStore, SystemClock};
pub use types::*;
