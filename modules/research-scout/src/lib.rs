pub mod expander;
pub mod fetcher;
pub mod orchestrator;
pub mod resolver;
pub mod sink;
pub mod stats;
pub mod summarizer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use expander::{parse_queries, QueryExpander, TimeContext};
pub use fetcher::{ContentFetcher, FetchOutcome, MethodFailure};
pub use orchestrator::{Orchestrator, RunReport, RunSettings};
pub use resolver::UrlResolver;
pub use sink::{default_output_path, load_results, DatabaseOutcome, ResultSink, SaveReport};
pub use stats::{QueryStats, RunStats};
pub use summarizer::{Summarizer, SummaryOutcome};
