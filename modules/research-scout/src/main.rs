use std::path::{Path, PathBuf};
use std::sync::Arc;

use ai_client::{Claude, ClientKind, Completion, LlmRouter, OpenAi};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use research_archive::{BrowserlessMethod, ChromeMethod, HttpMethod, PgSummaryStore, SerperSearch};
use research_common::{
    load_config, AppConfig, Clock, ExtractionMethod, PromptRegistry, RunConfig, SchemaRegistry, SummaryStore,
    SystemClock, CONTENT_ANALYSIS_TASK, QUERY_GENERATION_TASK,
};
use research_scout::{
    default_output_path, ContentFetcher, Orchestrator, QueryExpander, ResultSink, RunSettings, Summarizer,
    UrlResolver,
};

#[derive(Parser)]
#[command(name = "research-scout", about = "Time-aware web research with structured LLM summaries")]
struct Cli {
    /// Run configuration (TOML). Prompt paths resolve relative to it.
    #[arg(long, default_value = "config/research.toml")]
    config: PathBuf,

    /// Base query; overrides `query` in the config file.
    #[arg(long)]
    query: Option<String>,

    /// Output file. Defaults to `<output_dir>/results_<timestamp>.json`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip LLM content analysis.
    #[arg(long)]
    no_summary: bool,

    /// Skip the database sink.
    #[arg(long)]
    no_db: bool,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("research=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value.as_deref().with_context(|| format!("{name} must be set"))
}

/// One backend per client kind the two tasks use.
fn build_router(app: &AppConfig, config: &RunConfig) -> Result<LlmRouter> {
    let mut router = LlmRouter::new(config.llm_limits);
    for task in [QUERY_GENERATION_TASK, CONTENT_ANALYSIS_TASK] {
        let kind = config.task(task)?.client;
        if router.has_backend(kind) {
            continue;
        }
        app.check_provider(kind)?;

        let backend: Arc<dyn Completion> = match kind {
            ClientKind::OpenAi => {
                let mut client = OpenAi::new(required(&app.openai_api_key, "OPENAI_API_KEY")?);
                if let Some(base_url) = &app.openai_base_url {
                    client = client.with_base_url(base_url);
                }
                Arc::new(client)
            }
            ClientKind::AzureOpenAi => Arc::new(OpenAi::azure(
                required(&app.azure_openai_endpoint, "AZURE_OPENAI_ENDPOINT")?,
                required(&app.azure_openai_api_key, "AZURE_OPENAI_API_KEY")?,
            )),
            ClientKind::Anthropic => Arc::new(Claude::new(required(&app.anthropic_api_key, "ANTHROPIC_API_KEY")?)),
            ClientKind::Vllm => Arc::new(OpenAi::compatible(
                kind,
                required(&app.vllm_base_url, "VLLM_BASE_URL")?,
                app.openai_api_key.clone().unwrap_or_default(),
            )),
            ClientKind::Litellm => Arc::new(OpenAi::compatible(
                kind,
                required(&app.litellm_base_url, "LITELLM_BASE_URL")?,
                app.openai_api_key.clone().unwrap_or_default(),
            )),
        };
        info!(task, client = %kind, "LLM backend configured");
        router = router.with_backend(kind, backend);
    }
    Ok(router)
}

fn build_methods(app: &AppConfig, config: &RunConfig) -> Result<Vec<Arc<dyn ExtractionMethod>>> {
    let timeout = config.request_timeout();
    let mut methods: Vec<Arc<dyn ExtractionMethod>> = vec![
        Arc::new(HttpMethod::new(&config.headers, timeout)?),
        Arc::new(ChromeMethod::new(app.chrome_bin.as_str(), timeout)),
    ];
    if let Some(url) = &app.browserless_url {
        methods.push(Arc::new(BrowserlessMethod::new(
            url,
            app.browserless_token.as_deref(),
            timeout,
        )?));
    }
    Ok(methods)
}

async fn build_store(app: &AppConfig) -> Option<Arc<dyn SummaryStore>> {
    let url = app.database_url.as_deref()?;
    let store = match PgSummaryStore::connect_lazy(url) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Invalid DATABASE_URL, database sink disabled");
            return None;
        }
    };
    if let Err(e) = store.migrate().await {
        warn!(error = %e, "Database migrations failed");
    }
    Some(Arc::new(store))
}

fn output_root(app: &AppConfig, config: &RunConfig) -> PathBuf {
    match &app.data_dir {
        Some(dir) if config.output_dir.is_relative() => dir.join(&config.output_dir),
        _ => config.output_dir.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    info!("Research scout starting...");

    let app = AppConfig::from_env()?;
    let (mut config, toml_value) = load_config(&cli.config)?;
    if let Some(query) = cli.query {
        config.query = query;
    }
    if cli.no_summary {
        config.use_ai_summary = false;
    }
    if config.query.trim().is_empty() {
        bail!("No query given: set `query` in {} or pass --query", cli.config.display());
    }

    let schemas = SchemaRegistry::with_defaults();
    config.validate(&schemas)?;

    let config_dir = cli.config.parent().unwrap_or(Path::new("."));
    let prompts = Arc::new(PromptRegistry::load(&config.prompts, config_dir, &toml_value)?);
    let llm: Arc<dyn Completion> = Arc::new(build_router(&app, &config)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let expander = QueryExpander::new(
        llm.clone(),
        prompts.clone(),
        config.task(QUERY_GENERATION_TASK)?.clone(),
        config.max_queries,
        clock.clone(),
    );
    let search = Arc::new(SerperSearch::new(app.serper_api_key.as_str(), config.request_timeout())?);
    let resolver = UrlResolver::new(search, clock.clone(), config.search.clone());
    let fetcher = ContentFetcher::new(
        build_methods(&app, &config)?,
        &config.method_order(),
        config.max_concurrent_requests,
        config.request_timeout(),
        config.method_pause(),
        clock.clone(),
    )?;
    let summarizer = if config.use_ai_summary {
        Some(Summarizer::new(
            llm.clone(),
            prompts.clone(),
            config.task(CONTENT_ANALYSIS_TASK)?.clone(),
            &schemas,
            config.content_max_length,
            clock.clone(),
        )?)
    } else {
        info!("AI summaries disabled");
        None
    };
    let orchestrator = Orchestrator::new(
        expander,
        resolver,
        fetcher,
        summarizer,
        RunSettings::from(&config),
        clock.clone(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run(&config.query, &cancel).await;

    let output = cli
        .output
        .unwrap_or_else(|| default_output_path(&output_root(&app, &config), clock.wall_now()));
    let store = if cli.no_db { None } else { build_store(&app).await };
    let sink = ResultSink::new(store);
    let saved = sink.save(&report.results, &output).await?;

    info!(
        query = config.query.as_str(),
        processed = report.stats.processed(),
        successful = report.stats.succeeded(),
        failed = report.stats.failed(),
        output = %saved.path.display(),
        database = ?saved.database,
        "Search completed"
    );
    info!("{}", report.stats);

    Ok(())
}
