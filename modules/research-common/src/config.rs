use anyhow::{Context, Result};
use std::path::PathBuf;

use ai_client::ClientKind;

use crate::error::{ResearchError, ResearchResult};

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; run behaviour, models
/// and prompts live in the TOML `RunConfig`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: Option<String>,

    // AI / LLM
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub vllm_base_url: Option<String>,
    pub litellm_base_url: Option<String>,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_key: Option<String>,

    // Search
    pub serper_api_key: String,

    // Browsers
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub chrome_bin: String,

    pub data_dir: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: var("DATABASE_URL"),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            vllm_base_url: var("VLLM_BASE_URL"),
            litellm_base_url: var("LITELLM_BASE_URL"),
            azure_openai_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            azure_openai_api_key: var("AZURE_OPENAI_API_KEY"),
            serper_api_key: var("SERPER_API_KEY").context("SERPER_API_KEY must be set")?,
            browserless_url: var("BROWSERLESS_URL"),
            browserless_token: var("BROWSERLESS_TOKEN"),
            chrome_bin: var("CHROME_BIN").unwrap_or_else(|| "chromium".to_string()),
            data_dir: var("DATA_DIR").map(PathBuf::from),
        };

        config.log_keys();
        Ok(config)
    }

    /// Fail if a provider some task uses has no credentials or endpoint.
    pub fn check_provider(&self, client: ClientKind) -> ResearchResult<()> {
        let missing = match client {
            ClientKind::OpenAi => self.openai_api_key.is_none().then_some("OPENAI_API_KEY"),
            ClientKind::Anthropic => self
                .anthropic_api_key
                .is_none()
                .then_some("ANTHROPIC_API_KEY"),
            ClientKind::AzureOpenAi => {
                if self.azure_openai_endpoint.is_none() {
                    Some("AZURE_OPENAI_ENDPOINT")
                } else {
                    self.azure_openai_api_key
                        .is_none()
                        .then_some("AZURE_OPENAI_API_KEY")
                }
            }
            ClientKind::Vllm => self.vllm_base_url.is_none().then_some("VLLM_BASE_URL"),
            ClientKind::Litellm => self.litellm_base_url.is_none().then_some("LITELLM_BASE_URL"),
        };
        match missing {
            Some(name) => Err(ResearchError::Config(format!(
                "{name} must be set to use the {client} client"
            ))),
            None => Ok(()),
        }
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val
                .char_indices()
                .nth(5)
                .map(|(i, _)| i)
                .unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }
        fn plain_opt(val: &Option<String>) -> &str {
            val.as_deref().unwrap_or("<not set>")
        }

        tracing::info!("Config loaded:");
        tracing::info!("  OPENAI_API_KEY: {}", preview_opt(&self.openai_api_key));
        tracing::info!("  OPENAI_BASE_URL: {}", plain_opt(&self.openai_base_url));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview_opt(&self.anthropic_api_key));
        tracing::info!("  VLLM_BASE_URL: {}", plain_opt(&self.vllm_base_url));
        tracing::info!("  LITELLM_BASE_URL: {}", plain_opt(&self.litellm_base_url));
        tracing::info!("  AZURE_OPENAI_ENDPOINT: {}", plain_opt(&self.azure_openai_endpoint));
        tracing::info!("  AZURE_OPENAI_API_KEY: {}", preview_opt(&self.azure_openai_api_key));
        tracing::info!("  SERPER_API_KEY: {}", preview(&self.serper_api_key));
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
        tracing::info!("  BROWSERLESS_URL: {}", plain_opt(&self.browserless_url));
        tracing::info!("  CHROME_BIN: {}", self.chrome_bin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> AppConfig {
        AppConfig {
            database_url: None,
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: Some("sk-ant-test".into()),
            vllm_base_url: None,
            litellm_base_url: None,
            azure_openai_endpoint: Some("https://acme.openai.azure.com".into()),
            azure_openai_api_key: None,
            serper_api_key: "serper".into(),
            browserless_url: None,
            browserless_token: None,
            chrome_bin: "chromium".into(),
            data_dir: None,
        }
    }

    #[test]
    fn provider_checks_name_the_missing_variable() {
        let config = bare();
        assert!(config.check_provider(ClientKind::Anthropic).is_ok());
        let err = config.check_provider(ClientKind::OpenAi).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        let err = config.check_provider(ClientKind::AzureOpenAi).unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_API_KEY"));
        let err = config.check_provider(ClientKind::Vllm).unwrap_err();
        assert!(err.to_string().contains("VLLM_BASE_URL"));
    }
}
