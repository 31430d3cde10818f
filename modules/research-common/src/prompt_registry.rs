use std::collections::HashMap;
use std::path::Path;

use crate::error::{ResearchError, ResearchResult};
use crate::file_config::PromptsConfig;
use crate::template::{resolve_config_vars, resolve_runtime_vars, validate_template};

/// Allowed runtime variables per prompt family.
const QUERY_GENERATION_VARS: &[&str] = &["query", "current_year", "current_month"];
const CONTENT_ANALYSIS_VARS: &[&str] = &["url", "content_type", "content"];

/// A system/user prompt pair ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Pre-resolved prompt templates (config vars resolved, runtime vars intact).
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    query_generation_system: String,
    query_generation: String,
    content_analysis_system: String,
    content_analysis: String,
}

/// Raw template text for each prompt, before validation.
#[derive(Debug, Clone)]
pub struct PromptSources {
    pub query_generation_system: String,
    pub query_generation: String,
    pub content_analysis_system: String,
    pub content_analysis: String,
}

impl PromptRegistry {
    /// Load all prompt files relative to `config_dir`, resolve config vars, validate runtime vars.
    pub fn load(
        prompts: &PromptsConfig,
        config_dir: &Path,
        toml_value: &toml::Value,
    ) -> ResearchResult<Self> {
        let sources = PromptSources {
            query_generation_system: read_prompt(
                config_dir,
                &prompts.query_generation_system,
                "query_generation_system",
            )?,
            query_generation: read_prompt(config_dir, &prompts.query_generation, "query_generation")?,
            content_analysis_system: read_prompt(
                config_dir,
                &prompts.content_analysis_system,
                "content_analysis_system",
            )?,
            content_analysis: read_prompt(config_dir, &prompts.content_analysis, "content_analysis")?,
        };
        Self::from_sources(sources, toml_value)
    }

    pub fn from_sources(sources: PromptSources, toml_value: &toml::Value) -> ResearchResult<Self> {
        Ok(Self {
            query_generation_system: prepare(
                &sources.query_generation_system,
                toml_value,
                QUERY_GENERATION_VARS,
                "query_generation_system",
            )?,
            query_generation: prepare(
                &sources.query_generation,
                toml_value,
                QUERY_GENERATION_VARS,
                "query_generation",
            )?,
            content_analysis_system: prepare(
                &sources.content_analysis_system,
                toml_value,
                CONTENT_ANALYSIS_VARS,
                "content_analysis_system",
            )?,
            content_analysis: prepare(
                &sources.content_analysis,
                toml_value,
                CONTENT_ANALYSIS_VARS,
                "content_analysis",
            )?,
        })
    }

    pub fn query_generation(&self, query: &str, current_year: &str, current_month: &str) -> RenderedPrompt {
        let vars = HashMap::from([
            ("query", query),
            ("current_year", current_year),
            ("current_month", current_month),
        ]);
        RenderedPrompt {
            system: resolve_runtime_vars(&self.query_generation_system, &vars),
            user: resolve_runtime_vars(&self.query_generation, &vars),
        }
    }

    pub fn content_analysis(&self, url: &str, content_type: &str, content: &str) -> RenderedPrompt {
        let vars = HashMap::from([("url", url), ("content_type", content_type), ("content", content)]);
        RenderedPrompt {
            system: resolve_runtime_vars(&self.content_analysis_system, &vars),
            user: resolve_runtime_vars(&self.content_analysis, &vars),
        }
    }
}

fn read_prompt(config_dir: &Path, relative: &Path, name: &str) -> ResearchResult<String> {
    let full_path = config_dir.join(relative);
    let content = std::fs::read_to_string(&full_path).map_err(|source| ResearchError::Io {
        path: full_path.clone(),
        source,
    })?;
    if content.trim().is_empty() {
        return Err(ResearchError::Template(format!(
            "Prompt file is empty: {} ({name})",
            full_path.display()
        )));
    }
    Ok(content)
}

fn prepare(
    template: &str,
    toml_value: &toml::Value,
    allowed_runtime: &[&str],
    name: &str,
) -> ResearchResult<String> {
    if template.trim().is_empty() {
        return Err(ResearchError::Template(format!("{name} prompt is empty")));
    }
    let with_context = |e: ResearchError| ResearchError::Template(format!("{name} prompt: {e}"));
    validate_template(template, toml_value, allowed_runtime).map_err(with_context)?;
    resolve_config_vars(template, toml_value).map_err(with_context)
}
