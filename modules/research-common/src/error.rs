use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Schema validation failed for {schema}: {reason}")]
    Validation { schema: String, reason: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Llm(#[from] ai_client::AiError),
}

pub type ResearchResult<T> = std::result::Result<T, ResearchError>;
