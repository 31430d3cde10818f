/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Empty content from {method} for {url}")]
    EmptyContent { method: &'static str, url: String },

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArchiveError {
    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        ArchiveError::FetchFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
