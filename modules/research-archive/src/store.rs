// Postgres persistence for article summaries. A secondary sink; the JSON file
// written by the scout is the record of truth.

use std::time::Duration;

use async_trait::async_trait;
use research_common::{SummaryStore, WebSearchResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::Result;

pub struct PgSummaryStore {
    pool: PgPool,
}

/// Parameters for one `article_summaries` row.
#[derive(Debug, Clone, PartialEq)]
struct InsertSummary<'a> {
    agent_id: &'a str,
    url: &'a str,
    title: &'a str,
    content: &'a str,
    status: &'static str,
    summary: Option<&'a serde_json::Value>,
    extraction_method: &'a str,
    fetched_at: chrono::DateTime<chrono::Utc>,
}

impl<'a> From<&'a WebSearchResult> for InsertSummary<'a> {
    fn from(r: &'a WebSearchResult) -> Self {
        Self {
            agent_id: &r.agent_id,
            url: &r.url,
            title: &r.title,
            content: &r.content,
            status: r.status.as_str(),
            summary: r.summary.as_ref(),
            extraction_method: &r.extraction_method,
            fetched_at: r.timestamp,
        }
    }
}

impl PgSummaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazily connecting pool; the first query surfaces connection errors.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn insert_all(&self, records: &[WebSearchResult]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for row in records.iter().map(InsertSummary::from) {
            let result = sqlx::query(
                r#"
                INSERT INTO article_summaries
                    (agent_id, url, title, content, status, summary, extraction_method, fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(row.agent_id)
            .bind(row.url)
            .bind(row.title)
            .bind(row.content)
            .bind(row.status)
            .bind(row.summary)
            .bind(row.extraction_method)
            .bind(row.fetched_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    async fn test_connection(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Database connection test failed");
                false
            }
        }
    }

    async fn insert_article_summaries(&self, records: &[WebSearchResult]) -> anyhow::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let written = self.insert_all(records).await?;
        info!(rows = written, "Inserted article summaries");
        Ok(written)
    }
}
