use anyhow::Result;
use async_trait::async_trait;

use crate::types::{LlmOutput, PromptContext};

// =============================================================================
// Completion Trait
// =============================================================================

/// A backend that answers prompt contexts.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput>;

    /// Run every context concurrently. Results keep input order.
    async fn complete_batch(&self, contexts: &[PromptContext]) -> Vec<Result<LlmOutput>> {
        futures::future::join_all(contexts.iter().map(|ctx| self.complete(ctx))).await
    }
}
