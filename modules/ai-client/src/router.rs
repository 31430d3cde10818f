use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::error::AiError;
use crate::limits::{RequestLimiter, RequestLimits};
use crate::traits::Completion;
use crate::types::{ClientKind, LlmOutput, PromptContext};

/// Dispatches each context to the backend named by its settings, under a
/// shared rate limit.
pub struct LlmRouter {
    backends: HashMap<ClientKind, Arc<dyn Completion>>,
    limiter: RequestLimiter,
}

impl LlmRouter {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            backends: HashMap::new(),
            limiter: RequestLimiter::new(limits),
        }
    }

    pub fn with_backend(mut self, kind: ClientKind, backend: Arc<dyn Completion>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn has_backend(&self, kind: ClientKind) -> bool {
        self.backends.contains_key(&kind)
    }
}

#[async_trait]
impl Completion for LlmRouter {
    async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput> {
        let kind = ctx.settings.client;
        let backend = self.backends.get(&kind).ok_or_else(|| {
            AiError::Config(format!("no {kind} backend configured for task {}", ctx.task))
        })?;

        self.limiter.acquire(ctx.estimated_tokens()).await;
        debug!(id = %ctx.id, task = %ctx.task, client = %kind, "Dispatching LLM request");
        backend.complete(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LlmSettings;

    struct Echo(&'static str);

    #[async_trait]
    impl Completion for Echo {
        async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput> {
            Ok(LlmOutput::text(format!("{}:{}", self.0, ctx.user)))
        }
    }

    #[tokio::test]
    async fn routes_by_client_kind() {
        let router = LlmRouter::new(RequestLimits::default())
            .with_backend(ClientKind::OpenAi, Arc::new(Echo("openai")))
            .with_backend(ClientKind::Anthropic, Arc::new(Echo("anthropic")));

        let a = PromptContext::new("t", LlmSettings::new(ClientKind::Anthropic), "s", "hi");
        let o = PromptContext::new("t", LlmSettings::new(ClientKind::OpenAi), "s", "yo");
        let out = router.complete_batch(&[a, o]).await;
        assert_eq!(out[0].as_ref().unwrap().text.as_deref(), Some("anthropic:hi"));
        assert_eq!(out[1].as_ref().unwrap().text.as_deref(), Some("openai:yo"));
    }

    #[tokio::test]
    async fn missing_backend_is_an_error() {
        let router = LlmRouter::new(RequestLimits::default());
        let ctx = PromptContext::new("t", LlmSettings::new(ClientKind::Vllm), "s", "u");
        let err = router.complete(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("vllm"));
    }
}
