mod client;
pub(crate) mod types;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::Completion;
use crate::types::{LlmOutput, PromptContext, ResponseFormat};
use client::{ClaudeClient, ANTHROPIC_API_URL};
use types::*;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

// =============================================================================
// Claude Backend
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn client(&self) -> ClaudeClient {
        ClaudeClient::new(self.http.clone(), &self.api_key, &self.base_url)
    }
}

/// Structured formats become forced tool use; text formats are plain messages.
pub(crate) fn build_request(ctx: &PromptContext) -> Result<ChatRequest, AiError> {
    let settings = &ctx.settings;
    let system = if settings.use_cache {
        SystemPrompt::cached(ctx.system_prompt())
    } else {
        SystemPrompt::Text(ctx.system_prompt())
    };

    let mut request = ChatRequest::new(settings.model_or_default())
        .system(system)
        .message(WireMessage::user(&ctx.user))
        .max_tokens(settings.max_tokens)
        .temperature(settings.temperature);

    if uses_tool(settings.response_format) {
        let tool = ctx.structured.as_ref().ok_or_else(|| {
            AiError::Config(format!(
                "task {} uses {} but has no schema bound",
                ctx.task,
                settings.response_format.as_str()
            ))
        })?;
        request = request.forced_tool(ToolDefinitionWire {
            name: tool.schema_name.clone(),
            description: tool.schema_description.clone(),
            input_schema: tool.json_schema.clone(),
        });
    }

    Ok(request)
}

fn uses_tool(format: ResponseFormat) -> bool {
    matches!(
        format,
        ResponseFormat::Tool | ResponseFormat::StructuredOutput
    )
}

pub(crate) fn read_response(
    response: ChatResponse,
    format: ResponseFormat,
) -> Result<LlmOutput, AiError> {
    if uses_tool(format) {
        let input = response
            .tool_input()
            .cloned()
            .ok_or(AiError::EmptyResponse("Claude"))?;
        return Ok(LlmOutput {
            text: response.text(),
            json: Some(input),
        });
    }

    let text = response
        .text()
        .filter(|t| !t.trim().is_empty())
        .ok_or(AiError::EmptyResponse("Claude"))?;
    Ok(LlmOutput::from_text(text, format.wants_json()))
}

#[async_trait]
impl Completion for Claude {
    async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput> {
        let request = build_request(ctx)?;
        let response = self.client().chat(&request).await?;
        Ok(read_response(response, ctx.settings.response_format)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientKind, LlmSettings, StructuredTool};

    fn ctx(format: ResponseFormat, use_cache: bool) -> PromptContext {
        let mut settings = LlmSettings::new(ClientKind::Anthropic).with_response_format(format);
        settings.use_cache = use_cache;
        PromptContext::new("content_analysis", settings, "sys", "user").with_structured(
            StructuredTool {
                schema_name: "ArticleSummary".into(),
                schema_description: "Summarise an article".into(),
                instruction_string: String::new(),
                json_schema: serde_json::json!({"type": "object"}),
            },
            false,
        )
    }

    #[test]
    fn tool_format_forces_tool_use() {
        let body = serde_json::to_value(build_request(&ctx(ResponseFormat::Tool, false)).unwrap()).unwrap();
        assert_eq!(body["tools"][0]["name"], "ArticleSummary");
        assert_eq!(body["tool_choice"], serde_json::json!({"type": "tool", "name": "ArticleSummary"}));
        assert_eq!(body["system"], "sys");
        assert_eq!(body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn cached_system_prompt_is_a_block() {
        let body = serde_json::to_value(build_request(&ctx(ResponseFormat::JsonBeg, true)).unwrap()).unwrap();
        assert_eq!(body["system"][0]["type"], "text");
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn reads_tool_input_and_json_text() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "tool_use", "id": "t1", "name": "ArticleSummary", "input": {"summary": "x"}}],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        let out = read_response(resp, ResponseFormat::Tool).unwrap();
        assert_eq!(out.json, Some(serde_json::json!({"summary": "x"})));

        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "Sure: {\"summary\": \"y\"}"}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        let out = read_response(resp, ResponseFormat::JsonBeg).unwrap();
        assert_eq!(out.json, Some(serde_json::json!({"summary": "y"})));
    }
}
