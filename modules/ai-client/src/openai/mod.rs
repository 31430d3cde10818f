mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::{strict_schema, StructuredOutput};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::Completion;
use crate::types::{ClientKind, LlmOutput, PromptContext, ResponseFormat};
use client::{Endpoint, OpenAiClient};
use types::*;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const AZURE_API_VERSION: &str = "2024-06-01";

// =============================================================================
// OpenAi Backend
// =============================================================================

/// OpenAI chat completions, and every server that speaks the same protocol.
#[derive(Clone)]
pub struct OpenAi {
    kind: ClientKind,
    api_key: String,
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            kind: ClientKind::OpenAi,
            api_key: api_key.into(),
            endpoint: Endpoint::Compatible {
                base_url: OPENAI_API_URL.to_string(),
            },
            http: reqwest::Client::new(),
        }
    }

    /// A vLLM or LiteLLM server. The key may be empty.
    pub fn compatible(
        kind: ClientKind,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            endpoint: Endpoint::Compatible {
                base_url: base_url.into(),
            },
            http: reqwest::Client::new(),
        }
    }

    pub fn azure(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind: ClientKind::AzureOpenAi,
            api_key: api_key.into(),
            endpoint: Endpoint::Azure {
                endpoint: endpoint.into(),
                api_version: AZURE_API_VERSION.to_string(),
            },
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        if let Endpoint::Compatible { base_url } = &mut self.endpoint {
            *base_url = url.into();
        }
        self
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    fn client(&self) -> OpenAiClient {
        OpenAiClient::new(self.http.clone(), &self.api_key, self.endpoint.clone())
    }
}

/// Translate a prompt context into a chat request for its response format.
pub(crate) fn build_request(ctx: &PromptContext) -> Result<ChatRequest, AiError> {
    let settings = &ctx.settings;
    let model = settings.model_or_default();

    let mut request = ChatRequest::new(model)
        .message(WireMessage::system(ctx.system_prompt()))
        .message(WireMessage::user(&ctx.user));

    if uses_max_completion_tokens(model) {
        request = request.max_completion_tokens(settings.max_tokens);
    } else {
        request = request
            .max_tokens(settings.max_tokens)
            .temperature(settings.temperature);
    }

    let require_schema = || {
        ctx.structured.as_ref().ok_or_else(|| {
            AiError::Config(format!(
                "task {} uses {} but has no schema bound",
                ctx.task,
                settings.response_format.as_str()
            ))
        })
    };

    request = match settings.response_format {
        ResponseFormat::Text | ResponseFormat::JsonBeg => request,
        ResponseFormat::JsonObject => request.response_format(ResponseFormatWire::JsonObject),
        ResponseFormat::StructuredOutput => {
            let tool = require_schema()?;
            request.response_format(ResponseFormatWire::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: tool.schema_name.clone(),
                    strict: true,
                    schema: strict_schema(tool.json_schema.clone()),
                },
            })
        }
        ResponseFormat::Tool => {
            let tool = require_schema()?;
            request.forced_tool(ToolDefinitionWire::function(
                &tool.schema_name,
                &tool.schema_description,
                tool.json_schema.clone(),
            ))
        }
    };

    Ok(request)
}

/// Pull the answer out of a chat response for the requested format.
pub(crate) fn read_response(
    response: ChatResponse,
    format: ResponseFormat,
) -> Result<LlmOutput, AiError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or(AiError::EmptyResponse("OpenAI"))?;

    if format == ResponseFormat::Tool {
        let call = message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .ok_or(AiError::EmptyResponse("OpenAI"))?;
        let json: serde_json::Value = serde_json::from_str(&call.function.arguments)?;
        return Ok(LlmOutput {
            text: Some(call.function.arguments),
            json: Some(json),
        });
    }

    let content = message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(AiError::EmptyResponse("OpenAI"))?;
    Ok(LlmOutput::from_text(content, format.wants_json()))
}

#[async_trait]
impl Completion for OpenAi {
    async fn complete(&self, ctx: &PromptContext) -> Result<LlmOutput> {
        let request = build_request(ctx)?;
        let response = self.client().chat(&request).await?;
        Ok(read_response(response, ctx.settings.response_format)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LlmSettings, StructuredTool};

    fn tool() -> StructuredTool {
        StructuredTool {
            schema_name: "MarketSummary".into(),
            schema_description: "desc".into(),
            instruction_string: "Respond with JSON".into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {"summary": {"type": "string"}},
            }),
        }
    }

    fn ctx(format: ResponseFormat) -> PromptContext {
        let settings = LlmSettings::new(ClientKind::OpenAi)
            .with_model("gpt-4o")
            .with_response_format(format);
        PromptContext::new("content_analysis", settings, "sys", "user").with_structured(tool(), false)
    }

    fn response(message: serde_json::Value) -> ChatResponse {
        serde_json::from_value(serde_json::json!({
            "choices": [{"message": message, "finish_reason": "stop"}]
        }))
        .unwrap()
    }

    #[test]
    fn structured_output_sends_strict_json_schema() {
        let request = build_request(&ctx(ResponseFormat::StructuredOutput)).unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "MarketSummary");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["additionalProperties"],
            false
        );
        assert_eq!(body["max_tokens"], 400);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tool_format_forces_the_schema_function() {
        let request = build_request(&ctx(ResponseFormat::Tool)).unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "MarketSummary");
        assert_eq!(body["tool_choice"]["function"]["name"], "MarketSummary");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn json_object_and_plain_formats() {
        let body = serde_json::to_value(build_request(&ctx(ResponseFormat::JsonObject)).unwrap()).unwrap();
        assert_eq!(body["response_format"], serde_json::json!({"type": "json_object"}));

        let body = serde_json::to_value(build_request(&ctx(ResponseFormat::JsonBeg)).unwrap()).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[test]
    fn structured_format_without_schema_is_a_config_error() {
        let settings = LlmSettings::new(ClientKind::OpenAi)
            .with_response_format(ResponseFormat::StructuredOutput);
        let ctx = PromptContext::new("t", settings, "s", "u");
        assert!(matches!(build_request(&ctx), Err(AiError::Config(_))));
    }

    #[test]
    fn reasoning_models_use_max_completion_tokens() {
        let settings = LlmSettings::new(ClientKind::OpenAi).with_model("o3-mini");
        let ctx = PromptContext::new("t", settings, "s", "u");
        let body = serde_json::to_value(build_request(&ctx).unwrap()).unwrap();
        assert_eq!(body["max_completion_tokens"], 400);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn read_tool_arguments_as_json() {
        let resp = response(serde_json::json!({
            "role": "assistant",
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "MarketSummary", "arguments": "{\"summary\":\"ok\"}"}
            }]
        }));
        let out = read_response(resp, ResponseFormat::Tool).unwrap();
        assert_eq!(out.json, Some(serde_json::json!({"summary": "ok"})));
    }

    #[test]
    fn read_text_and_empty_content() {
        let resp = response(serde_json::json!({"role": "assistant", "content": "q1\nq2"}));
        let out = read_response(resp, ResponseFormat::Text).unwrap();
        assert_eq!(out.text.as_deref(), Some("q1\nq2"));
        assert!(out.json.is_none());

        let resp = response(serde_json::json!({"role": "assistant", "content": "  "}));
        assert!(matches!(
            read_response(resp, ResponseFormat::Text),
            Err(AiError::EmptyResponse(_))
        ));
    }
}
