use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AiError;

// =============================================================================
// Provider + format selection
// =============================================================================

/// Which backend serves a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "vllm")]
    Vllm,
    #[serde(rename = "litellm")]
    Litellm,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::OpenAi => "openai",
            ClientKind::AzureOpenAi => "azure_openai",
            ClientKind::Anthropic => "anthropic",
            ClientKind::Vllm => "vllm",
            ClientKind::Litellm => "litellm",
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the provider is asked to shape its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonBeg,
    JsonObject,
    StructuredOutput,
    Tool,
}

impl ResponseFormat {
    pub fn wants_json(&self) -> bool {
        !matches!(self, ResponseFormat::Text)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonBeg => "json_beg",
            ResponseFormat::JsonObject => "json_object",
            ResponseFormat::StructuredOutput => "structured_output",
            ResponseFormat::Tool => "tool",
        }
    }
}

// =============================================================================
// Model parameters
// =============================================================================

fn default_max_tokens() -> u32 {
    400
}

fn default_use_cache() -> bool {
    true
}

/// Per-task model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub client: ClientKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl LlmSettings {
    pub fn new(client: ClientKind) -> Self {
        Self {
            client,
            model: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            response_format: ResponseFormat::Text,
            use_cache: default_use_cache(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Reject provider/format combinations the backend cannot serve.
    pub fn validate(&self) -> Result<(), AiError> {
        match (self.response_format, self.client) {
            (
                ResponseFormat::JsonObject,
                ClientKind::Vllm | ClientKind::Litellm | ClientKind::Anthropic,
            ) => {
                return Err(AiError::Config(format!(
                    "{} does not support json_object response format",
                    self.client
                )))
            }
            (ResponseFormat::StructuredOutput, ClientKind::Anthropic) => {
                return Err(AiError::Config(
                    "Anthropic does not support structured_output response format, use json_beg or tool instead"
                        .to_string(),
                ))
            }
            _ => {}
        }

        let needs_model = matches!(
            self.client,
            ClientKind::AzureOpenAi | ClientKind::Vllm | ClientKind::Litellm
        );
        if needs_model && self.model.as_deref().map_or(true, str::is_empty) {
            return Err(AiError::Config(format!(
                "{} requires an explicit model",
                self.client
            )));
        }

        Ok(())
    }

    pub fn model_or_default(&self) -> &str {
        if let Some(model) = self.model.as_deref().filter(|m| !m.is_empty()) {
            return model;
        }
        match self.client {
            ClientKind::Anthropic => crate::claude::DEFAULT_MODEL,
            _ => crate::openai::DEFAULT_MODEL,
        }
    }
}

// =============================================================================
// Prompt context
// =============================================================================

/// A JSON schema bound to a request, plus the instructions that go with it.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTool {
    pub schema_name: String,
    pub schema_description: String,
    pub instruction_string: String,
    pub json_schema: serde_json::Value,
}

/// One request to a completion backend.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub id: Uuid,
    /// Logical task name, e.g. `search_query_generation`.
    pub task: String,
    pub system: String,
    pub user: String,
    pub settings: LlmSettings,
    pub structured: Option<StructuredTool>,
    pub use_schema_instruction: bool,
}

impl PromptContext {
    pub fn new(
        task: impl Into<String>,
        settings: LlmSettings,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            system: system.into(),
            user: user.into(),
            settings,
            structured: None,
            use_schema_instruction: false,
        }
    }

    pub fn with_structured(mut self, tool: StructuredTool, use_schema_instruction: bool) -> Self {
        self.structured = Some(tool);
        self.use_schema_instruction = use_schema_instruction;
        self
    }

    /// System prompt as sent, with the schema instruction appended when requested.
    pub fn system_prompt(&self) -> String {
        match (&self.structured, self.use_schema_instruction) {
            (Some(tool), true) => {
                let schema = serde_json::to_string_pretty(&tool.json_schema).unwrap_or_default();
                format!(
                    "{}\n\n{}\n{}",
                    self.system, tool.instruction_string, schema
                )
            }
            _ => self.system.clone(),
        }
    }

    /// Rough token cost for rate limiting: prompt chars / 4 plus the completion budget.
    pub fn estimated_tokens(&self) -> u32 {
        let prompt_chars = self.system.len() + self.user.len();
        (prompt_chars / 4) as u32 + self.settings.max_tokens
    }
}

/// What came back for one context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmOutput {
    pub text: Option<String>,
    pub json: Option<serde_json::Value>,
}

impl LlmOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            json: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            text: None,
            json: Some(value),
        }
    }

    /// Build from a text body, parsing a JSON object out of it when one is wanted.
    pub fn from_text(text: String, wants_json: bool) -> Self {
        let json = if wants_json {
            crate::util::parse_json_object(&text)
        } else {
            None
        };
        Self {
            text: Some(text),
            json,
        }
    }

    /// Non-empty text content, if any.
    pub fn str_content(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}
