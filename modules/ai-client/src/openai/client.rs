use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::types::*;
use crate::error::AiError;

/// How the endpoint expects to be authenticated and addressed.
#[derive(Debug, Clone)]
pub(crate) enum Endpoint {
    /// `{base}/chat/completions` with a bearer token (OpenAI, vLLM, LiteLLM).
    Compatible { base_url: String },
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=`
    /// with an `api-key` header.
    Azure {
        endpoint: String,
        api_version: String,
    },
}

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: &str, endpoint: Endpoint) -> Self {
        Self {
            api_key: api_key.to_string(),
            http,
            endpoint,
        }
    }

    pub fn chat_url(&self, model: &str) -> String {
        match &self.endpoint {
            Endpoint::Compatible { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Endpoint::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                model,
                api_version
            ),
        }
    }

    fn headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        let invalid = |_| AiError::Config("API key is not a valid header value".to_string());
        match self.endpoint {
            Endpoint::Compatible { .. } => {
                if !self.api_key.is_empty() {
                    headers.insert(
                        AUTHORIZATION,
                        HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                            .map_err(invalid)?,
                    );
                }
            }
            Endpoint::Azure { .. } => {
                headers.insert("api-key", HeaderValue::from_str(&self.api_key).map_err(invalid)?);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        let url = self.chat_url(&request.model);

        debug!(model = %request.model, "OpenAI chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(AiError::Api { status, message });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        if let Some(usage) = &chat.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "OpenAI usage"
            );
        }

        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_url_trims_trailing_slash() {
        let client = OpenAiClient::new(
            reqwest::Client::new(),
            "",
            Endpoint::Compatible {
                base_url: "http://localhost:8000/v1/".to_string(),
            },
        );
        assert_eq!(
            client.chat_url("llama"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert!(client.headers().unwrap().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn azure_url_uses_deployment_and_api_key_header() {
        let client = OpenAiClient::new(
            reqwest::Client::new(),
            "azure-key",
            Endpoint::Azure {
                endpoint: "https://acme.openai.azure.com".to_string(),
                api_version: "2024-06-01".to_string(),
            },
        );
        assert_eq!(
            client.chat_url("gpt-4o"),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
        let headers = client.headers().unwrap();
        assert_eq!(headers.get("api-key").unwrap(), "azure-key");
        assert!(headers.get(AUTHORIZATION).is_none());
    }
}
