//! OpenAI-compatible chat completion client.
//!
//! Works against api.openai.com or any server exposing `/chat/completions`
//! (vLLM, llama.cpp, LM Studio, Ollama's OpenAI endpoint).

use std::env;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, CompletionRequest};
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAIClient {
    /// Create client from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Configuration("OPENAI_API_KEY is not set".to_string()))?;
        let mut client = Self::new(api_key)?;

        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            if !base_url.trim().is_empty() {
                client = client.with_base_url(base_url);
            }
        }
        if let Ok(model) = env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                client = client.with_model(model);
            }
        }
        Ok(client)
    }

    /// Create client with API key.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("OPENAI_API_KEY is empty".to_string()));
        }

        Ok(Self {
            http: build_http(DEFAULT_TIMEOUT_SECS)?,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Result<Self> {
        self.http = build_http(secs)?;
        self.timeout_secs = secs;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
        };

        debug!(model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout_secs)
                } else {
                    Error::LlmError(format!("OpenAI request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::LlmError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::LlmError(format!("OpenAI error {}: {}", status, text)));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::LlmError(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::LlmError("Empty response from OpenAI".to_string()))
    }
}

impl ChatModel for OpenAIClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(request.messages.len() + 1);
            if !request.system_prompt.is_empty() {
                messages.push(ChatMessage::system(request.system_prompt));
            }
            messages.extend(request.messages);

            self.chat_completion(messages, &self.model, request.temperature, request.max_tokens)
                .await
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn build_http(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("biomed_graph/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Configuration(format!("HTTP client error: {}", e)))
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_key() {
        let err = OpenAIClient::new("   ").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = OpenAIClient::new("k").unwrap().with_base_url("http://localhost:8000/v1/");
        assert_eq!(client.base_url(), "http://localhost:8000/v1");
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    fn client(server: &MockServer) -> OpenAIClient {
        OpenAIClient::new("test_key")
            .expect("client")
            .with_base_url(server.base_url())
    }

    #[tokio::test]
    async fn chat_completion_returns_first_choice_content() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer test_key");
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "  Hello!\n" } }
                ]
            }));
        });

        let reply = client(&server)
            .chat_completion(vec![ChatMessage::user("Hi")], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap();

        assert_eq!(reply, "Hello!");
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_non_success_status() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let err = client(&server)
            .chat_completion(vec![], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("OpenAI error 429"));
        assert!(msg.contains("rate limited"));
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_invalid_json() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("not json");
        });

        let err = client(&server)
            .chat_completion(vec![], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid response"));
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_empty_choices() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let err = client(&server)
            .chat_completion(vec![], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Empty response from OpenAI"));
    }

    #[tokio::test]
    async fn chat_completion_returns_error_on_missing_message_content() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": null } }
                ]
            }));
        });

        let err = client(&server)
            .chat_completion(vec![], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Empty response from OpenAI"));
    }

    #[tokio::test]
    async fn complete_prepends_system_prompt_and_uses_configured_model() {
        let server = MockServer::start_async().await;

        let completion_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("\"role\":\"system\"")
                    && body.contains("extract relations")
                    && body.contains("\"model\":\"local-model\"")
            });
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "[]" } }
                ]
            }));
        });

        let model = client(&server).with_model("local-model");
        let reply = model
            .complete(CompletionRequest {
                system_prompt: "extract relations".to_string(),
                messages: vec![ChatMessage::user("abstract")],
                temperature: 0.1,
                max_tokens: 1500,
            })
            .await
            .unwrap();

        assert_eq!(reply, "[]");
        completion_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "choices": [] }));
        });

        let err = client(&server)
            .with_timeout(1)
            .unwrap()
            .chat_completion(vec![], "gpt-4o-mini", 0.2, 32)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(1)));
    }
}
