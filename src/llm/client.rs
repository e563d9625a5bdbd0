//! OpenAI-compatible LLM client.
//!
//! Works with any endpoint that serves `/v1/chat/completions` and
//! `/v1/embeddings`, including a local Ollama.

use crate::config::LlmConfig;
use crate::error::{CompassError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Chat role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// `/v1/chat/completions` body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// `/v1/chat/completions` reply.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// `/v1/embeddings` body.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Error body returned with a non-2xx status.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// A chat reply with its finish reason and usage.
#[derive(Debug)]
pub struct LlmResponse {
    /// Assistant text.
    pub content: String,
    /// `stop`, `length`, ...
    pub finish_reason: Option<String>,
    /// Not every server reports usage.
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Chat and embedding client for one endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Build a client; no request is made until first use.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/{}", base, path)
    }

    fn endpoint(&self) -> String {
        self.url("chat/completions")
    }

    fn embeddings_endpoint(&self) -> String {
        self.url("embeddings")
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        }
    }

    /// POST a JSON body and decode the JSON reply, mapping API errors.
    async fn post_json<B, R>(&self, url: String, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&text) {
                return Err(CompassError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(CompassError::LlmApi(format!(
                "Request failed ({}): {}",
                status, text
            )));
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Run one chat completion with the configured model.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: self.config.chat_model.clone(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let completion: ChatCompletionResponse = self.post_json(self.endpoint(), &request).await?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompassError::LlmApi("No choices in response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    /// One user prompt, optionally preceded by a system prompt; returns the text.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(messages).await?;
        Ok(response.content)
    }

    /// Embed a batch of texts with the configured embedding model.
    pub async fn embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with {}",
            texts.len(),
            self.config.embedding_model
        );

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse =
            self.post_json(self.embeddings_endpoint(), &request).await?;

        order_embeddings(response.data, texts.len())
    }

    /// Ask the chat model for a fixed reply to check the endpoint works.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'CodeCompass is ready!' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("ready") {
            Ok(())
        } else {
            Err(CompassError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

/// Put embeddings back in request order and check that none are missing.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(CompassError::LlmApi(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(base: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: base.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are helpful.");
        let user = Message::user("Hello!");

        assert!(matches!(sys.role, Role::System));
        assert!(matches!(user.role, Role::User));
    }

    #[test]
    fn test_endpoint_construction() {
        let client = client_for("http://localhost:11434/");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(
            client.embeddings_endpoint(),
            "http://localhost:11434/v1/embeddings"
        );

        let client2 = client_for("https://api.example.com");
        assert_eq!(
            client2.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_embedding_response_is_reordered() {
        let body = r#"{"data": [
            {"embedding": [0.2, 0.2], "index": 1},
            {"embedding": [0.1, 0.1], "index": 0}
        ]}"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let vectors = order_embeddings(response.data, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }

    #[test]
    fn test_embedding_response_count_mismatch() {
        let body = r#"{"data": [{"embedding": [0.1], "index": 0}]}"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert!(order_embeddings(response.data, 3).is_err());
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatCompletionRequest {
            model: "qwen2.5:7b".to_string(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            max_tokens: None,
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        // Unroutable base: any request would fail.
        let client = client_for("http://127.0.0.1:9");
        let vectors = client.embeddings(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
