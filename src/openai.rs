// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Chat-completion API client for vision requests

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ApiCredential;
use crate::{PlantifyError, Result};

/// OpenAI-compatible API client
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    credential: ApiCredential,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Either an `error` payload or a list of choices; both may be absent
#[derive(Debug, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

impl ChatRequest {
    /// System instruction plus one user turn carrying text and a JPEG
    pub fn vision(
        model: &str,
        system: &str,
        instruction: &str,
        image_base64: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: instruction.to_string() },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{}", image_base64),
                            },
                        },
                    ]),
                },
            ],
            max_tokens,
        }
    }
}

/// Provider message from an error payload, or the payload itself
fn error_text(error: &serde_json::Value) -> Option<String> {
    match error {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        other => Some(
            other
                .get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

impl ChatResponse {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().and_then(error_text)
    }

    /// Content of the first choice, if it carries any text
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .as_ref()?
            .first()?
            .message
            .as_ref()?
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
    }
}

impl OpenAiClient {
    /// Create a new client for `base_url` (e.g. `https://api.openai.com/v1`)
    pub fn new(base_url: &str, credential: ApiCredential) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string();

        Ok(Self { client, base_url, credential })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a chat completion and decode the body whatever the status
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending vision request: model={}", request.model);

        let response = self.client
            .post(&url)
            .bearer_auth(self.credential.expose())
            .json(request)
            .send()
            .await?;

        debug!("Chat completion returned status {}", response.status());

        let body: ChatResponse = response.json().await?;
        Ok(body)
    }

    /// List models visible to the credential
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self.client
            .get(&url)
            .bearer_auth(self.credential.expose())
            .send()
            .await?;

        let models: ModelsResponse = response.json().await?;
        if let Some(message) = models.error.as_ref().and_then(error_text) {
            return Err(PlantifyError::Api(message));
        }
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vision_request_shape() {
        let request = ChatRequest::vision("gpt-4o", "Act as a plant expert.", "What is this?", "QUJD", 300);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Act as a plant expert."},
                    {"role": "user", "content": [
                        {"type": "text", "text": "What is this?"},
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}}
                    ]}
                ],
                "max_tokens": 300
            })
        );
    }

    #[test]
    fn test_error_message() {
        let response: ChatResponse =
            serde_json::from_value(json!({"error": {"message": "rate limited", "type": "requests"}})).unwrap();
        assert_eq!(response.error_message().as_deref(), Some("rate limited"));

        let response: ChatResponse = serde_json::from_value(json!({"error": {"code": 42}})).unwrap();
        assert_eq!(response.error_message().as_deref(), Some(r#"{"code":42}"#));

        let response: ChatResponse = serde_json::from_value(json!({"error": null, "choices": []})).unwrap();
        assert!(response.error_message().is_none());
    }

    #[test]
    fn test_first_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "A fern."}}]
        }))
        .unwrap();
        assert_eq!(response.first_content(), Some("A fern."));

        let response: ChatResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.first_content(), None);

        let response: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": ""}}]})).unwrap();
        assert_eq!(response.first_content(), None);

        let response: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": null}}]})).unwrap();
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_base_url_normalized() {
        let credential = ApiCredential::new("sk-test").unwrap();
        let client = OpenAiClient::new("https://api.openai.com/v1/chat/completions/", credential).unwrap();
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
    }
}
