//! OpenAI-compatible chat completions client.

use crate::error::ServiceError;
use crate::llm::{CompletionClient, CompletionRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the completion service.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl ModelSettings {
    /// Build settings from the config file section and a credential.
    pub fn from_config(config: &crate::config::ModelConfig, api_key: Option<String>) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key,
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

/// Chat completions API request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat completions API response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    settings: ModelSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client. Fails fast when no credential is configured.
    pub fn new(settings: ModelSettings) -> Result<Self, ServiceError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingCredential)?;

        info!(
            "Initializing completion client for {} (key {})",
            settings.api_url,
            mask_key(&api_key)
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Client(e.to_string()))?;

        Ok(Self {
            settings,
            api_key,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let body = build_chat_request(request, self.settings.temperature);

        debug!(
            "Sending {:?} request to model {}",
            request.task, request.model
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.settings.timeout_seconds)
                } else if e.is_connect() {
                    ServiceError::Connect(self.settings.api_url.clone())
                } else {
                    ServiceError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        extract_content(chat_response)
    }
}

fn build_chat_request(request: &CompletionRequest, temperature: f32) -> ChatRequest<'_> {
    let user_content = match request.image {
        Some(ref image) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: &request.user_prompt,
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            },
        ]),
        None => MessageContent::Text(&request.user_prompt),
    };

    ChatRequest {
        model: &request.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(&request.system_prompt),
            },
            ChatMessage {
                role: "user",
                content: user_content,
            },
        ],
        temperature,
        max_tokens: request.max_tokens,
        response_format: request.json_output.then_some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

fn extract_content(response: ChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ServiceError::InvalidResponse("response has no message content".to_string()))
}

/// Mask a credential for logging.
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(7).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionTask, ImagePayload};
    use serde_json::json;

    fn settings(api_key: Option<&str>) -> ModelSettings {
        ModelSettings {
            api_url: "https://api.example.com/v1/".to_string(),
            api_key: api_key.map(String::from),
            temperature: 0.1,
            timeout_seconds: 30,
        }
    }

    fn request(image: Option<ImagePayload>) -> CompletionRequest {
        CompletionRequest {
            task: CompletionTask::ImageAnalysis,
            model: "vision-model".to_string(),
            system_prompt: "system".to_string(),
            user_prompt: "analyze".to_string(),
            image,
            max_tokens: Some(1000),
            json_output: true,
        }
    }

    #[test]
    fn test_missing_credential_fails_fast() {
        assert!(matches!(
            OpenAiClient::new(settings(None)),
            Err(ServiceError::MissingCredential)
        ));
        assert!(matches!(
            OpenAiClient::new(settings(Some("  "))),
            Err(ServiceError::MissingCredential)
        ));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = OpenAiClient::new(settings(Some("sk-test"))).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_text_request_shape() {
        let req = request(None);
        let value = serde_json::to_value(build_chat_request(&req, 0.1)).unwrap();

        assert_eq!(value["model"], "vision-model");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "analyze");
        assert_eq!(value["response_format"], json!({"type": "json_object"}));
        assert_eq!(value["max_tokens"], 1000);
    }

    #[test]
    fn test_image_request_shape() {
        let req = request(Some(ImagePayload {
            media_type: "image/png",
            data: "AAAA".to_string(),
        }));
        let value = serde_json::to_value(build_chat_request(&req, 0.1)).unwrap();

        let parts = &value["messages"][1]["content"];
        assert_eq!(parts[0], json!({"type": "text", "text": "analyze"}));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_extract_content() {
        let ok: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}}]
        }))
        .unwrap();
        assert_eq!(extract_content(ok).unwrap(), "{}");

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            extract_content(empty),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-abcd...");
        assert_eq!(mask_key("abc"), "abc...");
    }
}
