//! Completion service boundary.
//!
//! Analyzers and the orchestrator talk to the model through the
//! [`CompletionClient`] trait; [`OpenAiClient`] is the production
//! implementation.

pub mod client;

#[cfg(test)]
pub mod fake;

pub use client::{ModelSettings, OpenAiClient};

use crate::error::ServiceError;
use async_trait::async_trait;

/// What a completion request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionTask {
    ImageAnalysis,
    TextAnalysis,
    Synthesis,
}

/// A base64-encoded image attached to a request.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub media_type: &'static str,
    pub data: String,
}

impl ImagePayload {
    /// Render as a `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub image: Option<ImagePayload>,
    pub max_tokens: Option<u32>,
    /// Ask the service for a JSON object response.
    pub json_output: bool,
}

/// Sends prompts to a completion service and returns the reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}
