//! Mammography image analysis through a vision-capable model.

use crate::agent::extraction::parse_image_findings;
use crate::error::ServiceError;
use crate::llm::{CompletionClient, CompletionRequest, CompletionTask, ImagePayload};
use crate::models::ImageFindings;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Sends a mammography image to the vision model and parses the findings.
pub struct ImageAnalyzer {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
}

impl ImageAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    /// Analyze one image. Malformed model output yields failed findings,
    /// not an error.
    pub async fn analyze(&self, image_path: &Path) -> Result<ImageFindings, ServiceError> {
        info!("Starting image analysis for: {}", image_path.display());

        let payload = encode_image(image_path).await?;
        debug!(
            "Encoded {} as {} ({} base64 bytes)",
            image_path.display(),
            payload.media_type,
            payload.data.len()
        );

        let request = CompletionRequest {
            task: CompletionTask::ImageAnalysis,
            model: self.model.clone(),
            system_prompt: IMAGE_SYSTEM_PROMPT.to_string(),
            user_prompt: IMAGE_USER_PROMPT.to_string(),
            image: Some(payload),
            max_tokens: Some(self.max_tokens),
            json_output: true,
        };

        let response = self.client.complete(&request).await?;
        let findings = parse_image_findings(&response, image_path);

        info!(
            "Image analysis finished with status {:?} ({} findings)",
            findings.status,
            findings.findings.len()
        );
        Ok(findings)
    }
}

/// Read and base64-encode an image file.
async fn encode_image(path: &Path) -> Result<ImagePayload, ServiceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ServiceError::Image {
            path: path.to_path_buf(),
            source,
        })?;

    if bytes.is_empty() {
        return Err(ServiceError::Image {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "image file is empty"),
        });
    }

    Ok(ImagePayload {
        media_type: media_type_for(path),
        data: STANDARD.encode(&bytes),
    })
}

/// Infer the image media type from the file extension.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

const IMAGE_SYSTEM_PROMPT: &str = r#"You are an expert radiologist specializing in mammography and breast imaging.

Analyze the mammography image and report:
1. Visible structures and tissues
2. Abnormalities such as masses, calcifications, asymmetries or architectural distortion
3. Breast density and tissue pattern
4. Risk assessment based on the findings
5. Recommendations for follow-up or additional imaging

If image quality is poor or findings are unclear, say so and lower your confidence.

Respond with ONE JSON object and nothing else, using exactly these keys:
{"findings": [string], "breast_density": string, "birads_category": integer 0-6 or null,
 "risk_assessment": string, "recommendations": [string],
 "confidence_level": "high" | "medium" | "low", "urgent_flags": [string]}"#;

const IMAGE_USER_PROMPT: &str = "Please analyze this mammography image and provide a comprehensive \
medical assessment. Focus on identifying any abnormalities, patterns, or concerning findings that \
require medical attention.";
