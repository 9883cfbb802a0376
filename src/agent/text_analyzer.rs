//! Clinical text analysis through a text model.

use crate::agent::extraction::parse_text_findings;
use crate::error::ServiceError;
use crate::llm::{CompletionClient, CompletionRequest, CompletionTask};
use crate::models::{Case, TextFindings};
use std::sync::Arc;
use tracing::info;

/// Sends the case text to the text model and parses the findings.
pub struct TextAnalyzer {
    client: Arc<dyn CompletionClient>,
    model: String,
    max_tokens: u32,
}

impl TextAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    /// Analyze the case description together with any information
    /// supplied after an info request.
    pub async fn analyze(
        &self,
        case: &Case,
        supplemental: &[String],
    ) -> Result<TextFindings, ServiceError> {
        let preview: String = case.description.chars().take(50).collect();
        info!("Starting text analysis for input: {}...", preview);

        let request = CompletionRequest {
            task: CompletionTask::TextAnalysis,
            model: self.model.clone(),
            system_prompt: TEXT_SYSTEM_PROMPT.to_string(),
            user_prompt: build_text_prompt(case, supplemental),
            image: None,
            max_tokens: Some(self.max_tokens),
            json_output: true,
        };

        let response = self.client.complete(&request).await?;
        let findings = parse_text_findings(&response);

        info!(
            "Text analysis finished with status {:?} (urgency {})",
            findings.status, findings.urgency_level
        );
        Ok(findings)
    }
}

/// Build the user prompt for a text analysis.
pub fn build_text_prompt(case: &Case, supplemental: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Please analyze the following medical text and provide a comprehensive assessment:\n\n");
    prompt.push_str(case.description.trim());
    prompt.push_str("\n");

    if !case.metadata.is_empty() {
        prompt.push_str("\nAdditional context:\n");
        for (key, value) in &case.metadata {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }

    if !supplemental.is_empty() {
        prompt.push_str("\nAdditional information provided on request:\n");
        for info in supplemental {
            prompt.push_str(&format!("- {}\n", info.trim()));
        }
    }

    prompt
}

const TEXT_SYSTEM_PROMPT: &str = r#"You are an expert medical professional specializing in breast health and mammography.

Analyze the clinical text and report:
1. Key medical findings and abnormalities
2. Risk factors and concerning patterns
3. Symptoms and clinical indicators
4. Recommendations for follow-up or additional evaluation
5. Whether the text contains enough information for a clinical evaluation, and if not, which details are missing

Respond with ONE JSON object and nothing else, using exactly these keys:
{"key_findings": [string], "risk_factors": [string], "symptoms": [string],
 "recommendations": [string], "confidence_level": "high" | "medium" | "low",
 "urgency_level": "high" | "medium" | "low", "summary": string (2-3 sentences),
 "information_sufficient": boolean, "missing_information": [string]}"#;
