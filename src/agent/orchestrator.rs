//! ReAct orchestrator for case evaluation.
//!
//! Each iteration runs Think (pick the next action from the current state),
//! Act (one analyzer call, information request, or synthesis) and Observe
//! (apply the action's confidence delta and record the step). The loop stops
//! when confidence reaches the threshold or the iteration cap is hit.

use crate::agent::image_analyzer::ImageAnalyzer;
use crate::agent::info::{InfoProvider, NoFurtherInfo};
use crate::agent::state::ConversationState;
use crate::agent::text_analyzer::TextAnalyzer;
use crate::analysis;
use crate::config::{ModelConfig, OrchestratorConfig};
use crate::error::CaseError;
use crate::llm::{CompletionClient, CompletionRequest, CompletionTask};
use crate::models::{
    word_count, Action, Case, ClarificationRequest, EvaluationResult, EvaluationStatus,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Requested when the text analysis does not name missing details.
const DEFAULT_MISSING_FIELDS: [&str; 4] = [
    "patient age",
    "symptom duration",
    "family history of breast cancer",
    "prior imaging results",
];

/// Result of one Act phase.
struct StepOutcome {
    output: String,
    succeeded: bool,
}

impl StepOutcome {
    fn success(output: String) -> Self {
        Self {
            output,
            succeeded: true,
        }
    }

    fn failure(output: String) -> Self {
        Self {
            output,
            succeeded: false,
        }
    }
}

/// Drives the evaluation loop over the image and text analyzers.
pub struct Orchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn CompletionClient>,
    image_analyzer: ImageAnalyzer,
    text_analyzer: TextAnalyzer,
    info_provider: Box<dyn InfoProvider>,
    synthesis_model: String,
}

impl Orchestrator {
    /// Create an orchestrator sharing one completion client between the
    /// analyzers and the synthesis step.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: &ModelConfig,
        config: OrchestratorConfig,
    ) -> Self {
        info!(
            "Initializing orchestrator (max {} iterations, threshold {:.2})",
            config.max_iterations, config.confidence_threshold
        );

        Self {
            image_analyzer: ImageAnalyzer::new(
                client.clone(),
                model.vision_model.clone(),
                model.image_max_tokens,
            ),
            text_analyzer: TextAnalyzer::new(
                client.clone(),
                model.text_model.clone(),
                model.text_max_tokens,
            ),
            client,
            config,
            info_provider: Box::new(NoFurtherInfo),
            synthesis_model: model.synthesis_model.clone(),
        }
    }

    /// Use a different source for supplementary information.
    pub fn with_info_provider(mut self, provider: Box<dyn InfoProvider>) -> Self {
        self.info_provider = provider;
        self
    }

    /// Evaluate one case.
    ///
    /// Only input validation can fail; service and parsing failures become
    /// zero-gain steps and the result carries whatever was gathered.
    pub async fn evaluate(&self, case: &Case) -> Result<EvaluationResult, CaseError> {
        case.validate()?;

        info!(
            "Starting evaluation (image: {})",
            if case.has_image() { "yes" } else { "no" }
        );

        let mut state = ConversationState::new();

        while state.iterations() < self.config.max_iterations {
            // Think
            let action = self.think(case, &state);
            debug!("Iteration {}: chose {}", state.iterations() + 1, action);

            // Act
            let outcome = self.act(action, case, &mut state).await;

            // Observe
            let record = state.record(action, outcome.output, outcome.succeeded);
            info!(
                "Iteration {}: {} {} (confidence {:.2})",
                record.index,
                record.action,
                if record.succeeded { "succeeded" } else { "failed" },
                record.confidence_after
            );

            if state.confidence() >= self.config.confidence_threshold {
                info!("Confidence threshold reached");
                break;
            }
        }

        Ok(self.build_result(case, state))
    }

    /// Pick the next action from the current state.
    fn think(&self, case: &Case, state: &ConversationState) -> Action {
        let attempts_left = |attempts: usize| attempts < self.config.max_analyzer_attempts;

        if case.has_image() && !state.image_analyzed && attempts_left(state.image_attempts) {
            return Action::AnalyzeImage;
        }

        if !state.text_analyzed && attempts_left(state.text_attempts) {
            return Action::AnalyzeText;
        }

        // The last iteration always produces an evaluation.
        let last_iteration = state.iterations() + 1 >= self.config.max_iterations;

        if !last_iteration
            && state.confidence() < self.config.confidence_threshold
            && self.needs_more_information(case, state)
        {
            return Action::RequestInfo;
        }

        Action::Finalize
    }

    /// Whether the gathered information is too thin for an evaluation.
    fn needs_more_information(&self, case: &Case, state: &ConversationState) -> bool {
        if state
            .image_findings
            .as_ref()
            .is_some_and(|f| f.is_completed())
        {
            return false;
        }

        let words = word_count(&case.description)
            + state.supplemental.iter().map(|s| word_count(s)).sum::<usize>();
        if words < self.config.min_description_words {
            return true;
        }

        state
            .text_findings
            .as_ref()
            .is_some_and(|f| f.is_completed() && !f.information_sufficient)
    }

    async fn act(&self, action: Action, case: &Case, state: &mut ConversationState) -> StepOutcome {
        match action {
            Action::AnalyzeImage => self.analyze_image(case, state).await,
            Action::AnalyzeText => self.analyze_text(case, state).await,
            Action::RequestInfo => self.request_info(state).await,
            Action::Finalize => self.finalize(case, state).await,
        }
    }

    async fn analyze_image(&self, case: &Case, state: &mut ConversationState) -> StepOutcome {
        state.image_attempts += 1;

        let Some(ref image) = case.image else {
            return StepOutcome::failure("Error: No image provided".to_string());
        };

        match self.image_analyzer.analyze(image).await {
            Ok(findings) => {
                let completed = findings.is_completed();
                let output = findings.raw_analysis.clone();
                if !completed {
                    warn!("Image analysis returned unparseable output");
                }
                state.image_analyzed |= completed;
                state.store_image_findings(findings);
                StepOutcome {
                    output,
                    succeeded: completed,
                }
            }
            Err(e) => {
                warn!("Image analysis failed: {}", e);
                StepOutcome::failure(format!("Error: {}", e))
            }
        }
    }

    async fn analyze_text(&self, case: &Case, state: &mut ConversationState) -> StepOutcome {
        state.text_attempts += 1;

        match self.text_analyzer.analyze(case, &state.supplemental).await {
            Ok(findings) => {
                let completed = findings.is_completed();
                let output = findings.raw_analysis.clone();
                if !completed {
                    warn!("Text analysis returned unparseable output");
                }
                state.text_analyzed |= completed;
                state.store_text_findings(findings);
                StepOutcome {
                    output,
                    succeeded: completed,
                }
            }
            Err(e) => {
                warn!("Text analysis failed: {}", e);
                StepOutcome::failure(format!("Error: {}", e))
            }
        }
    }

    async fn request_info(&self, state: &mut ConversationState) -> StepOutcome {
        let request = self.clarification_request(state);
        info!(
            "Requesting additional information: {}",
            request.missing_fields.join(", ")
        );

        state.info_requested = true;
        state.missing_information = request.missing_fields.clone();

        let mut output = format!(
            "{} Missing: {}",
            request.message,
            request.missing_fields.join(", ")
        );

        if let Some(answer) = self.info_provider.provide(&request).await {
            info!("Received additional information");
            output.push_str(&format!("\nReceived: {}", answer));
            state.add_supplemental(answer);
            state.missing_information.clear();
        }

        StepOutcome::success(output)
    }

    async fn finalize(&self, case: &Case, state: &mut ConversationState) -> StepOutcome {
        let request = CompletionRequest {
            task: CompletionTask::Synthesis,
            model: self.synthesis_model.clone(),
            system_prompt: SYNTHESIS_SYSTEM_PROMPT.to_string(),
            user_prompt: build_synthesis_prompt(case, state),
            image: None,
            max_tokens: None,
            json_output: false,
        };

        match self.client.complete(&request).await {
            Ok(evaluation) => {
                state.evaluation = Some(evaluation.clone());
                StepOutcome::success(evaluation)
            }
            Err(e) => {
                warn!("Final evaluation failed: {}", e);
                StepOutcome::failure(format!("Error: {}", e))
            }
        }
    }

    fn clarification_request(&self, state: &ConversationState) -> ClarificationRequest {
        let reported = state
            .text_findings
            .as_ref()
            .filter(|f| f.is_completed())
            .map(|f| f.missing_information.clone())
            .unwrap_or_default();

        let missing_fields = if reported.is_empty() {
            DEFAULT_MISSING_FIELDS.iter().map(|f| f.to_string()).collect()
        } else {
            reported
        };

        ClarificationRequest {
            message: "Additional information is required to complete the evaluation.".to_string(),
            missing_fields,
            current_confidence: state.confidence(),
        }
    }

    fn build_result(&self, case: &Case, state: ConversationState) -> EvaluationResult {
        let status = if state.confidence() >= self.config.confidence_threshold {
            EvaluationStatus::Completed
        } else if self.needs_more_information(case, &state) {
            EvaluationStatus::InsufficientInformation
        } else {
            EvaluationStatus::IterationCapReached
        };

        let image = state.image_findings.as_ref();
        let text = state.text_findings.as_ref();

        let clarification = (status == EvaluationStatus::InsufficientInformation)
            .then(|| self.clarification_request(&state));

        let mut recommendations = analysis::merge_recommendations(image, text);
        if let Some(ref request) = clarification {
            recommendations.push(format!(
                "Provide additional clinical information: {}",
                request.missing_fields.join(", ")
            ));
        }

        let evaluation = state.evaluation.clone().unwrap_or_else(|| {
            analysis::fallback_summary(case, image, text, state.confidence())
        });

        info!(
            "Evaluation finished: {} after {} iterations (confidence {:.2})",
            status,
            state.iterations(),
            state.confidence()
        );

        EvaluationResult {
            status,
            confidence_score: state.confidence(),
            evaluation,
            urgency: analysis::overall_urgency(image, text),
            urgent_flags: analysis::collect_urgent_flags(image, text),
            image_analysis: state.image_findings.clone(),
            text_analysis: state.text_findings.clone(),
            recommendations,
            clarification,
            iterations_used: state.history.len(),
            history: state.history,
            evaluated_at: Utc::now(),
        }
    }
}

/// Build the user prompt for the final synthesis.
fn build_synthesis_prompt(case: &Case, state: &ConversationState) -> String {
    let mut prompt = String::new();
    prompt.push_str("Final Evaluation Request:\n\n");
    prompt.push_str(&format!("Case description: {}\n", case.description.trim()));

    for info in &state.supplemental {
        prompt.push_str(&format!("Additional information: {}\n", info.trim()));
    }

    match state.image_findings {
        Some(ref f) if f.is_completed() => {
            prompt.push_str(&format!("Image findings: {}\n", f.findings.join("; ")));
            if !f.breast_density.is_empty() {
                prompt.push_str(&format!("Breast density: {}\n", f.breast_density));
            }
            if let Some(category) = f.birads_category {
                prompt.push_str(&format!("BI-RADS category: {}\n", category));
            }
            if !f.risk_assessment.is_empty() {
                prompt.push_str(&format!("Image risk assessment: {}\n", f.risk_assessment));
            }
        }
        _ => prompt.push_str("Image analysis: Not available\n"),
    }

    match state.text_findings {
        Some(ref f) if f.is_completed() => {
            prompt.push_str(&format!("Clinical summary: {}\n", f.summary));
            prompt.push_str(&format!("Key findings: {}\n", f.key_findings.join("; ")));
            prompt.push_str(&format!("Risk factors: {}\n", f.risk_factors.join("; ")));
            prompt.push_str(&format!("Symptoms: {}\n", f.symptoms.join("; ")));
            prompt.push_str(&format!("Urgency: {}\n", f.urgency_level));
        }
        _ => prompt.push_str("Text analysis: Not available\n"),
    }

    if !state.missing_information.is_empty() {
        prompt.push_str(&format!(
            "Still missing: {}\n",
            state.missing_information.join(", ")
        ));
    }

    prompt.push_str(&format!("Confidence score: {:.2}\n\n", state.confidence()));
    prompt.push_str(
        "Please provide a comprehensive medical evaluation including:\n\
         1. Summary of findings\n\
         2. Risk assessment\n\
         3. Recommendations\n\
         4. Next steps\n\n\
         Format your response as a structured medical report.",
    );

    prompt
}

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are a senior breast imaging specialist coordinating a multidisciplinary review.
You receive structured findings from an image analysis and a clinical text analysis.
Write a concise, structured evaluation. Do not invent findings that are not in the input.
When information is missing, say what is missing and how it affects the assessment.
This evaluation supports, and does not replace, review by a qualified clinician."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::info::tests::QueuedInfo;
    use crate::llm::fake::{
        ScriptedClient, IMAGE_REPLY, INSUFFICIENT_TEXT_REPLY, SYNTHESIS_REPLY, TEXT_REPLY,
    };
    use crate::models::UrgencyLevel;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn orchestrator(client: Arc<ScriptedClient>) -> Orchestrator {
        Orchestrator::new(client, &ModelConfig::default(), OrchestratorConfig::default())
    }

    fn image_case(dir: &TempDir, description: &str) -> Case {
        let path = dir.path().join("mammogram.jpg");
        std::fs::write(&path, b"jpeg-bytes").unwrap();
        Case::new(description, Some(path))
    }

    fn happy_client() -> Arc<ScriptedClient> {
        Arc::new(
            ScriptedClient::new()
                .reply(CompletionTask::ImageAnalysis, IMAGE_REPLY)
                .reply(CompletionTask::TextAnalysis, TEXT_REPLY)
                .reply(CompletionTask::Synthesis, SYNTHESIS_REPLY),
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[tokio::test]
    async fn test_image_and_text_complete_in_three_iterations() {
        let dir = TempDir::new().unwrap();
        let case = image_case(&dir, "Patient with suspicious mammogram findings");
        let client = happy_client();

        let result = orchestrator(client.clone()).evaluate(&case).await.unwrap();

        assert_eq!(result.status, EvaluationStatus::Completed);
        assert!(result.confidence_score >= 0.7);
        assert_close(result.confidence_score, 1.0);
        assert!(result.iterations_used <= 3);
        assert_eq!(
            result.history.iter().map(|r| r.action).collect::<Vec<_>>(),
            vec![Action::AnalyzeImage, Action::AnalyzeText, Action::Finalize]
        );
        assert_eq!(result.evaluation, SYNTHESIS_REPLY);
        assert_eq!(result.urgency, UrgencyLevel::High);
        assert!(result.image_analysis.is_some());
        assert!(result.text_analysis.is_some());
        assert!(result.clarification.is_none());
        assert_eq!(
            client.calls(),
            vec![
                CompletionTask::ImageAnalysis,
                CompletionTask::TextAnalysis,
                CompletionTask::Synthesis
            ]
        );
    }

    #[tokio::test]
    async fn test_text_only_case_completes() {
        let client = happy_client();
        let case = Case::new(
            "Patient reports new lump in right breast, family history of breast cancer",
            None,
        );

        let result = orchestrator(client).evaluate(&case).await.unwrap();

        assert_eq!(result.status, EvaluationStatus::Completed);
        assert_close(result.confidence_score, 0.7);
        assert_eq!(result.iterations_used, 2);
        assert_eq!(result.action_count(Action::AnalyzeImage), 0);
    }

    #[tokio::test]
    async fn test_minimal_text_requests_info() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply(CompletionTask::TextAnalysis, INSUFFICIENT_TEXT_REPLY)
                .reply(CompletionTask::Synthesis, SYNTHESIS_REPLY),
        );
        let case = Case::new("Breast pain", None);

        let result = orchestrator(client).evaluate(&case).await.unwrap();

        assert!(result.action_count(Action::RequestInfo) >= 1);
        let first_request = result
            .history
            .iter()
            .position(|r| r.action == Action::RequestInfo)
            .unwrap();
        let before = result.history[first_request - 1].confidence_after;
        assert!(result.history[first_request].confidence_after < before);

        assert_eq!(result.status, EvaluationStatus::InsufficientInformation);
        assert!(result.confidence_score < 0.7);
        let clarification = result.clarification.unwrap();
        assert_eq!(clarification.missing_fields[0], "patient age");
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.starts_with("Provide additional clinical information")));
    }

    #[tokio::test]
    async fn test_supplied_information_lifts_case() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply(CompletionTask::TextAnalysis, INSUFFICIENT_TEXT_REPLY)
                .reply(CompletionTask::TextAnalysis, TEXT_REPLY)
                .reply(CompletionTask::Synthesis, SYNTHESIS_REPLY),
        );
        let case = Case::new("Breast pain", None);
        let orchestrator = orchestrator(client.clone()).with_info_provider(Box::new(
            QueuedInfo::new(&["52-year-old female, lump noticed two weeks ago, mother had breast cancer"]),
        ));

        let result = orchestrator.evaluate(&case).await.unwrap();

        assert_eq!(
            result.history.iter().map(|r| r.action).collect::<Vec<_>>(),
            vec![
                Action::AnalyzeText,
                Action::RequestInfo,
                Action::AnalyzeText,
                Action::Finalize
            ]
        );
        assert_eq!(result.status, EvaluationStatus::Completed);
        assert_close(result.confidence_score, 0.8);

        let prompt = client
            .last_request(CompletionTask::TextAnalysis)
            .unwrap()
            .user_prompt;
        assert!(prompt.contains("lump noticed two weeks ago"));
    }

    #[tokio::test]
    async fn test_threshold_reached_after_request_info() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply(CompletionTask::TextAnalysis, INSUFFICIENT_TEXT_REPLY)
                .reply(CompletionTask::TextAnalysis, TEXT_REPLY),
        );
        let config = OrchestratorConfig {
            max_iterations: 3,
            confidence_threshold: 0.4,
            ..OrchestratorConfig::default()
        };
        let orchestrator = Orchestrator::new(client, &ModelConfig::default(), config)
            .with_info_provider(Box::new(QueuedInfo::new(&["52 years old, lump for two weeks"])));

        let result = orchestrator
            .evaluate(&Case::new("Breast pain", None))
            .await
            .unwrap();

        assert_eq!(
            result.history.iter().map(|r| r.action).collect::<Vec<_>>(),
            vec![Action::AnalyzeText, Action::RequestInfo, Action::AnalyzeText]
        );
        assert_eq!(result.confidence_score, 0.4);
        assert_eq!(result.status, EvaluationStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_failures_respect_cap() {
        let dir = TempDir::new().unwrap();
        let case = image_case(&dir, "Patient with suspicious mammogram findings");
        let client = Arc::new(
            ScriptedClient::new()
                .fail(CompletionTask::ImageAnalysis)
                .fail(CompletionTask::TextAnalysis)
                .fail(CompletionTask::Synthesis),
        );

        for cap in [1, 3, 5, 8] {
            let config = OrchestratorConfig {
                max_iterations: cap,
                ..OrchestratorConfig::default()
            };
            let orchestrator = Orchestrator::new(client.clone(), &ModelConfig::default(), config);
            let result = orchestrator.evaluate(&case).await.unwrap();

            assert!(result.iterations_used <= cap);
            assert_eq!(result.iterations_used, result.history.len());
            assert_eq!(result.status, EvaluationStatus::IterationCapReached);
            assert_close(result.confidence_score, 0.0);
            assert!(result.history.iter().all(|r| !r.succeeded));
            assert!(result.evaluation.contains("Image analysis: not performed."));
        }
    }

    #[tokio::test]
    async fn test_failed_analyzer_is_retried_then_skipped() {
        let dir = TempDir::new().unwrap();
        let case = image_case(&dir, "Patient with suspicious mammogram findings");
        let client = Arc::new(
            ScriptedClient::new()
                .fail(CompletionTask::ImageAnalysis)
                .reply(CompletionTask::TextAnalysis, TEXT_REPLY)
                .reply(CompletionTask::Synthesis, SYNTHESIS_REPLY),
        );

        let result = orchestrator(client).evaluate(&case).await.unwrap();

        assert_eq!(
            result.history.iter().map(|r| r.action).collect::<Vec<_>>(),
            vec![
                Action::AnalyzeImage,
                Action::AnalyzeImage,
                Action::AnalyzeText,
                Action::Finalize
            ]
        );
        assert_eq!(result.history[0].confidence_delta, 0.0);
        assert_eq!(result.status, EvaluationStatus::Completed);
        assert_close(result.confidence_score, 0.7);
    }

    #[tokio::test]
    async fn test_malformed_output_gives_no_gain() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply(CompletionTask::TextAnalysis, "Sorry, I can only answer in prose.")
                .reply(CompletionTask::Synthesis, SYNTHESIS_REPLY),
        );
        let case = Case::new("Patient reports new lump in right breast", None);

        let result = orchestrator(client).evaluate(&case).await.unwrap();

        assert_eq!(result.action_count(Action::AnalyzeText), 2);
        assert!(result.history[0].output.contains("prose"));
        assert!(!result.history[0].succeeded);
        assert_eq!(
            result.text_analysis.as_ref().map(|f| f.status),
            Some(crate::models::AnalysisStatus::Failed)
        );
        assert_eq!(result.history[1].confidence_after, 0.0);
        assert_eq!(result.history[2].action, Action::Finalize);
    }

    #[tokio::test]
    async fn test_identical_outputs_are_deterministic() {
        let case = Case::new("Patient reports new lump in right breast", None);

        let first = orchestrator(happy_client()).evaluate(&case).await.unwrap();
        let second = orchestrator(happy_client()).evaluate(&case).await.unwrap();

        assert_eq!(first.confidence_score, second.confidence_score);
        assert_eq!(first.iterations_used, second.iterations_used);
    }

    #[tokio::test]
    async fn test_evaluations_do_not_share_state() {
        let orchestrator = orchestrator(happy_client());
        let case = Case::new("Patient reports new lump in right breast", None);

        let first = orchestrator.evaluate(&case).await.unwrap();
        let second = orchestrator.evaluate(&case).await.unwrap();

        assert_eq!(first.iterations_used, second.iterations_used);
        assert_eq!(second.history[0].index, 1);
    }

    #[tokio::test]
    async fn test_invalid_case_is_rejected_before_loop() {
        let client = happy_client();
        let orchestrator = orchestrator(client.clone());

        let empty = orchestrator.evaluate(&Case::new("", None)).await;
        assert!(matches!(empty, Err(CaseError::EmptyDescription)));

        let missing = Case::new("Lump", Some(PathBuf::from("/nonexistent/mammogram.jpg")));
        assert!(matches!(
            orchestrator.evaluate(&missing).await,
            Err(CaseError::ImageNotFound(_))
        ));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_build_synthesis_prompt() {
        let case = Case::new("Breast pain", None);
        let mut state = ConversationState::new();
        state.missing_information = vec!["patient age".to_string()];
        state.record(Action::AnalyzeText, String::new(), true);

        let prompt = build_synthesis_prompt(&case, &state);
        assert!(prompt.contains("Case description: Breast pain"));
        assert!(prompt.contains("Image analysis: Not available"));
        assert!(prompt.contains("Still missing: patient age"));
        assert!(prompt.contains("Confidence score: 0.30"));
    }
}
