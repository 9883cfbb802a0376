//! Per-evaluation working state of the ReAct loop.

use crate::models::{Action, ImageFindings, IterationRecord, TextFindings, CONFIDENCE_SCALE};
use chrono::Utc;

/// Mutable state owned by the orchestrator for one evaluation.
///
/// A fresh value is created for every case; nothing carries over.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Running confidence in scale steps, always within [0, CONFIDENCE_SCALE].
    confidence_steps: i32,
    pub history: Vec<IterationRecord>,
    pub image_analyzed: bool,
    pub text_analyzed: bool,
    pub info_requested: bool,
    pub image_attempts: usize,
    pub text_attempts: usize,
    pub image_findings: Option<ImageFindings>,
    pub text_findings: Option<TextFindings>,
    /// Answers received for information requests.
    pub supplemental: Vec<String>,
    pub missing_information: Vec<String>,
    /// Synthesized evaluation text from a successful `finalize`.
    pub evaluation: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running confidence within [0, 1].
    pub fn confidence(&self) -> f64 {
        f64::from(self.confidence_steps) / f64::from(CONFIDENCE_SCALE)
    }

    /// Apply the action's delta (zero when the step failed) in whole steps,
    /// clamp, and append an iteration record.
    pub fn record(&mut self, action: Action, output: String, succeeded: bool) -> &IterationRecord {
        let steps = if succeeded {
            action.confidence_steps()
        } else {
            0
        };
        self.confidence_steps = (self.confidence_steps + steps).clamp(0, CONFIDENCE_SCALE);
        let delta = f64::from(steps) / f64::from(CONFIDENCE_SCALE);

        let index = self.history.len();
        self.history.push(IterationRecord {
            index: index + 1,
            action,
            output,
            succeeded,
            confidence_delta: delta,
            confidence_after: self.confidence(),
            timestamp: Utc::now(),
        });

        &self.history[index]
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    /// Keep new findings unless they would replace completed ones with a
    /// failed result.
    pub fn store_image_findings(&mut self, findings: ImageFindings) {
        let keep_existing = self.image_findings.as_ref().is_some_and(|f| f.is_completed())
            && !findings.is_completed();
        if !keep_existing {
            self.image_findings = Some(findings);
        }
    }

    /// Same policy as [`store_image_findings`](Self::store_image_findings).
    pub fn store_text_findings(&mut self, findings: TextFindings) {
        let keep_existing = self.text_findings.as_ref().is_some_and(|f| f.is_completed())
            && !findings.is_completed();
        if !keep_existing {
            self.text_findings = Some(findings);
        }
    }

    /// Record supplementary text and make the text analyzable again.
    pub fn add_supplemental(&mut self, info: String) {
        self.supplemental.push(info);
        self.text_analyzed = false;
        self.text_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisStatus;

    #[test]
    fn test_record_clamps_confidence() {
        let mut state = ConversationState::new();

        let record = state.record(Action::RequestInfo, "need more".to_string(), true);
        assert_eq!(record.confidence_after, 0.0);
        assert_eq!(record.index, 1);

        state.record(Action::AnalyzeImage, String::new(), true);
        state.record(Action::AnalyzeText, String::new(), true);
        state.record(Action::Finalize, String::new(), true);
        state.record(Action::Finalize, String::new(), true);
        assert_eq!(state.confidence(), 1.0);
        assert_eq!(state.iterations(), 5);
    }

    #[test]
    fn test_confidence_has_no_drift() {
        let mut state = ConversationState::new();
        state.record(Action::AnalyzeText, String::new(), true);
        state.record(Action::RequestInfo, String::new(), true);
        state.record(Action::AnalyzeText, String::new(), true);

        assert_eq!(state.confidence(), 0.4);
        assert!(state.confidence() >= 0.4);
        assert_eq!(state.history[2].confidence_after, 0.4);

        state.record(Action::RequestInfo, String::new(), true);
        state.record(Action::Finalize, String::new(), true);
        assert_eq!(state.confidence(), 0.6);
    }

    #[test]
    fn test_failed_step_has_zero_delta() {
        let mut state = ConversationState::new();
        let record = state.record(Action::AnalyzeText, "Error: timeout".to_string(), false);

        assert!(!record.succeeded);
        assert_eq!(record.confidence_delta, 0.0);
        assert_eq!(state.confidence(), 0.0);
    }

    #[test]
    fn test_failed_findings_do_not_replace_completed() {
        let mut state = ConversationState::new();
        let mut completed = TextFindings::failed(String::new(), String::new());
        completed.status = AnalysisStatus::Completed;
        completed.error = None;

        state.store_text_findings(completed.clone());
        state.store_text_findings(TextFindings::failed("garbage".to_string(), "bad".to_string()));
        assert_eq!(state.text_findings, Some(completed));
    }

    #[test]
    fn test_add_supplemental_reenables_text() {
        let mut state = ConversationState::new();
        state.text_analyzed = true;
        state.text_attempts = 2;

        state.add_supplemental("Age 52".to_string());
        assert!(!state.text_analyzed);
        assert_eq!(state.text_attempts, 0);
        assert_eq!(state.supplemental, vec!["Age 52"]);
    }
}
