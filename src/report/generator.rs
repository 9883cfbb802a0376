//! Evaluation report generation.
//!
//! This module renders an evaluation result as a Markdown report or as
//! pretty-printed JSON.

use crate::analysis::action_counts;
use crate::config::ReportConfig;
use crate::models::{
    ClarificationRequest, EvaluationResult, ImageFindings, IterationRecord, TextFindings,
};
use anyhow::Result;
use serde_json::Value;

/// Longest history output shown in the Markdown iteration table.
const HISTORY_OUTPUT_PREVIEW: usize = 80;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(result: &EvaluationResult, config: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Mammography Case Evaluation\n\n");

    output.push_str(&generate_summary_section(result));
    output.push_str(&generate_evaluation_section(&result.evaluation));

    if let Some(ref findings) = result.image_analysis {
        output.push_str(&generate_image_section(findings, config));
    }
    if let Some(ref findings) = result.text_analysis {
        output.push_str(&generate_text_section(findings, config));
    }

    output.push_str(&generate_recommendations_section(result));

    if let Some(ref request) = result.clarification {
        output.push_str(&generate_clarification_section(request));
    }

    if config.include_history {
        output.push_str(&generate_history_section(&result.history));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the summary section.
fn generate_summary_section(result: &EvaluationResult) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!("- **Status:** {}\n", result.status));
    section.push_str(&format!(
        "- **Confidence:** {:.2}\n",
        result.confidence_score
    ));
    section.push_str(&format!(
        "- **Urgency:** {} {}\n",
        result.urgency.emoji(),
        result.urgency
    ));
    section.push_str(&format!("- **Iterations:** {}\n", result.iterations_used));

    let counts = action_counts(&result.history);
    if !counts.is_empty() {
        let steps: Vec<String> = counts
            .iter()
            .map(|(action, count)| format!("{} × {}", action, count))
            .collect();
        section.push_str(&format!("- **Steps:** {}\n", steps.join(", ")));
    }

    section.push_str(&format!(
        "- **Evaluated:** {}\n",
        result.evaluated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if !result.urgent_flags.is_empty() {
        section.push_str("\n**Urgent flags:**\n\n");
        for flag in &result.urgent_flags {
            section.push_str(&format!("- ⚠️ {}\n", flag));
        }
    }
    section.push('\n');

    section
}

fn generate_evaluation_section(evaluation: &str) -> String {
    if evaluation.trim().is_empty() {
        return String::new();
    }

    format!("## Evaluation\n\n{}\n\n", evaluation.trim())
}

/// Generate the image analysis section.
fn generate_image_section(findings: &ImageFindings, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Image Analysis\n\n");
    section.push_str(&format!("*Image: {}*\n\n", findings.image_path.display()));

    if !findings.is_completed() {
        section.push_str(&format!(
            "Analysis failed: {}\n\n",
            findings.error.as_deref().unwrap_or("unknown error")
        ));
        section.push_str(&raw_block(&findings.raw_analysis, config));
        return section;
    }

    section.push_str(&bullet_list("Findings", &findings.findings));

    if !findings.breast_density.is_empty() {
        section.push_str(&format!(
            "**Breast density:** {}\n\n",
            findings.breast_density
        ));
    }
    if let Some(category) = findings.birads_category {
        section.push_str(&format!("**BI-RADS category:** {}\n\n", category));
    }
    if !findings.risk_assessment.is_empty() {
        section.push_str(&format!(
            "**Risk assessment:** {}\n\n",
            findings.risk_assessment
        ));
    }
    section.push_str(&format!(
        "**Model confidence:** {}\n\n",
        findings.confidence_level
    ));
    section.push_str(&raw_block(&findings.raw_analysis, config));

    section
}

/// Generate the clinical text analysis section.
fn generate_text_section(findings: &TextFindings, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Clinical Text Analysis\n\n");

    if !findings.is_completed() {
        section.push_str(&format!(
            "Analysis failed: {}\n\n",
            findings.error.as_deref().unwrap_or("unknown error")
        ));
        section.push_str(&raw_block(&findings.raw_analysis, config));
        return section;
    }

    if !findings.summary.is_empty() {
        section.push_str(&format!("{}\n\n", findings.summary));
    }

    section.push_str(&bullet_list("Key findings", &findings.key_findings));
    section.push_str(&bullet_list("Risk factors", &findings.risk_factors));
    section.push_str(&bullet_list("Symptoms", &findings.symptoms));

    section.push_str(&format!(
        "**Urgency:** {} {} | **Model confidence:** {}\n\n",
        findings.urgency_level.emoji(),
        findings.urgency_level,
        findings.confidence_level
    ));
    section.push_str(&raw_block(&findings.raw_analysis, config));

    section
}

/// Generate the recommendations section.
fn generate_recommendations_section(result: &EvaluationResult) -> String {
    if result.recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");
    for (i, rec) in result.recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, rec));
    }
    section.push('\n');

    section
}

fn generate_clarification_section(request: &ClarificationRequest) -> String {
    let mut section = String::new();

    section.push_str("## Additional Information Needed\n\n");
    section.push_str(&format!("{}\n\n", request.message));
    for field in &request.missing_fields {
        section.push_str(&format!("- [ ] {}\n", field));
    }
    section.push('\n');

    section
}

/// Generate the iteration history table.
fn generate_history_section(history: &[IterationRecord]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Iteration History\n\n");
    section.push_str("| # | Action | Result | Δ | Confidence | Output |\n");
    section.push_str("|:---:|:---|:---:|:---:|:---:|:---|\n");

    for record in history {
        section.push_str(&format!(
            "| {} | {} | {} | {:+.1} | {:.2} | {} |\n",
            record.index,
            record.action,
            if record.succeeded { "✅" } else { "❌" },
            record.confidence_delta,
            record.confidence_after,
            table_cell(&record.output)
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(
        "*Generated by mammagent. This evaluation is decision support only and must be \
         reviewed by a qualified clinician.*\n",
    );

    footer
}

fn bullet_list(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut list = format!("**{}:**\n\n", title);
    for item in items {
        list.push_str(&format!("- {}\n", item));
    }
    list.push('\n');
    list
}

fn raw_block(raw: &str, config: &ReportConfig) -> String {
    if !config.include_raw_analysis || raw.trim().is_empty() {
        return String::new();
    }

    format!(
        "<details>\n<summary>Raw model output</summary>\n\n```\n{}\n```\n</details>\n\n",
        raw.trim()
    )
}

/// Flatten and shorten text for a single Markdown table cell.
fn table_cell(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cell: String = flat.chars().take(HISTORY_OUTPUT_PREVIEW).collect();
    if flat.chars().count() > HISTORY_OUTPUT_PREVIEW {
        cell.push('…');
    }
    cell.replace('|', "\\|")
}

/// Generate a JSON report.
pub fn generate_json_report(result: &EvaluationResult, config: &ReportConfig) -> Result<String> {
    let mut value = serde_json::to_value(result)?;

    if let Value::Object(ref mut map) = value {
        if !config.include_history {
            map.remove("history");
        }
        if !config.include_raw_analysis {
            for key in ["image_analysis", "text_analysis"] {
                if let Some(Value::Object(findings)) = map.get_mut(key) {
                    findings.remove("raw_analysis");
                }
            }
        }
    }

    serde_json::to_string_pretty(&value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::extraction::{parse_image_findings, parse_text_findings};
    use crate::agent::state::ConversationState;
    use crate::llm::fake::{IMAGE_REPLY, TEXT_REPLY};
    use crate::models::{Action, EvaluationStatus, UrgencyLevel};
    use chrono::Utc;
    use std::path::Path;

    fn create_test_result() -> EvaluationResult {
        let mut state = ConversationState::new();
        state.record(Action::AnalyzeImage, IMAGE_REPLY.to_string(), true);
        state.record(Action::AnalyzeText, "Error: timed out | retry".to_string(), false);
        state.record(Action::AnalyzeText, TEXT_REPLY.to_string(), true);

        EvaluationResult {
            status: EvaluationStatus::Completed,
            confidence_score: state.confidence(),
            evaluation: "Summary: suspicious mass. Next steps: biopsy.".to_string(),
            image_analysis: Some(parse_image_findings(IMAGE_REPLY, Path::new("scan.jpg"))),
            text_analysis: Some(parse_text_findings(TEXT_REPLY)),
            recommendations: vec![
                "Recommend ultrasound-guided core biopsy".to_string(),
                "Consider genetic counseling".to_string(),
            ],
            urgency: UrgencyLevel::High,
            urgent_flags: vec!["Suspicious irregular mass".to_string()],
            clarification: None,
            iterations_used: state.history.len(),
            history: state.history,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let result = create_test_result();
        let markdown = generate_markdown_report(&result, &ReportConfig::default());

        assert!(markdown.contains("# Mammography Case Evaluation"));
        assert!(markdown.contains("- **Status:** Completed"));
        assert!(markdown.contains("- **Urgency:** 🔴 High"));
        assert!(markdown.contains("analyze_text × 2"));
        assert!(markdown.contains("## Evaluation"));
        assert!(markdown.contains("**BI-RADS category:** 4"));
        assert!(markdown.contains("## Clinical Text Analysis"));
        assert!(markdown.contains("1. Recommend ultrasound-guided core biopsy"));
        assert!(markdown.contains("## Iteration History"));
        assert!(!markdown.contains("## Additional Information Needed"));
        assert!(!markdown.contains("Raw model output"));
        assert!(markdown.contains("qualified clinician"));
    }

    #[test]
    fn test_markdown_respects_report_config() {
        let result = create_test_result();
        let config = ReportConfig {
            include_history: false,
            include_raw_analysis: true,
        };
        let markdown = generate_markdown_report(&result, &config);

        assert!(!markdown.contains("## Iteration History"));
        assert!(markdown.contains("Raw model output"));
    }

    #[test]
    fn test_clarification_section() {
        let mut result = create_test_result();
        result.status = EvaluationStatus::InsufficientInformation;
        result.clarification = Some(ClarificationRequest {
            message: "Additional information is required.".to_string(),
            missing_fields: vec!["patient age".to_string()],
            current_confidence: 0.4,
        });

        let markdown = generate_markdown_report(&result, &ReportConfig::default());
        assert!(markdown.contains("- **Status:** Insufficient information"));
        assert!(markdown.contains("## Additional Information Needed"));
        assert!(markdown.contains("- [ ] patient age"));
    }

    #[test]
    fn test_history_table_escapes_output() {
        let result = create_test_result();
        let section = generate_history_section(&result.history);

        assert!(section.contains("| 2 | analyze_text | ❌ | +0.0 | 0.30 | Error: timed out \\| retry |"));
        assert!(section.contains("| 3 | analyze_text | ✅ | +0.3 | 0.60 |"));
    }

    #[test]
    fn test_table_cell_truncates() {
        let long = "word ".repeat(40);
        let cell = table_cell(&long);
        assert_eq!(cell.chars().count(), HISTORY_OUTPUT_PREVIEW + 1);
        assert!(cell.ends_with('…'));
    }

    #[test]
    fn test_failed_findings_section() {
        let findings = ImageFindings::failed(
            "scan.jpg".into(),
            "not json".to_string(),
            "no JSON object in response".to_string(),
        );
        let section = generate_image_section(&findings, &ReportConfig::default());

        assert!(section.contains("Analysis failed: no JSON object in response"));
        assert!(!section.contains("BI-RADS"));
    }

    #[test]
    fn test_generate_json_report() {
        let result = create_test_result();
        let json = generate_json_report(&result, &ReportConfig::default()).unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["iterations_used"], 3);
        assert_eq!(value["history"].as_array().unwrap().len(), 3);
        assert!(value["image_analysis"].get("raw_analysis").is_none());
        assert!(value.get("clarification").is_none());
    }

    #[test]
    fn test_json_report_without_history() {
        let result = create_test_result();
        let config = ReportConfig {
            include_history: false,
            include_raw_analysis: true,
        };
        let json = generate_json_report(&result, &config).unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("history").is_none());
        assert!(value["text_analysis"]["raw_analysis"].is_string());
    }
}
