//! Findings aggregation.
//!
//! This module merges image and text findings into the cross-cutting
//! parts of an evaluation result: recommendations, urgency, urgent flags
//! and the fallback summary used when no synthesis succeeded.

use crate::models::{Action, Case, ImageFindings, IterationRecord, TextFindings, UrgencyLevel};
use std::collections::HashSet;

/// Merge recommendations from completed findings, image first, dropping
/// case-insensitive duplicates.
pub fn merge_recommendations(
    image: Option<&ImageFindings>,
    text: Option<&TextFindings>,
) -> Vec<String> {
    let image_recs = image
        .filter(|f| f.is_completed())
        .map(|f| f.recommendations.as_slice())
        .unwrap_or_default();
    let text_recs = text
        .filter(|f| f.is_completed())
        .map(|f| f.recommendations.as_slice())
        .unwrap_or_default();

    dedup_preserving_order(image_recs.iter().chain(text_recs))
}

/// Urgent flags reported by the image analysis, plus a flag when the
/// clinical text was rated high urgency.
pub fn collect_urgent_flags(
    image: Option<&ImageFindings>,
    text: Option<&TextFindings>,
) -> Vec<String> {
    let mut flags: Vec<String> = image
        .filter(|f| f.is_completed())
        .map(|f| f.urgent_flags.clone())
        .unwrap_or_default();

    if let Some(text) = text.filter(|f| f.is_completed()) {
        if text.urgency_level == UrgencyLevel::High {
            flags.push("Clinical history rated high urgency".to_string());
        }
    }

    dedup_preserving_order(flags.iter())
}

/// Urgency implied by image findings.
pub fn image_urgency(findings: &ImageFindings) -> UrgencyLevel {
    if !findings.is_completed() {
        return UrgencyLevel::Unknown;
    }

    match findings.birads_category {
        Some(4..=6) => UrgencyLevel::High,
        _ if !findings.urgent_flags.is_empty() => UrgencyLevel::High,
        Some(0) | Some(3) => UrgencyLevel::Medium,
        Some(1) | Some(2) => UrgencyLevel::Low,
        _ => UrgencyLevel::Unknown,
    }
}

/// The highest urgency across completed findings.
pub fn overall_urgency(image: Option<&ImageFindings>, text: Option<&TextFindings>) -> UrgencyLevel {
    let from_image = image.map(image_urgency).unwrap_or(UrgencyLevel::Unknown);
    let from_text = text
        .filter(|f| f.is_completed())
        .map(|f| f.urgency_level)
        .unwrap_or(UrgencyLevel::Unknown);

    from_image.max(from_text)
}

/// Compose an evaluation text locally from whatever findings exist.
pub fn fallback_summary(
    case: &Case,
    image: Option<&ImageFindings>,
    text: Option<&TextFindings>,
    confidence: f64,
) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Case: {}", case.description.trim()));

    match image {
        Some(f) if f.is_completed() => {
            if f.findings.is_empty() {
                lines.push("Image analysis: no abnormal findings reported.".to_string());
            } else {
                lines.push(format!("Image analysis: {}", f.findings.join("; ")));
            }
            if !f.risk_assessment.is_empty() {
                lines.push(format!("Image risk assessment: {}", f.risk_assessment));
            }
        }
        Some(_) => lines.push("Image analysis: unavailable (analysis failed).".to_string()),
        None if case.has_image() => lines.push("Image analysis: not performed.".to_string()),
        None => {}
    }

    match text {
        Some(f) if f.is_completed() => {
            if !f.summary.is_empty() {
                lines.push(format!("Clinical summary: {}", f.summary));
            } else if !f.key_findings.is_empty() {
                lines.push(format!("Clinical findings: {}", f.key_findings.join("; ")));
            }
            if !f.risk_factors.is_empty() {
                lines.push(format!("Risk factors: {}", f.risk_factors.join("; ")));
            }
        }
        Some(_) => lines.push("Clinical text analysis: unavailable (analysis failed).".to_string()),
        None => lines.push("Clinical text analysis: not performed.".to_string()),
    }

    lines.push(format!("Confidence: {:.2}", confidence));
    lines.join("\n")
}

/// Count steps per action, in loop action order.
pub fn action_counts(history: &[IterationRecord]) -> Vec<(Action, usize)> {
    [
        Action::AnalyzeImage,
        Action::AnalyzeText,
        Action::RequestInfo,
        Action::Finalize,
    ]
    .into_iter()
    .map(|action| (action, history.iter().filter(|r| r.action == action).count()))
    .filter(|(_, count)| *count > 0)
    .collect()
}

fn dedup_preserving_order<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|item| seen.insert(item.trim().to_lowercase()))
        .cloned()
        .collect()
}
