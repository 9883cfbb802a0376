//! Structured extraction of analyzer findings from model output.
//!
//! The analyzers ask the model for a single JSON object. Every field is
//! optional here: missing or mistyped fields fall back to fixed values, and
//! output with no JSON object at all yields a failed findings object.

use crate::models::{
    AnalysisStatus, ConfidenceLevel, ImageFindings, TextFindings, UrgencyLevel,
};
use serde_json::Value;
use std::path::Path;

pub const MAX_FINDINGS: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 3;
pub const MAX_RISK_FACTORS: usize = 3;
pub const MAX_SYMPTOMS: usize = 5;
pub const MAX_URGENT_FLAGS: usize = 5;
pub const MAX_MISSING_FIELDS: usize = 5;

/// Highest valid BI-RADS assessment category.
const MAX_BIRADS: u64 = 6;

/// Locate and parse the JSON object in a model response.
///
/// Markdown code fences are searched first, then the outermost brace span
/// of the whole response.
pub fn extract_json_object(response: &str) -> Option<Value> {
    response
        .split("```")
        .skip(1)
        .step_by(2)
        .chain(std::iter::once(response))
        .find_map(parse_brace_span)
}

fn parse_brace_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Parse an image analysis response.
pub fn parse_image_findings(response: &str, image_path: &Path) -> ImageFindings {
    let Some(json) = extract_json_object(response) else {
        return ImageFindings::failed(
            image_path.to_path_buf(),
            response.to_string(),
            "Response did not contain a JSON object".to_string(),
        );
    };

    ImageFindings {
        status: AnalysisStatus::Completed,
        image_path: image_path.to_path_buf(),
        findings: string_list(&json, "findings", MAX_FINDINGS),
        breast_density: string_field(&json, "breast_density"),
        birads_category: birads_field(&json),
        risk_assessment: string_field(&json, "risk_assessment"),
        recommendations: string_list(&json, "recommendations", MAX_RECOMMENDATIONS),
        confidence_level: label_field(&json, "confidence_level")
            .map(ConfidenceLevel::from)
            .unwrap_or_default(),
        urgent_flags: string_list(&json, "urgent_flags", MAX_URGENT_FLAGS),
        raw_analysis: response.to_string(),
        error: None,
    }
}

/// Parse a clinical text analysis response.
pub fn parse_text_findings(response: &str) -> TextFindings {
    let Some(json) = extract_json_object(response) else {
        return TextFindings::failed(
            response.to_string(),
            "Response did not contain a JSON object".to_string(),
        );
    };

    TextFindings {
        status: AnalysisStatus::Completed,
        key_findings: string_list(&json, "key_findings", MAX_FINDINGS),
        risk_factors: string_list(&json, "risk_factors", MAX_RISK_FACTORS),
        symptoms: string_list(&json, "symptoms", MAX_SYMPTOMS),
        recommendations: string_list(&json, "recommendations", MAX_RECOMMENDATIONS),
        confidence_level: label_field(&json, "confidence_level")
            .map(ConfidenceLevel::from)
            .unwrap_or_default(),
        urgency_level: label_field(&json, "urgency_level")
            .map(UrgencyLevel::from)
            .unwrap_or_default(),
        summary: string_field(&json, "summary"),
        information_sufficient: json["information_sufficient"].as_bool().unwrap_or(true),
        missing_information: string_list(&json, "missing_information", MAX_MISSING_FIELDS),
        raw_analysis: response.to_string(),
        error: None,
    }
}

fn string_field(json: &Value, key: &str) -> String {
    json[key].as_str().map(|s| s.trim().to_string()).unwrap_or_default()
}

fn label_field<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json[key].as_str().filter(|s| !s.trim().is_empty())
}

/// Accepts an array of strings or a single string.
fn string_list(json: &Value, key: &str, limit: usize) -> Vec<String> {
    let items: Vec<String> = match &json[key] {
        Value::Array(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    items.into_iter().take(limit).collect()
}

/// Accepts `4`, `"4"`, `"4A"` or `"BI-RADS 4"`.
fn birads_field(json: &Value) -> Option<u8> {
    let value = match &json["birads_category"] {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()?
        }
        _ => return None,
    };

    (value <= MAX_BIRADS).then_some(value as u8)
}
