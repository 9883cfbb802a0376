//! Data models for case evaluation.
//!
//! This module contains the core data structures shared by the analyzers,
//! the orchestrator and the report generator: the submitted case, the
//! structured findings, loop iteration records and the final result.

use crate::error::CaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A case submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CaseFile")]
pub struct Case {
    /// Free-text clinical description.
    pub description: String,
    /// Optional mammography image path.
    pub image: Option<PathBuf>,
    /// Additional context forwarded to the text analyzer.
    pub metadata: BTreeMap<String, String>,
}

/// On-disk case layout. Unknown top-level keys are metadata too, and
/// metadata values may be any JSON type.
#[derive(Deserialize)]
struct CaseFile {
    #[serde(alias = "username")]
    description: String,
    #[serde(default, deserialize_with = "non_empty_path")]
    image: Option<PathBuf>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl From<CaseFile> for Case {
    fn from(file: CaseFile) -> Self {
        let metadata = file
            .extra
            .into_iter()
            .chain(file.metadata)
            .filter_map(|(key, value)| metadata_text(value).map(|text| (key, text)))
            .collect();

        Self {
            description: file.description,
            image: file.image,
            metadata,
        }
    }
}

/// Render a metadata value as prompt text. Nulls are dropped.
fn metadata_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn non_empty_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}

impl Case {
    /// Creates a case from a description and an optional image.
    pub fn new(description: impl Into<String>, image: Option<PathBuf>) -> Self {
        Self {
            description: description.into(),
            image,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[cfg(test)]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Loads a case from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CaseError> {
        let content = std::fs::read_to_string(path).map_err(|source| CaseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut case: Case = serde_json::from_str(&content).map_err(|source| CaseError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Relative image paths are relative to the case file.
        if let (Some(image), Some(dir)) = (case.image.take(), path.parent()) {
            case.image = Some(if image.is_relative() {
                dir.join(image)
            } else {
                image
            });
        }

        Ok(case)
    }

    /// Checks the case before any service call is made.
    pub fn validate(&self) -> Result<(), CaseError> {
        if self.description.trim().is_empty() {
            return Err(CaseError::EmptyDescription);
        }

        if let Some(ref image) = self.image {
            if !image.exists() {
                return Err(CaseError::ImageNotFound(image.clone()));
            }
            if !image.is_file() {
                return Err(CaseError::ImageNotAFile(image.clone()));
            }
            let size = std::fs::metadata(image).map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                return Err(CaseError::EmptyImage(image.clone()));
            }
        }

        Ok(())
    }

    /// Whether an image accompanies the case.
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Counts whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// An action the orchestrator can take in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AnalyzeImage,
    AnalyzeText,
    RequestInfo,
    Finalize,
}

/// Confidence is tracked in whole steps of this many per 1.0.
pub const CONFIDENCE_SCALE: i32 = 10;

impl Action {
    /// Confidence change applied when the action succeeds, in scale steps.
    pub fn confidence_steps(&self) -> i32 {
        match self {
            Action::AnalyzeImage => 3,
            Action::AnalyzeText => 3,
            Action::RequestInfo => -2,
            Action::Finalize => 4,
        }
    }

    /// Confidence change applied when the action succeeds.
    pub fn confidence_delta(&self) -> f64 {
        f64::from(self.confidence_steps()) / f64::from(CONFIDENCE_SCALE)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::AnalyzeImage => write!(f, "analyze_image"),
            Action::AnalyzeText => write!(f, "analyze_text"),
            Action::RequestInfo => write!(f, "request_info"),
            Action::Finalize => write!(f, "finalize"),
        }
    }
}

/// Confidence label reported by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    #[default]
    Medium,
    Low,
    Unknown,
}

impl From<&str> for ConfidenceLevel {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => ConfidenceLevel::High,
            "medium" | "moderate" => ConfidenceLevel::Medium,
            "low" => ConfidenceLevel::Low,
            _ => ConfidenceLevel::Unknown,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::High => write!(f, "High"),
            ConfidenceLevel::Medium => write!(f, "Medium"),
            ConfidenceLevel::Low => write!(f, "Low"),
            ConfidenceLevel::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Clinical urgency label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Unknown,
    Low,
    #[default]
    Medium,
    High,
}

impl From<&str> for UrgencyLevel {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "urgent" | "critical" => UrgencyLevel::High,
            "medium" | "moderate" => UrgencyLevel::Medium,
            "low" | "routine" => UrgencyLevel::Low,
            _ => UrgencyLevel::Unknown,
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrgencyLevel::High => write!(f, "High"),
            UrgencyLevel::Medium => write!(f, "Medium"),
            UrgencyLevel::Low => write!(f, "Low"),
            UrgencyLevel::Unknown => write!(f, "Unknown"),
        }
    }
}

impl UrgencyLevel {
    /// Returns an emoji representation of the urgency.
    pub fn emoji(&self) -> &'static str {
        match self {
            UrgencyLevel::High => "🔴",
            UrgencyLevel::Medium => "🟡",
            UrgencyLevel::Low => "🟢",
            UrgencyLevel::Unknown => "⚪",
        }
    }
}

/// Outcome of a single analyzer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

/// Structured findings extracted from an image analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFindings {
    pub status: AnalysisStatus,
    pub image_path: PathBuf,
    pub findings: Vec<String>,
    pub breast_density: String,
    /// BI-RADS assessment category (0-6) when the model reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birads_category: Option<u8>,
    pub risk_assessment: String,
    pub recommendations: Vec<String>,
    pub confidence_level: ConfidenceLevel,
    pub urgent_flags: Vec<String>,
    pub raw_analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageFindings {
    /// Creates a failed findings object that keeps the raw model text.
    pub fn failed(image_path: PathBuf, raw_analysis: String, error: String) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            image_path,
            findings: Vec::new(),
            breast_density: String::new(),
            birads_category: None,
            risk_assessment: String::new(),
            recommendations: Vec::new(),
            confidence_level: ConfidenceLevel::Unknown,
            urgent_flags: Vec::new(),
            raw_analysis,
            error: Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }
}

/// Structured findings extracted from a clinical text analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFindings {
    pub status: AnalysisStatus,
    pub key_findings: Vec<String>,
    pub risk_factors: Vec<String>,
    pub symptoms: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence_level: ConfidenceLevel,
    pub urgency_level: UrgencyLevel,
    pub summary: String,
    /// Whether the model judged the text sufficient for an evaluation.
    pub information_sufficient: bool,
    pub missing_information: Vec<String>,
    pub raw_analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TextFindings {
    /// Creates a failed findings object that keeps the raw model text.
    pub fn failed(raw_analysis: String, error: String) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            key_findings: Vec::new(),
            risk_factors: Vec::new(),
            symptoms: Vec::new(),
            recommendations: Vec::new(),
            confidence_level: ConfidenceLevel::Unknown,
            urgency_level: UrgencyLevel::Unknown,
            summary: String::new(),
            information_sufficient: true,
            missing_information: Vec::new(),
            raw_analysis,
            error: Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }
}

/// One step of the ReAct loop. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based position in the history.
    pub index: usize,
    pub action: Action,
    /// Raw model output, the information request, or the error text.
    pub output: String,
    pub succeeded: bool,
    /// Delta actually applied (zero for failed steps).
    pub confidence_delta: f64,
    pub confidence_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Terminal status of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Confidence reached the threshold.
    Completed,
    /// The cap was reached while more case information was needed.
    InsufficientInformation,
    /// The cap was reached with partial findings.
    IterationCapReached,
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Completed => write!(f, "Completed"),
            EvaluationStatus::InsufficientInformation => write!(f, "Insufficient information"),
            EvaluationStatus::IterationCapReached => write!(f, "Iteration cap reached"),
        }
    }
}

/// Request for more case information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub message: String,
    pub missing_fields: Vec<String>,
    pub current_confidence: f64,
}

/// The final output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub status: EvaluationStatus,
    pub confidence_score: f64,
    pub evaluation: String,
    pub image_analysis: Option<ImageFindings>,
    pub text_analysis: Option<TextFindings>,
    pub recommendations: Vec<String>,
    pub urgency: UrgencyLevel,
    pub urgent_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationRequest>,
    pub iterations_used: usize,
    pub history: Vec<IterationRecord>,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    /// Whether the loop ended by reaching the confidence threshold.
    pub fn is_completed(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }

    /// Number of recorded steps taking the given action.
    #[cfg(test)]
    pub fn action_count(&self, action: Action) -> usize {
        self.history.iter().filter(|r| r.action == action).count()
    }
}
