//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.mammagent.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".mammagent.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// ReAct loop settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for clinical text analysis.
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Vision-capable model used for image analysis.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Model used for the final synthesis.
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum tokens for an image analysis response.
    #[serde(default = "default_image_max_tokens")]
    pub image_max_tokens: u32,

    /// Maximum tokens for a text analysis response.
    #[serde(default = "default_text_max_tokens")]
    pub text_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            synthesis_model: default_synthesis_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            image_max_tokens: default_image_max_tokens(),
            text_max_tokens: default_text_max_tokens(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_text_model() -> String {
    "gpt-4o".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_synthesis_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

fn default_image_max_tokens() -> u32 {
    1000
}

fn default_text_max_tokens() -> u32 {
    800
}

/// ReAct loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard cap on loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Confidence at which the loop stops.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Descriptions shorter than this are treated as insufficient.
    #[serde(default = "default_min_description_words")]
    pub min_description_words: usize,

    /// Attempts per analyzer before the loop moves on.
    #[serde(default = "default_max_analyzer_attempts")]
    pub max_analyzer_attempts: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            min_description_words: default_min_description_words(),
            max_analyzer_attempts: default_max_analyzer_attempts(),
        }
    }
}

fn default_max_iterations() -> usize {
    5
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_min_description_words() -> usize {
    3
}

fn default_max_analyzer_attempts() -> usize {
    2
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the iteration history table.
    #[serde(default = "default_true")]
    pub include_history: bool,

    /// Include raw model output in Markdown reports.
    #[serde(default)]
    pub include_raw_analysis: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_history: true,
            include_raw_analysis: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_iterations == 0 {
            anyhow::bail!("orchestrator.max_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.orchestrator.confidence_threshold) {
            anyhow::bail!("orchestrator.confidence_threshold must be between 0.0 and 1.0");
        }
        if self.orchestrator.max_analyzer_attempts == 0 {
            anyhow::bail!("orchestrator.max_analyzer_attempts must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!("model.temperature must be between 0.0 and 2.0");
        }
        if self.model.timeout_seconds == 0 {
            anyhow::bail!("model.timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.model.api_url = url.clone();
        }
        if let Some(ref model) = args.model {
            self.model.text_model = model.clone();
            self.model.synthesis_model = model.clone();
        }
        if let Some(ref model) = args.vision_model {
            self.model.vision_model = model.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(max) = args.max_iterations {
            self.orchestrator.max_iterations = max;
        }
        if let Some(threshold) = args.threshold {
            self.orchestrator.confidence_threshold = threshold;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
