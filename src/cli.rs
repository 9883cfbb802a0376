//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Mammagent - ReAct case evaluation for mammography
///
/// Evaluates a clinical description, optionally with a mammogram image,
/// by iterating image analysis, text analysis, information requests and a
/// final synthesis until the confidence threshold is reached.
///
/// Examples:
///   mammagent --text "52-year-old female with palpable lump" --image scan.jpg
///   mammagent --example urgent_case --format json --output result.json
///   mammagent --case case.json --interactive
///   mammagent --list-examples
///   mammagent --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Clinical description of the case
    #[arg(
        short,
        long,
        value_name = "TEXT",
        required_unless_present_any = ["case", "example", "list_examples", "init_config"],
        conflicts_with_all = ["case", "example"]
    )]
    pub text: Option<String>,

    /// Mammogram image to analyze alongside the description
    ///
    /// Overrides the image named in a --case file.
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// JSON case file with `description`, optional `image` and `metadata`
    #[arg(long, value_name = "FILE", conflicts_with = "example")]
    pub case: Option<PathBuf>,

    /// Use a built-in clinical example as the description
    ///
    /// See --list-examples for the available names.
    #[arg(short, long, value_name = "NAME")]
    pub example: Option<String>,

    /// List the built-in clinical examples and exit
    #[arg(long)]
    pub list_examples: bool,

    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the chat completion API
    #[arg(long, value_name = "URL", env = "MAMMAGENT_API_URL")]
    pub api_url: Option<String>,

    /// Model for text analysis and the final synthesis
    #[arg(short, long, env = "MAMMAGENT_MODEL")]
    pub model: Option<String>,

    /// Model for image analysis
    #[arg(long, env = "MAMMAGENT_VISION_MODEL")]
    pub vision_model: Option<String>,

    /// Maximum ReAct iterations
    #[arg(long, value_name = "COUNT")]
    pub max_iterations: Option<usize>,

    /// Confidence needed to complete an evaluation (0.0 - 1.0)
    #[arg(long, value_name = "SCORE")]
    pub threshold: Option<f64>,

    /// Output file path for the report
    ///
    /// The report is printed to stdout when not set.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .mammagent.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ask for missing information on the terminal during the evaluation
    #[arg(long)]
    pub interactive: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 when the evaluation does not complete
    #[arg(long)]
    pub fail_on_incomplete: bool,

    /// Generate a default .mammagent.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config || self.list_examples {
            return Ok(());
        }

        if self.text.is_none() && self.case.is_none() && self.example.is_none() {
            return Err("One of --text, --case or --example is required".to_string());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("Threshold must be between 0.0 and 1.0".to_string());
            }
        }

        if self.max_iterations == Some(0) {
            return Err("Max iterations must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.interactive && self.quiet {
            return Err("Cannot use both --interactive and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref case) = self.case {
            if !case.is_file() {
                return Err(format!("Case file does not exist: {}", case.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
