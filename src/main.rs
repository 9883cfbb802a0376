//! Mammagent - ReAct orchestrator for mammography case evaluation
//!
//! A CLI tool that evaluates a clinical description, optionally with a
//! mammogram image, through an OpenAI-compatible completion service and
//! writes a Markdown or JSON evaluation report.
//!
//! Exit codes:
//!   0 - Success (evaluation finished, or no --fail-on-incomplete set)
//!   1 - Runtime error (invalid input, config, credential, etc.)
//!   2 - Evaluation did not complete and --fail-on-incomplete is set

mod agent;
mod analysis;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod report;
mod samples;

use agent::{Orchestrator, StdinInfoProvider};
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use llm::{ModelSettings, OpenAiClient};
use models::{Case, EvaluationResult};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config and --list-examples early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }
    if args.list_examples {
        print_examples();
        return Ok(());
    }

    // Initialize logging
    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Mammagent v{}", env!("CARGO_PKG_VERSION"));

    // Run the evaluation
    match run_evaluation(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Evaluation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .mammagent.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize models, thresholds and report contents.");
    Ok(())
}

/// Handle --list-examples.
fn print_examples() {
    println!("Built-in clinical examples:\n");
    for sample in samples::all() {
        let flat = sample.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let preview: String = flat.chars().take(70).collect();
        let ellipsis = if flat.chars().count() > 70 { "…" } else { "" };
        println!("  {:<24} {}{}", sample.name, preview, ellipsis);
    }
    println!("\nUse with: mammagent --example <NAME>");
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the complete evaluation workflow. Returns exit code (0 or 2).
async fn run_evaluation(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {:?}", config);

    // Step 1: Build the case
    let case = build_case(&args)?;

    // Step 2: Initialize the orchestrator
    let settings = ModelSettings::from_config(&config.model, args.api_key.clone());
    let client = OpenAiClient::new(settings).context("Failed to create completion client")?;

    if !args.quiet {
        eprintln!("🤖 Evaluating case...");
        eprintln!("   Text model: {}", config.model.text_model);
        if case.has_image() {
            eprintln!("   Vision model: {}", config.model.vision_model);
        }
        eprintln!(
            "   Max iterations: {} | Threshold: {:.2}",
            config.orchestrator.max_iterations, config.orchestrator.confidence_threshold
        );
    }

    let mut orchestrator = Orchestrator::new(
        Arc::new(client),
        &config.model,
        config.orchestrator.clone(),
    );
    if args.interactive {
        orchestrator = orchestrator.with_info_provider(Box::new(StdinInfoProvider::stdin()));
    }

    // Step 3: Run the ReAct loop
    let spinner = (!args.quiet && !args.interactive).then(create_spinner);
    let result = orchestrator.evaluate(&case).await;
    if let Some(ref pb) = spinner {
        pb.finish_and_clear();
    }
    let result = result.context("Invalid case")?;

    // Step 4: Render and save the report
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&result, &config.report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&result, &config.report),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", output),
    }

    if !args.quiet {
        print_summary(&result, start_time.elapsed(), args.output.as_deref());
    }

    // Check --fail-on-incomplete
    if args.fail_on_incomplete && !result.is_completed() {
        eprintln!(
            "\n⛔ Evaluation ended with status '{}'. Failing (exit code 2).",
            result.status
        );
        return Ok(2);
    }

    Ok(0)
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message("Running evaluation loop...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Print the evaluation summary to stderr.
fn print_summary(result: &EvaluationResult, elapsed: Duration, output: Option<&Path>) {
    eprintln!("\n📊 Evaluation Summary:");
    eprintln!("   Status: {}", result.status);
    eprintln!("   Confidence: {:.2}", result.confidence_score);
    eprintln!("   Urgency: {} {}", result.urgency.emoji(), result.urgency);
    eprintln!("   Iterations: {}", result.iterations_used);
    eprintln!("   Duration: {:.1}s", elapsed.as_secs_f64());

    if let Some(ref request) = result.clarification {
        eprintln!("   Missing: {}", request.missing_fields.join(", "));
    }

    if let Some(path) = output {
        eprintln!("\n✅ Evaluation complete! Report saved to: {}", path.display());
    }
}

/// Build the case from --case, --example or --text, plus --image.
fn build_case(args: &Args) -> Result<Case> {
    let mut case = if let Some(ref path) = args.case {
        info!("Loading case from: {}", path.display());
        Case::from_file(path)?
    } else if let Some(ref name) = args.example {
        let sample = samples::find(name).with_context(|| {
            format!(
                "Unknown example '{}'. Available: {}",
                name,
                samples::names()
            )
        })?;
        info!("Using built-in example: {}", sample.name);
        Case::new(sample.text, None)
    } else {
        Case::new(args.text.clone().unwrap_or_default(), None)
    };

    if let Some(ref image) = args.image {
        case.image = Some(image.clone());
    }

    Ok(case)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
