//! AIRA - AI research assistant
//!
//! A CLI tool that asks a local Ollama model to plan a research request,
//! then runs the planned literature, analysis and discussion stages and
//! writes a report.
//!
//! Exit codes:
//!   0 - Success (including answers that explain a problem, such as a
//!       missing dataset)
//!   1 - Runtime error (invalid arguments, unreadable dataset, report write
//!       failure)

mod analysis;
mod cli;
mod config;
mod dataset;
mod error;
mod llm;
mod models;
mod pipeline;
mod planner;
mod report;
mod resolver;
mod stages;
mod tools;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use dataset::Dataset;
use indicatif::{ProgressBar, ProgressStyle};
use llm::{OllamaClient, ReasoningClient};
use models::{ExportRef, ResponseEnvelope};
use pipeline::{DebugFlags, Pipeline, PipelineSettings};
use report::ReportMetadata;
use stages::{ArxivSource, LiteratureSource, PubMedSource};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
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

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("AIRA v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_request(args).await {
        error!("Request failed: {}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .aira.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, thresholds and literature defaults.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one request end to end and write the report.
async fn run_request(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let dataset = match args.dataset {
        Some(ref path) => {
            let dataset = Dataset::load(path, config.dataset.max_file_size_mb)
                .with_context(|| format!("Failed to load dataset {}", path.display()))?;
            info!(
                "Loaded dataset '{}' with {} rows and {} columns",
                dataset.name,
                dataset.row_count(),
                dataset.columns().len()
            );
            Some(dataset)
        }
        None => None,
    };

    let llm_config = config.model.to_llm_config();
    let timeout = Duration::from_secs(config.model.timeout_seconds);

    if !args.quiet {
        println!("🤖 AIRA research assistant");
        println!("   Model: {}", config.model.name);
        println!("   Ollama: {}", config.model.ollama_url);
        if let Some(ref dataset) = dataset {
            println!("   Dataset: {} ({} rows)", dataset.name, dataset.row_count());
        }
    }

    let client: Arc<dyn ReasoningClient> =
        Arc::new(OllamaClient::new(llm_config).context("Failed to build Ollama client")?);
    let pubmed = PubMedSource::new(&config.literature.pubmed_url, timeout)
        .context("Failed to build PubMed client")?;
    let arxiv = ArxivSource::new(&config.literature.arxiv_url, timeout)
        .context("Failed to build arXiv client")?;
    let sources: Vec<Box<dyn LiteratureSource>> = vec![Box::new(pubmed), Box::new(arxiv)];

    let pipeline = Pipeline::new(client, sources, PipelineSettings::from_config(&config));
    let debug_flags = DebugFlags {
        include_plan: args.debug_plan,
    };

    let spinner = progress_spinner(args.quiet);
    let envelope = pipeline
        .run(args.message(), dataset.as_ref(), debug_flags)
        .await;
    spinner.finish_and_clear();

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        message: args.message().to_string(),
        dataset: dataset.as_ref().map(|d| d.name.clone()),
        model_used: config.model.name.clone(),
        duration_seconds: duration,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&metadata, &envelope)?,
        OutputFormat::Markdown => report::generate_markdown_report(&metadata, &envelope),
    };

    let output_path = Path::new(&config.general.output);
    report::write_report(&output, output_path)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    if !args.quiet {
        print_summary(&envelope);
        println!("   Duration: {:.1}s", duration);
        println!("\n✅ Done! Report saved to: {}", output_path.display());
    }

    Ok(())
}

fn progress_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Planning and running your request...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Print the answer and any produced files.
fn print_summary(envelope: &ResponseEnvelope) {
    println!("\n{}\n", envelope.content.trim());

    if !envelope.visuals.is_empty() {
        println!("📊 Visuals:");
        for (label, path) in &envelope.visuals {
            println!("   {}: {}", label, path);
        }
    }

    if !envelope.exports.is_empty() {
        println!("📁 Exports:");
        for (kind, export) in &envelope.exports {
            match export {
                ExportRef::Single(path) => println!("   {}: {}", kind, path),
                ExportRef::Many(paths) => println!("   {}: {}", kind, paths.join(", ")),
            }
        }
    }

    let failed = envelope.steps.iter().filter(|s| !s.is_ok()).count();
    if failed > 0 {
        println!("⚠️  {} of {} analysis steps failed", failed, envelope.steps.len());
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
