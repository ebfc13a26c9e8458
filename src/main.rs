// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plantify: Plant Identification from Photos
//!
//! Command-line front end: capture or pick a photo, identify the plant and
//! browse the analysis history.

use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use plantify::acquisition::{
    capture_from_camera, pick_from_gallery, Acquisition, ImageUri, Interaction, SourceKind,
    TerminalInteraction,
};
use plantify::analysis::{AnalysisClient, AnalysisOutcome, AnalysisSettings, AnalysisState};
use plantify::config::{ApiCredential, AppConfig};
use plantify::history::{AnalysisRecord, FileKvStore, HistoryStore};
use plantify::openai::OpenAiClient;
use plantify::{PlantifyError, Result};

/// Plantify CLI - identify plants from photos
#[derive(Parser, Debug)]
#[command(name = "plantify")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Identify plants from photos with a vision language model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "plantify.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Grant camera and gallery access without asking
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Take a photo and identify the plant in it
    Capture,

    /// Pick an image from the gallery and identify the plant in it
    Pick {
        /// Image file to use instead of choosing from the gallery directory
        path: Option<PathBuf>,
    },

    /// Identify the plant in an existing image file
    Analyze {
        /// Image file or file:// URI
        image: String,
    },

    /// Show past analyses, newest first
    History {
        /// Number of entries to show
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show API and storage status
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "plantify.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // The API key may live in a .env file next to the config
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = AppConfig::load(&cli.config)?;
    check_config(&cli.command, &config)?;
    let interaction =
        TerminalInteraction::new(cli.yes || config.acquisition.assume_permission_granted);
    let output = Output { format: cli.format.clone(), quiet: cli.quiet };

    match cli.command {
        Commands::Capture => {
            let acquired = capture_from_camera(&config, &interaction).await;
            run_acquired(&config, acquired, SourceKind::Camera, &interaction, &output).await
        }
        Commands::Pick { path } => {
            let acquired = pick_from_gallery(&config, path, &interaction).await;
            run_acquired(&config, acquired, SourceKind::Gallery, &interaction, &output).await
        }
        Commands::Analyze { image } => {
            run_analysis(&config, ImageUri::parse(&image), &interaction, &output).await
        }
        Commands::History { count } => run_history(&config, count, &output).await,
        Commands::Config { action } => run_config_command(config, action, &cli.config),
        Commands::Status => run_status(&config).await,
    }
}

/// Commands that capture or analyze refuse to start on an invalid config
fn check_config(command: &Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Capture | Commands::Pick { .. } | Commands::Analyze { .. } => config.validate(),
        _ => Ok(()),
    }
}

/// How results are printed
struct Output {
    format: String,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == "json"
    }
}

/// "Analyzing..." line on stderr, erased on every exit path
struct LoadingLine<W: Write = std::io::Stderr> {
    out: W,
    enabled: bool,
    shown: bool,
}

impl LoadingLine {
    fn new(enabled: bool) -> Self {
        Self::with_writer(enabled, std::io::stderr())
    }
}

const LOADING_TEXT: &str = "Analyzing the plant, please wait...";
const ERASE_LINE: &str = "\r\x1b[2K";

impl<W: Write> LoadingLine<W> {
    fn with_writer(enabled: bool, out: W) -> Self {
        Self { out, enabled, shown: false }
    }

    fn update(&mut self, state: AnalysisState) {
        if !self.enabled {
            return;
        }
        if state == AnalysisState::Encoding && !self.shown {
            write!(self.out, "{}", LOADING_TEXT).ok();
            self.out.flush().ok();
            self.shown = true;
        } else if state.is_terminal() {
            self.clear();
        }
    }

    fn clear(&mut self) {
        if self.shown {
            write!(self.out, "{}", ERASE_LINE).ok();
            self.out.flush().ok();
            self.shown = false;
        }
    }
}

impl<W: Write> Drop for LoadingLine<W> {
    fn drop(&mut self) {
        self.clear();
    }
}

fn open_history(config: &AppConfig) -> HistoryStore<FileKvStore> {
    HistoryStore::new(
        FileKvStore::new(config.storage_dir()),
        config.storage.history_key.clone(),
    )
}

/// Continue from a camera or gallery acquisition into the analysis
async fn run_acquired(
    config: &AppConfig,
    acquired: Acquisition,
    source: SourceKind,
    interaction: &dyn Interaction,
    output: &Output,
) -> Result<ExitCode> {
    match acquired.into_result(source) {
        Ok(image) => {
            info!("Image ready: {}", image);
            run_analysis(config, image, interaction, output).await
        }
        Err(PlantifyError::Cancelled(kind)) => {
            eprintln!("{}", PlantifyError::Cancelled(kind).user_message());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!("Acquisition ended with {}", e.kind());
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Analyze one image, offering a manual retry on retry-eligible failures
async fn run_analysis(
    config: &AppConfig,
    image: ImageUri,
    interaction: &dyn Interaction,
    output: &Output,
) -> Result<ExitCode> {
    let history = Arc::new(open_history(config));
    let client = AnalysisClient::new(
        AnalysisSettings::from_config(config),
        ApiCredential::resolve(&config.api),
        history,
    )?;

    loop {
        let result = {
            let mut loading = LoadingLine::new(!output.quiet && std::io::stderr().is_terminal());
            client
                .analyze_with_progress(&image, |state| loading.update(state))
                .await
        };

        match result {
            Ok(outcome) => {
                print_outcome(&outcome, output);
                if let Err(e) = &outcome.persisted {
                    eprintln!("Warning: {}", e.user_message());
                }
                return Ok(ExitCode::SUCCESS);
            }
            Err(e) => {
                debug!("Analysis ended with {}", e.kind());
                eprintln!("{}", e.user_message());
                if e.is_retryable() && interaction.confirm("Try again?").await {
                    info!("Retrying analysis of {}", image);
                    continue;
                }
                return Ok(ExitCode::FAILURE);
            }
        }
    }
}

fn print_outcome(outcome: &AnalysisOutcome, output: &Output) {
    if output.json() {
        let value = json!({
            "image": outcome.record.image(),
            "result": outcome.text(),
            "timestamp": outcome.record.timestamp(),
            "placeholder": outcome.placeholder,
            "saved": outcome.persisted.is_ok(),
        });
        println!("{:#}", value);
    } else {
        println!("{}", outcome.text());
    }
}

fn format_record(record: &AnalysisRecord) -> String {
    format!(
        "{}  {}\n    {}",
        record.timestamp().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        record.image(),
        record.result().replace('\n', "\n    ")
    )
}

/// Print a snapshot of the history
async fn run_history(config: &AppConfig, count: Option<usize>, output: &Output) -> Result<ExitCode> {
    let history = open_history(config);

    let loaded = match count {
        Some(count) => history.get_recent(count).await,
        None => history.read_all().await,
    };
    let records = match loaded {
        Ok(records) => records,
        Err(e) => {
            warn!("Could not read history: {}", e);
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if output.json() {
        println!("{:#}", json!(records));
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        println!("No analysis history yet.");
        return Ok(ExitCode::SUCCESS);
    }

    for record in &records {
        println!("{}\n", format_record(record));
    }
    Ok(ExitCode::SUCCESS)
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<ExitCode> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| PlantifyError::Config(format!("Failed to serialize config: {}", e)))?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {}", config.api.model);
            println!("  Endpoint: {}", config.api.base_url);
            println!("  History: {:?}", config.storage_dir());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Run status check
async fn run_status(config: &AppConfig) -> Result<ExitCode> {
    println!("Plantify v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    let credential = ApiCredential::resolve(&config.api);
    match &credential {
        Some(_) => println!("API key: configured"),
        None => println!("API key: missing (set {})", config.api.api_key_env),
    }

    if let Some(credential) = credential {
        let client = OpenAiClient::new(&config.api.base_url, credential)?;
        match client.list_models().await {
            Ok(models) => {
                let available = models.iter().any(|m| m == &config.api.model);
                println!(
                    "Model {}: {}",
                    config.api.model,
                    if available { "available" } else { "not listed" }
                );
            }
            Err(e) => println!("Endpoint {}: Error - {}", client.base_url(), e),
        }
    }

    match open_history(config).read_all().await {
        Ok(records) => println!("History: {} entries in {:?}", records.len(), config.storage_dir()),
        Err(e) => println!("History: Error - {}", e),
    }

    Ok(ExitCode::SUCCESS)
}
