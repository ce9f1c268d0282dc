// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Leafscan: plant-leaf health classifier
//!
//! Maintenance CLI over the same model, ledger and image store the web
//! server uses.

use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use leafscan::app::{open_history, AppContext};
use leafscan::classifier::onnx::OnnxClassifier;
use leafscan::classifier::Classifier;
use leafscan::config::AppConfig;
use leafscan::db::Database;
use leafscan::report::ReportGenerator;
use leafscan::{LeafscanError, Result};

/// Leafscan CLI - plant-leaf health classifier
#[derive(Parser, Debug)]
#[command(name = "leafscan")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Classify plant-leaf photos and manage the analysis history", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a local image file
    Classify {
        /// Image to classify
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Store the image and add the result to the history
        #[arg(long)]
        record: bool,
    },

    /// History operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Write the PDF report of the whole history
    Export {
        /// Output file
        #[arg(short, long, default_value = "report.pdf")]
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show model, database and storage status
    Status,

    /// Initialize a new Leafscan project
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent history entries
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Delete one record and its image
    Delete {
        /// Stored filename of the record
        filename: String,
    },

    /// Clear all history and stored images
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

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
        .init();

    let load_config = || AppConfig::load(&cli.config);

    match cli.command {
        Commands::Classify { path, format, record } => {
            run_classify(load_config()?, &path, &format, record).await
        }
        Commands::History { action } => run_history_command(load_config()?, action).await,
        Commands::Export { output } => run_export(load_config()?, &output),
        Commands::Config { action } => run_config_command(load_config()?, action, &cli.config),
        Commands::Status => run_status(load_config()?),
        Commands::Init { dir, force } => run_init(dir, force),
    }
}

/// Classify one file, optionally recording it like an upload
async fn run_classify(config: AppConfig, path: &Path, format: &str, record: bool) -> Result<()> {
    let bytes = std::fs::read(path)?;

    let (label, confidence, stored_as) = if record {
        let context = AppContext::from_config(config)?;
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let outcome = context.analyze(filename.as_deref(), bytes).await?;
        (outcome.class_name, outcome.confidence, Some(outcome.image_id))
    } else {
        let classifier = Arc::new(OnnxClassifier::load(&config.model)?);
        let result = tokio::task::spawn_blocking(move || classifier.classify_bytes(&bytes))
            .await
            .map_err(|e| LeafscanError::Inference(format!("Inference task failed: {}", e)))??;
        (result.class_name, result.confidence, None)
    };

    match format {
        "json" => {
            let output = serde_json::json!({
                "path": path.to_string_lossy(),
                "status": label,
                "confidence": confidence,
                "imageId": stored_as,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("{}: {} ({:.2}%)", path.display(), label, confidence);
            if let Some(name) = stored_as {
                println!("Recorded as {}", name);
            }
        }
    }

    Ok(())
}

/// Run history commands
async fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let history = open_history(&config)?;

    match action {
        HistoryCommands::List { count } => {
            let records = history.records()?;
            println!("Recent history ({} of {} entries):", records.len().min(count), records.len());
            for record in records.iter().take(count) {
                println!(
                    "  {}  {:<24} {:<32} {:>6.2}%",
                    record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    record.result,
                    record.filename,
                    record.confidence
                );
            }
        }
        HistoryCommands::Delete { filename } => {
            history.remove(&filename).await?;
            println!("Deleted {}", filename);
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear().await?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Render the report to a file
fn run_export(config: AppConfig, output: &Path) -> Result<()> {
    let history = open_history(&config)?;
    let records = history.records()?;
    let pdf = ReportGenerator::new(config.report.clone()).render(&records, history.store())?;
    std::fs::write(output, &pdf)?;
    println!("Exported {} records to {:?}", records.len(), output);
    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {} ({} classes)", config.model.path, config.model.classes.len());
            println!("  Database: {}", config.database.path);
            println!("  Images: {}", config.storage.upload_dir);
            println!("  Font: {}", config.report.font_path);
        }
    }

    Ok(())
}

/// Run status check
fn run_status(config: AppConfig) -> Result<()> {
    println!("Leafscan v{} Status", env!("CARGO_PKG_VERSION"));
    println!("====================");

    let model = Path::new(&config.model.path);
    if model.is_file() {
        println!("Model: {} ({} classes)", model.display(), config.model.classes.len());
    } else {
        println!("Model: ✗ not found at {}", model.display());
    }

    let font = Path::new(&config.report.font_path);
    if font.is_file() {
        println!("Report font: {}", font.display());
    } else {
        println!("Report font: ✗ not found at {} (export will fail)", font.display());
    }

    match Database::open(&config.database.path) {
        Ok(db) => {
            println!("\nDatabase ({}):", config.database.path);
            println!("  Records: {}", db.count()?);
            for (label, count) in db.label_counts()? {
                println!("    {}: {}", label, count);
            }
        }
        Err(e) => println!("\nDatabase: ✗ Error - {}", e),
    }

    match std::fs::read_dir(&config.storage.upload_dir) {
        Ok(entries) => {
            let files = entries.flatten().filter(|e| e.path().is_file()).count();
            println!("\nImages ({}): {} files", config.storage.upload_dir, files);
        }
        Err(e) => println!("\nImages: ✗ {} - {}", config.storage.upload_dir, e),
    }

    println!("\nServer: http://{}:{}", config.web.host, config.web.port);

    Ok(())
}

/// Initialize a new Leafscan project
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(LeafscanError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let config = AppConfig::default();
    for dir in [config.storage.upload_dir.as_str(), "fonts"] {
        std::fs::create_dir_all(target.join(dir))?;
    }
    config.save(&config_path)?;
    info!("Wrote {:?}", config_path);

    if !target.join(&config.model.path).exists() {
        warn!("No model at {:?} yet", target.join(&config.model.path));
    }

    println!("Leafscan initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - {}/", config.storage.upload_dir);
    println!("  - fonts/");
    println!("\nNext steps:");
    println!("  1. Copy the ONNX model to {}", config.model.path);
    println!("  2. Copy a Unicode TrueType font to {}", config.report.font_path);
    println!("  3. Start the server: leafscan-web");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["leafscan"]).is_err());
    }

    #[test]
    fn test_cli_classify_command() {
        let cli = Cli::try_parse_from([
            "leafscan", "classify", "/tmp/leaf.jpg", "--format", "json"
        ]).unwrap();

        match cli.command {
            Commands::Classify { path, format, record } => {
                assert_eq!(path, PathBuf::from("/tmp/leaf.jpg"));
                assert_eq!(format, "json");
                assert!(!record);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["leafscan", "classify", "a.jpg", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_history_commands() {
        let cli = Cli::try_parse_from(["leafscan", "history", "list", "-n", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History { action: HistoryCommands::List { count: 3 } }
        ));

        let cli = Cli::try_parse_from(["leafscan", "history", "delete", "leaf.jpg"]).unwrap();
        match cli.command {
            Commands::History { action: HistoryCommands::Delete { filename } } => {
                assert_eq!(filename, "leaf.jpg");
            }
            _ => panic!("Expected History Delete command"),
        }

        let cli = Cli::try_parse_from(["leafscan", "history", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History { action: HistoryCommands::Clear { force: false } }
        ));
    }

    #[test]
    fn test_cli_export_default_output() {
        let cli = Cli::try_parse_from(["leafscan", "--config", "alt.json", "export"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.json"));
        match cli.command {
            Commands::Export { output } => assert_eq!(output, PathBuf::from("report.pdf")),
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();
        assert!(dir.path().join("config.json").is_file());
        assert!(dir.path().join("images").is_dir());

        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
        run_init(Some(dir.path().to_path_buf()), true).unwrap();
    }
}
