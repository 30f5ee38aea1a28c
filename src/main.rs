//! # Sacks CLI
//!
//! Command-line entry point for the supplier price-list ingestion engine.
//!
//! ## Usage
//!
//! ```bash
//! # Process one or more supplier files
//! sacks process /in/chk_2025-01.xlsx /in/acme_feb.csv
//!
//! # Validate a configuration directory
//! sacks validate-config ./supplier-formats
//! ```
//!
//! Exit codes: 0 ok, 2 duplicate offer, 3 validation error, 4 config
//! error, 1 anything else. With several files the worst code wins.

use clap::{Parser, Subcommand};
use sacks::config::AppConfig;
use sacks::formats::ConfigurationStore;
use sacks::grid::GridReaderRegistry;
use sacks::processor::{FileProcessor, ProcessingResult, ProcessingStatus};
use sacks::store::file::FileStore;
use sacks::store::memory::MemoryStore;
use sacks::store::CatalogStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sacks", version, about = "Supplier price-list ingestion engine")]
struct Cli {
    /// Configuration directory (overrides SACKS_CONFIG_DIR and discovery)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one or more supplier files
    Process {
        /// Absolute paths to the input files
        paths: Vec<PathBuf>,
    },
    /// Parse and validate all configuration documents in a directory
    ValidateConfig {
        dir: PathBuf,
    },
}

const EXIT_OK: u8 = 0;
const EXIT_OTHER: u8 = 1;
const EXIT_DUPLICATE_OFFER: u8 = 2;
const EXIT_VALIDATION: u8 = 3;
const EXIT_CONFIG: u8 = 4;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn exit_code_for(result: &ProcessingResult) -> u8 {
    match result.status {
        ProcessingStatus::Ok => EXIT_OK,
        ProcessingStatus::DuplicateOffer => EXIT_DUPLICATE_OFFER,
        ProcessingStatus::Canceled => EXIT_OTHER,
        ProcessingStatus::Failed => {
            match result.errors.first() {
                Some(e) if e.starts_with("ArgumentError") || e.starts_with("ValidationError") => {
                    EXIT_VALIDATION
                }
                Some(e) if e.starts_with("ConfigError") => EXIT_CONFIG,
                _ => EXIT_OTHER,
            }
        }
    }
}

fn report(result: &ProcessingResult) {
    match result.status {
        ProcessingStatus::Ok => {
            println!(
                "ok: {} [{}] rows={} parsed={} products +{} ~{} lines={} in {:.1?}",
                result.file_path.display(),
                result.supplier.as_deref().unwrap_or("-"),
                result.rows_read,
                result.rows_parsed,
                result.products_created,
                result.products_updated,
                result.offer_lines_created,
                result.duration,
            );
        }
        _ => {
            for error in &result.errors {
                eprintln!("{error}");
            }
            if let Some(supplier) = &result.supplier {
                eprintln!("  supplier: {supplier}");
            }
            eprintln!("  file: {}", result.file_path.display());
        }
    }
    for warning in result.warnings.iter().take(10) {
        eprintln!("  warning: {warning}");
    }
    if result.warnings.len() > 10 {
        eprintln!("  ... and {} more warnings", result.warnings.len() - 10);
    }
}

async fn run_process(config: &AppConfig, paths: Vec<PathBuf>) -> u8 {
    if paths.is_empty() {
        eprintln!("ArgumentError: no input files given");
        return EXIT_VALIDATION;
    }

    let dir = match config.resolve_config_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{}: {e}", e.tag());
            return EXIT_CONFIG;
        }
    };
    let store = match ConfigurationStore::load(&dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}: {e}", e.tag());
            return EXIT_CONFIG;
        }
    };

    let catalog: Arc<dyn CatalogStore> = match &config.store.path {
        Some(path) => match FileStore::open(path) {
            Ok(file_store) => Arc::new(file_store),
            Err(e) => {
                eprintln!("ConfigError: {e}");
                return EXIT_CONFIG;
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let processor = Arc::new(FileProcessor::new(
        store.configuration(),
        GridReaderRegistry::with_defaults(),
        catalog,
        config.processing.supported_extensions.clone(),
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("interrupt received, canceling in-flight runs");
                cancel.cancel();
            }
        });
    }

    // Bounded fan-out: each file runs on its own task with its own
    // transaction; row order within a file is never split across tasks.
    let mut worst = EXIT_OK;
    let mut inflight: JoinSet<ProcessingResult> = JoinSet::new();
    let mut queue = paths.into_iter();
    let limit = config.processing.max_parallel_files.max(1);

    loop {
        while inflight.len() < limit {
            match queue.next() {
                Some(path) => {
                    let processor = processor.clone();
                    let cancel = cancel.clone();
                    inflight.spawn(async move { processor.process_file(&path, &cancel).await });
                }
                None => break,
            }
        }
        match inflight.join_next().await {
            Some(Ok(result)) => {
                report(&result);
                worst = worst.max(exit_code_for(&result));
            }
            Some(Err(join_error)) => {
                eprintln!("TaskError: {join_error}");
                worst = worst.max(EXIT_OTHER);
            }
            None => break,
        }
    }
    worst
}

fn run_validate(dir: &PathBuf) -> u8 {
    match ConfigurationStore::load(dir) {
        Ok(store) => {
            let snapshot = store.configuration().snapshot();
            println!(
                "ok: version {} with {} suppliers, {} lookup tables",
                snapshot.version,
                snapshot.suppliers.len(),
                snapshot.lookups.len(),
            );
            for supplier in &snapshot.suppliers {
                println!(
                    "  {} [{}] rules={} patterns={}",
                    supplier.name,
                    supplier.currency,
                    supplier.rules.len(),
                    supplier.file_name_patterns.len(),
                );
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}: {e}", e.tag());
            EXIT_CONFIG
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("ConfigError: {e}");
        AppConfig::default()
    });
    if cli.config_dir.is_some() {
        config.config_dir = cli.config_dir.clone();
    }
    init_tracing(&config);

    let code = match cli.command {
        Command::Process { paths } => run_process(&config, paths).await,
        Command::ValidateConfig { dir } => run_validate(&dir),
    };
    ExitCode::from(code)
}
