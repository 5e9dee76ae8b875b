//! selecta-ai - hierarchical audio classifier
//!
//! Classifies audio files against a trained model bundle and prints one JSON
//! line per file to stdout. Logs go to stderr (or the configured log file).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use selecta_ai::artifact::discover_latest;
use selecta_ai::batch::default_worker_count;
use selecta_ai::{AudioAsset, BatchClassifier, InferenceEngine, ModelArtifactStore};
use selecta_common::config::{load_config, LoadedConfig, LoggingConfig, TomlConfig};
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MODULE_NAME: &str = "selecta-ai";

/// Command-line arguments for selecta-ai
#[derive(Parser, Debug)]
#[command(name = "selecta-ai")]
#[command(about = "Hierarchical audio classifier")]
#[command(version)]
struct Args {
    /// Configuration file (default: $SELECTA_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bundle descriptor (bundle_info_<timestamp>.json)
    #[arg(short, long, global = true, env = "SELECTA_BUNDLE")]
    bundle: Option<PathBuf>,

    /// Directory to search for the newest bundle descriptor
    #[arg(long, global = true, env = "SELECTA_BUNDLE_DIR")]
    bundle_dir: Option<PathBuf>,

    /// Concurrent classification workers
    #[arg(short, long, global = true, env = "SELECTA_WORKERS")]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify audio files and print one JSON result per file
    Classify {
        /// Audio files to classify
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the bundle's label tree
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loading is silent; the subscriber depends on the logging section
    let LoadedConfig { config, source } = load_config(args.config.as_deref(), MODULE_NAME)
        .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!("Starting selecta-ai v{}", env!("CARGO_PKG_VERSION"));
    source.log();

    let bundle_path = resolve_bundle(&args, &config)?;
    let store = Arc::new(
        ModelArtifactStore::open(&bundle_path)
            .with_context(|| format!("Failed to load bundle {}", bundle_path.display()))?,
    );

    match args.command {
        Command::Classify { ref files } => {
            let workers = args
                .workers
                .or(config.classifier.worker_count)
                .unwrap_or_else(default_worker_count);
            classify_files(store, files, workers).await
        }
        Command::Inspect => {
            inspect(&store);
            Ok(())
        }
    }
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "selecta_ai={level},selecta_common={level}",
            level = logging.level
        ))
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = if file_layer.is_none() {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

/// CLI flag → config `bundle_path` → newest descriptor in the bundle dir
fn resolve_bundle(args: &Args, config: &TomlConfig) -> Result<PathBuf> {
    if let Some(path) = args.bundle.as_ref().or(config.classifier.bundle_path.as_ref()) {
        return Ok(path.clone());
    }
    if let Some(dir) = args.bundle_dir.as_ref().or(config.classifier.bundle_dir.as_ref()) {
        return discover_latest(dir)
            .with_context(|| format!("No usable bundle in {}", dir.display()));
    }
    bail!("No model bundle configured (use --bundle, --bundle-dir or the [classifier] config section)")
}

async fn classify_files(
    store: Arc<ModelArtifactStore>,
    files: &[PathBuf],
    workers: usize,
) -> Result<()> {
    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, cancelling remaining files");
                cancel_token.cancel();
            }
        });
    }

    // One output line per input file, in input order
    let mut lines: Vec<Option<serde_json::Value>> = vec![None; files.len()];
    let mut assets = Vec::new();
    let mut asset_file_index = Vec::new();

    for (index, path) in files.iter().enumerate() {
        let decode_path = path.clone();
        let decoded = tokio::task::spawn_blocking(move || selecta_ai::decode::decode_file(&decode_path))
            .await
            .context("Decoder task failed")?;

        match decoded {
            Ok(sample) => {
                assets.push(AudioAsset::new(path.display().to_string(), sample));
                asset_file_index.push(index);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping undecodable file");
                lines[index] = Some(error_line(path, &e.to_string()));
            }
        }
    }

    let engine = Arc::new(InferenceEngine::new(store));
    let classifier = BatchClassifier::new(engine).with_worker_count(workers);
    let items = classifier.classify_all(assets, &cancel_token).await;

    for item in items {
        let index = asset_file_index[item.index];
        let path = &files[index];
        lines[index] = Some(match item.outcome {
            Ok(result) => json!({
                "file": path.display().to_string(),
                "label_path": result.label_path(),
                "result": result,
            }),
            Err(e) => error_line(path, &e.to_string()),
        });
    }

    for line in lines.into_iter().flatten() {
        println!("{}", line);
    }

    Ok(())
}

fn error_line(path: &Path, error: &str) -> serde_json::Value {
    json!({
        "file": path.display().to_string(),
        "error": error,
    })
}

fn inspect(store: &ModelArtifactStore) {
    let bundle = store.current();
    let resolver = bundle.resolver();

    println!(
        "bundle {} ({}), {} features, {} stages",
        bundle.version(),
        bundle.format_version(),
        bundle.schema().feature_len(),
        bundle.stage_count()
    );

    // Depth-first from the root, children in id order
    let mut stack = vec![resolver.root()];
    while let Some(id) = stack.pop() {
        let Some(node) = resolver.node(id) else {
            continue;
        };
        let depth = resolver.depth(id).unwrap_or(0);
        let stage = node
            .stage
            .as_deref()
            .map(|s| format!(" stage={}", s))
            .unwrap_or_default();
        println!(
            "{}{} {} threshold={:.2}{}",
            "  ".repeat(depth),
            node.id,
            node.label,
            node.threshold,
            stage
        );
        stack.extend(resolver.children(id).iter().rev().copied());
    }
}
