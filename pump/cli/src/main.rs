//! Pump CLI - Segment and Re-frame Token Streams
//!
//! Reads text (a file or stdin), splits it into token-like fragments, runs
//! them through a pump pipeline and writes the framed result to stdout.
//! Logs go to stderr so they never mix with the output.
//!
//! # Usage
//!
//! ```bash
//! # Sentences as plain lines
//! ollama run llama3 "tell me a story" | pump
//!
//! # Speakable chunks as server-sent events
//! pump --mode speakable --min-chars 60 --format sse story.txt
//!
//! # Batches of four sentences as NDJSON, with segment stats on stderr
//! pump --batch-size 4 --format ndjson --stats -l info story.txt
//!
//! # With config file
//! pump --config ~/.config/pump/pump.toml
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: Cancel the source and exit quietly

mod pipeline;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pump_core::{
    default_config_path, load_config_from_path, CancellationToken, ConfigOverrides, Format,
    PumpError, Segmentation,
};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info};

/// Pump - Segment and re-frame token streams
#[derive(Parser, Debug)]
#[command(name = "pump")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input file (stdin when omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PUMP_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Segmentation (fragments, sentences, speakable)
    #[arg(short = 'm', long)]
    mode: Option<Segmentation>,

    /// Output framing (text, ndjson, sse)
    #[arg(short = 'f', long)]
    format: Option<Format>,

    /// Minimum characters per speakable chunk
    #[arg(long, value_name = "N")]
    min_chars: Option<usize>,

    /// Group segments into batches of N
    #[arg(short = 'b', long, value_name = "N")]
    batch_size: Option<usize>,

    /// Read ahead N segments before the first is delivered
    #[arg(long, value_name = "N")]
    buffer_size: Option<usize>,

    /// Log segment counts when the run finishes
    #[arg(long)]
    stats: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PUMP_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    /// The `--config` file, falling back to the per-user default
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }

    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(mode) = self.mode {
            overrides = overrides.with_mode(mode);
        }
        if let Some(format) = self.format {
            overrides = overrides.with_format(format);
        }
        if let Some(min_chars) = self.min_chars {
            overrides = overrides.with_min_chars(min_chars);
        }
        if let Some(size) = self.batch_size {
            overrides = overrides.with_batch_size(size);
        }
        if let Some(size) = self.buffer_size {
            overrides = overrides.with_buffer_size(size);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Output is reserved for pipeline data, so everything goes to stderr.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("pump={level},pump_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

async fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input: {path:?}"))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config_from_path(args.config_path())?;
    args.overrides().apply(&mut config);
    config.validate()?;

    info!(
        mode = %config.mode,
        format = %config.format,
        batch_size = ?config.batch_size,
        buffer_size = config.buffer_size,
        source = %config.source(),
        "Pipeline configured"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling source");
            on_interrupt.cancel();
        }
    });

    let input = open_input(args.input.as_ref()).await?;
    let outcome = pipeline::run(&config, input, tokio::io::stdout(), cancel, args.stats).await?;

    info!(
        chunks = outcome.report.chunks,
        payloads = outcome.report.payloads,
        "Pipeline finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<PumpError>().is_some_and(PumpError::is_cancelled) => Ok(()),
        Err(e) => {
            error!(error = %e, "Pump failed");
            Err(e)
        }
    }
}
