//! Tracepipe agent - line-oriented delivery daemon
//!
//! Reads newline-delimited event payloads from stdin, enqueues them through
//! the batched delivery pipeline, and ships them to the configured sink.
//!
//! # Usage
//!
//! ```bash
//! # Durable queue, file sink, settings from TOML
//! some-producer | tracepipe-agent --config configs/tracepipe.toml
//!
//! # Quick look at what's flowing
//! some-producer | tracepipe-agent --config configs/stdout.toml --log-level debug
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tracepipe_config::{Config, LogFormat, QueueMode, SinkConfig};
use tracepipe_pipeline::{EventSink, PipelineOptions, RunningPipeline};
use tracepipe_queue::DurableQueue;
use tracepipe_sinks::{FileSink, NullSink, StdoutSink};

/// Tracepipe agent - batched event delivery
#[derive(Parser, Debug)]
#[command(name = "tracepipe-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/tracepipe.toml")]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.logging.level.as_str());
    init_logging(level, config.logging.format)?;

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let sink = build_sink(&config.sink)?;
    let options = PipelineOptions {
        batch_size: config.pipeline.batch_size,
        max_write_delay: config.pipeline.max_write_delay(),
        flush_on_shutdown: config.pipeline.flush_on_shutdown,
    };

    let pipeline = match config.pipeline.queue_mode {
        QueueMode::Durable => {
            let dir = config
                .pipeline
                .queue_path
                .as_ref()
                .context("pipeline.queue_path is required in durable mode")?;
            let queue = DurableQueue::open(dir)
                .with_context(|| format!("opening queue at {}", dir.display()))?;
            RunningPipeline::start_durable(queue, sink, options)
                .context("starting durable pipeline")?
        }
        QueueMode::Volatile => RunningPipeline::start_volatile(sink, options),
    };

    let producer = pipeline.producer();
    let mut completion = pipeline.completion();

    // Feed stdin lines to the pipeline. Empty lines are skipped.
    let mut reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.is_empty() {
                continue;
            }
            producer.write(line);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
        _ = &mut reader => {
            tracing::info!("input closed, shutting down");
        }
        result = completion.wait() => {
            if let Err(error) = &result {
                tracing::error!(%error, "pipeline halted");
            }
        }
    }
    reader.abort();

    let metrics = pipeline.metrics();
    let result = pipeline.shutdown().await;

    let snapshot = metrics.snapshot();
    tracing::info!(
        enqueued = snapshot.records_enqueued,
        dropped = snapshot.records_dropped,
        batches = snapshot.batches_delivered,
        delivered = snapshot.records_delivered,
        bytes = snapshot.bytes_delivered,
        "agent stopped"
    );

    result.map_err(|error| anyhow::anyhow!(error))
}

/// Build the sink named by the configuration
fn build_sink(config: &SinkConfig) -> Result<Box<dyn EventSink>> {
    Ok(match config {
        SinkConfig::Stdout(stdout) if stdout.batch_headers => Box::new(StdoutSink::with_headers()),
        SinkConfig::Stdout(_) => Box::new(StdoutSink::new()),
        SinkConfig::File(file) => Box::new(
            FileSink::create(&file.path)
                .with_context(|| format!("opening file sink at {}", file.path.display()))?,
        ),
        SinkConfig::Null => Box::new(NullSink::new()),
    })
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}
