//! Hubwatch CLI — runs the watch-list consumer and inspects its inputs and
//! checkpoints.
//!
//! # Commands
//! ```
//! hubwatch consume     --event-hub <name> --source-dir <dir> --checkpoint-dir <dir>
//! hubwatch decode      --file <path> [--match-values a,b]
//! hubwatch checkpoints --checkpoint-dir <dir> --event-hub <name>
//! hubwatch info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubwatch_consumer::{
    load_file, BatchProcessor, CheckpointStore, ConsumerClient, ConsumerConfig,
    FileCheckpointStore, FileSource, StartPosition,
};
use hubwatch_core::{WatchList, DEFAULT_MAX_DEPTH};
use hubwatch_observability::{init_tracing, HubwatchMetrics, LogConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "hubwatch",
    about = "Event hub consumer that logs records matching a watch-list",
    long_about = "
Hubwatch: consume every partition of an event hub, decode Avro-style
tagged fields and log the records that contain every watch-list entry.

ENVIRONMENT VARIABLES:
  HUBWATCH_EVENT_HUB        Event hub name
  HUBWATCH_CONSUMER_GROUP   Consumer group (default: $Default)
  HUBWATCH_SOURCE_DIR       Directory of partition files
  HUBWATCH_CHECKPOINT_DIR   Directory for checkpoint blobs
  HUBWATCH_MATCH_VALUES     Comma-separated watch-list
  HUBWATCH_LOG              Log filter directives (e.g. info,hubwatch_consumer=debug)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to all partitions and log matching records
    Consume(ConsumeArgs),

    /// Decode every record of a capture file and print the result
    Decode {
        /// `.jsonl`, `.json` or `.avro` file
        #[arg(short, long)]
        file: PathBuf,
        /// Watch-list to check each record against
        #[arg(long, value_delimiter = ',')]
        match_values: Vec<String>,
        /// Record nesting limit
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// List stored checkpoints of a consumer group
    Checkpoints {
        #[arg(long, env = "HUBWATCH_CHECKPOINT_DIR")]
        checkpoint_dir: PathBuf,
        #[arg(long, env = "HUBWATCH_EVENT_HUB")]
        event_hub: String,
        #[arg(long, env = "HUBWATCH_CONSUMER_GROUP", default_value = "$Default")]
        consumer_group: String,
    },

    /// Show build info and defaults
    Info,
}

#[derive(clap::Args)]
struct ConsumeArgs {
    /// YAML config file; flags and environment variables override it
    #[arg(long, env = "HUBWATCH_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "HUBWATCH_EVENT_HUB")]
    event_hub: Option<String>,
    #[arg(long, env = "HUBWATCH_CONSUMER_GROUP")]
    consumer_group: Option<String>,
    #[arg(long, env = "HUBWATCH_SOURCE_DIR")]
    source_dir: Option<PathBuf>,
    #[arg(long, env = "HUBWATCH_CHECKPOINT_DIR")]
    checkpoint_dir: Option<PathBuf>,
    #[arg(long, env = "HUBWATCH_MATCH_VALUES", value_delimiter = ',')]
    match_values: Vec<String>,
    #[arg(long, env = "HUBWATCH_MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,
    #[arg(long, env = "HUBWATCH_MAX_WAIT_MS")]
    max_wait_ms: Option<u64>,
    /// `earliest` or `latest`
    #[arg(long, env = "HUBWATCH_START_POSITION", value_parser = parse_start_position)]
    start_position: Option<StartPosition>,
    #[arg(long, env = "HUBWATCH_MAX_DEPTH")]
    max_depth: Option<usize>,
    /// How long to keep the subscription open
    #[arg(long, env = "HUBWATCH_RUN_FOR_SECS")]
    run_for_secs: Option<u64>,
    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn parse_start_position(s: &str) -> Result<StartPosition, String> {
    match s.to_lowercase().as_str() {
        "earliest" => Ok(StartPosition::Earliest),
        "latest" => Ok(StartPosition::Latest),
        other => Err(format!("unknown start position '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Consume(args) => cmd_consume(args, cli.verbose).await,

        Commands::Decode { file, match_values, max_depth } => {
            init_tracing(&log_config(LogConfig::default(), cli.verbose));
            cmd_decode(&file, match_values, max_depth)
        }

        Commands::Checkpoints { checkpoint_dir, event_hub, consumer_group } => {
            cmd_checkpoints(&checkpoint_dir, &event_hub, &consumer_group).await
        }

        Commands::Info => cmd_info(),
    }
}

/// Apply `--verbose` and `HUBWATCH_LOG` on top of a configured log setup.
fn log_config(mut log: LogConfig, verbose: bool) -> LogConfig {
    if verbose {
        log.level = "debug".into();
    }
    if let Ok(directives) = std::env::var("HUBWATCH_LOG") {
        if !directives.is_empty() {
            log.level = directives;
        }
    }
    log
}

// ─── Command implementations ─────────────────────────────────────────────────

fn consumer_config(args: ConsumeArgs) -> Result<ConsumerConfig> {
    let mut config = match &args.config {
        Some(path) => ConsumerConfig::from_yaml_file(path)
            .with_context(|| format!("read config '{}'", path.display()))?,
        None => ConsumerConfig::default(),
    };

    if let Some(v) = args.event_hub {
        config.event_hub = v;
    }
    if let Some(v) = args.consumer_group {
        config.consumer_group = v;
    }
    if args.source_dir.is_some() {
        config.source_dir = args.source_dir;
    }
    if args.checkpoint_dir.is_some() {
        config.checkpoint_dir = args.checkpoint_dir;
    }
    if !args.match_values.is_empty() {
        config.match_values = args.match_values;
    }
    if let Some(v) = args.max_batch_size {
        config.max_batch_size = v;
    }
    if let Some(v) = args.max_wait_ms {
        config.max_wait_ms = v;
    }
    if let Some(v) = args.start_position {
        config.start_position = v;
    }
    if let Some(v) = args.max_depth {
        config.max_depth = v;
    }
    if let Some(v) = args.run_for_secs {
        config.run_for_secs = v;
    }
    if args.json_logs {
        config.log.json = true;
    }
    Ok(config)
}

async fn cmd_consume(args: ConsumeArgs, verbose: bool) -> Result<()> {
    let config = consumer_config(args)?;
    init_tracing(&log_config(config.log.clone(), verbose));

    info!("Starting hubwatch v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Machine: os={} arch={} cpus={}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::thread::available_parallelism().map_or(1, |n| n.get())
    );

    if let Err(e) = config.validate() {
        error!("{e}");
        return Ok(());
    }
    let (source_dir, checkpoint_dir) = config.directories()?;

    info!(
        "Event hub '{}', consumer group '{}', watch-list {:?}",
        config.event_hub, config.consumer_group, config.match_values
    );

    let source = Arc::new(
        FileSource::open(config.event_hub.clone(), source_dir)
            .with_context(|| format!("open source '{}'", source_dir.display()))?,
    );
    let store = Arc::new(FileCheckpointStore::new(checkpoint_dir));
    let processor = Arc::new(
        BatchProcessor::new(config.watch_list())
            .with_max_depth(config.max_depth)
            .with_metrics(HubwatchMetrics::global()),
    );

    let client = ConsumerClient::new(config.consumer_group.clone(), source, store)
        .with_options(config.subscription_options());
    let subscription = client.subscribe(processor.clone()).await?;

    info!("Subscription running for {}s", config.run_for_secs);
    tokio::select! {
        _ = tokio::time::sleep(config.run_for()) => {}
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                error!("Ctrl-C handler failed: {e}");
            }
            info!("Interrupted");
        }
    }

    subscription.close().await;
    info!("Subscription stopped");

    let m = processor.metrics();
    println!("Batches:             {} ({} empty)", m.batches, m.empty_batches);
    println!("Events received:     {}", m.events_received);
    println!("Events matched:      {}", m.events_matched);
    println!("Decode failures:     {}", m.decode_failures);
    println!("Checkpoints:         {}", m.checkpoints);
    println!("Checkpoint failures: {}", m.checkpoint_failures);
    Ok(())
}

fn cmd_decode(file: &Path, match_values: Vec<String>, max_depth: usize) -> Result<()> {
    let events = load_file(file).with_context(|| format!("load '{}'", file.display()))?;
    let processor = BatchProcessor::new(WatchList::from(match_values)).with_max_depth(max_depth);

    let mut matched = 0usize;
    for event in &events {
        println!("── sequence {} ──", event.sequence_number);
        match processor.process_event(event) {
            Ok(walked) => {
                println!("{}", walked.result.to_pretty_json()?);
                if walked.remaining.is_empty() {
                    matched += 1;
                    println!("remaining: [] (match)");
                } else {
                    println!("remaining: {:?}", walked.remaining.as_slice());
                }
            }
            Err(e) => println!("✗ {e}"),
        }
    }
    println!();
    println!("{} records, {} matched", events.len(), matched);
    Ok(())
}

async fn cmd_checkpoints(dir: &Path, event_hub: &str, consumer_group: &str) -> Result<()> {
    let store = FileCheckpointStore::new(dir);
    let checkpoints = store.list(event_hub, consumer_group).await?;
    if checkpoints.is_empty() {
        println!("No checkpoints for '{}' / '{}'", event_hub, consumer_group);
        return Ok(());
    }

    println!("{:<12} {:>14} {:>10}  {}", "PARTITION", "SEQUENCE", "OFFSET", "UPDATED");
    for cp in checkpoints {
        let updated = chrono::DateTime::from_timestamp(cp.updated_at, 0)
            .map_or_else(|| cp.updated_at.to_string(), |t| t.to_rfc3339());
        println!(
            "{:<12} {:>14} {:>10}  {}",
            cp.partition_id, cp.sequence_number, cp.offset, updated
        );
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = ConsumerConfig::default();
    println!("Hubwatch v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Capabilities:");
    println!("  ✓ Tagged union decoding    (int, long, float, double, string, boolean, bytes)");
    println!("  ✓ Binary payload decoding  (UTF-8 + JSON fallback)");
    println!("  ✓ Capture file sources     (.jsonl, .json, .avro)");
    println!("  ✓ File checkpoints         (<dir>/<hub>/<group>/checkpoint/<partition>.json)");
    println!();
    println!("Defaults:");
    println!("  consumer group:   {}", defaults.consumer_group);
    println!("  max batch size:   {}", defaults.max_batch_size);
    println!("  max wait:         {}ms", defaults.max_wait_ms);
    println!("  start position:   {:?}", defaults.start_position);
    println!("  max depth:        {}", defaults.max_depth);
    println!("  run for:          {}s", defaults.run_for_secs);
    Ok(())
}
