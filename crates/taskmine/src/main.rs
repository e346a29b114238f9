//! tm - taskmine CLI
//!
//! Bridges captured records into the durable event log and inspects it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use taskmine_core::channel;
use taskmine_core::config::Config;
use taskmine_core::logging::{LogConfig, init_logging};
use taskmine_core::record::{EventRecord, StoredEvent};
use taskmine_core::relay;
use taskmine_core::store::SharedStore;
use taskmine_core::{ConfigError, Error as CoreError, StorageError};

/// tm - activity log tooling for taskmine
#[derive(Parser, Debug)]
#[command(name = "tm")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to taskmine.toml (default: $TASKMINE_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Event database path (overrides storage.db_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append newline-delimited JSON event records read from stdin
    Ingest {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the newest records, oldest first
    Tail {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Count records per event kind
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation_for(&err) {
                eprint!("{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}

fn remediation_for(err: &anyhow::Error) -> Option<taskmine_core::error::Remediation> {
    if let Some(err) = err.downcast_ref::<StorageError>() {
        return Some(err.remediation());
    }
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return Some(err.remediation());
    }
    err.downcast_ref::<CoreError>().and_then(CoreError::remediation)
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { default: true } = cli.command {
        print!("{}", Config::default().to_toml()?);
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    config.validate()?;

    let mut log_config = LogConfig::from(&config.general);
    match cli.verbose {
        0 => {}
        1 => log_config.level = "debug".to_string(),
        _ => log_config.level = "trace".to_string(),
    }
    init_logging(&log_config).context("initializing logging")?;

    match cli.command {
        Commands::Ingest { json } => cmd_ingest(&config, json).await,
        Commands::Tail { limit, json } => cmd_tail(&config, limit, json).await,
        Commands::Stats { json } => cmd_stats(&config, json).await,
        Commands::Config { .. } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

// =============================================================================
// ingest
// =============================================================================

#[derive(Debug, Default, Serialize)]
struct IngestSummary {
    read: u64,
    malformed: u64,
    appended: u64,
    failed: u64,
    dropped: u64,
    last_id: Option<i64>,
}

async fn cmd_ingest(config: &Config, json: bool) -> Result<()> {
    let store = Arc::new(SharedStore::new(config.storage.clone()));
    // surface open failures before consuming input
    store.handle().await.context("opening event store")?;

    let (tx, rx) = channel::channel(config.delivery.channel_capacity);
    let relay = tokio::spawn(relay::run(rx, Arc::clone(&store)));

    let mut summary = IngestSummary::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.read += 1;
        match serde_json::from_str::<EventRecord>(line) {
            Ok(record) => {
                tx.ready().await;
                tx.send(record);
            }
            Err(err) => {
                summary.malformed += 1;
                tracing::warn!(line = line_no, category = ?err.classify(), "skipping malformed record");
            }
        }
    }

    summary.dropped = tx.stats().dropped();
    drop(tx);
    let stats = relay.await.context("relay task failed")?;
    store.shutdown().await;

    summary.appended = stats.appended;
    summary.failed = stats.failed;
    summary.last_id = stats.last_id;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "ingested {} of {} records ({} malformed, {} failed, {} dropped)",
            summary.appended, summary.read, summary.malformed, summary.failed, summary.dropped
        );
    }
    Ok(())
}

// =============================================================================
// tail
// =============================================================================

async fn cmd_tail(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = SharedStore::new(config.storage.clone());
    let handle = store.handle().await.context("opening event store")?;
    let events = handle.recent(limit).await.context("reading events")?;

    for event in &events {
        if json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!("{}", format_event_line(event));
        }
    }
    Ok(())
}

fn format_event_line(event: &StoredEvent) -> String {
    let when = chrono::DateTime::from_timestamp_millis(event.record.timestamp).map_or_else(
        || event.record.timestamp.to_string(),
        |ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    );
    let target = event
        .record
        .data
        .element()
        .and_then(|el| el.selector.as_deref())
        .unwrap_or("");
    format!(
        "{:>6}  {}  {:<10}  {}  {}",
        event.id,
        when,
        event.record.event.as_str(),
        event.record.url,
        target
    )
    .trim_end()
    .to_string()
}

// =============================================================================
// stats
// =============================================================================

#[derive(Debug, Serialize)]
struct StatsReport {
    db_path: String,
    schema_version: i64,
    total: u64,
    by_kind: BTreeMap<String, u64>,
}

async fn cmd_stats(config: &Config, json: bool) -> Result<()> {
    let store = SharedStore::new(config.storage.clone());
    let handle = store.handle().await.context("opening event store")?;
    let report = StatsReport {
        db_path: handle.path().display().to_string(),
        schema_version: handle.schema_version().await?,
        total: handle.count().await?,
        by_kind: handle.count_by_kind().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Database: {}", report.db_path);
        println!("Schema version: {}", report.schema_version);
        println!("Total records: {}", report.total);
        for (kind, count) in &report.by_kind {
            println!("  {kind:<12} {count}");
        }
    }
    Ok(())
}
