// pingstat CLI - record and report federation ping latency
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

// Macro for conditional printing based on quiet flag
macro_rules! qprintln {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

use pingstat::{
    create_store, init_logging_with_level, log_operation, observability::OperationContext,
    render_text_report, start_server, with_trace_id, AppState, EventOutcome, Observation,
    Operation, PingStatConfig, PingStatError, PongIngestor, RecordOutcome, StatsService,
    WindowQuery,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "pingstat - latency statistics for federated ping rooms",
    long_about = None,
    after_help = "EXAMPLES:
  # Feed pong events (one JSON object per line) into the store
  pingstat ingest --file events.jsonl

  # Ranked statistics for the last day
  pingstat stats --room '!ping:example.org' --max-age 86400

  # Serve the read API
  pingstat serve --port 29316"
)]
struct Cli {
    /// Enable verbose logging (DEBUG level). Default is WARN level.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print requested data
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "PINGSTAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP read API
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print aggregated statistics for a room
    Stats {
        /// Room ID
        #[arg(short, long)]
        room: String,
        /// Newest sample age in seconds
        #[arg(long)]
        min_age: Option<i64>,
        /// Oldest sample age in seconds
        #[arg(long)]
        max_age: Option<i64>,
        /// Maximum window width in seconds
        #[arg(long)]
        max_span: Option<i64>,
        /// Print JSON instead of the text ranking
        #[arg(long)]
        json: bool,
    },

    /// Print the raw samples of a room as JSON
    Export {
        /// Room ID
        #[arg(short, long)]
        room: String,
        /// Oldest sample age in seconds
        #[arg(long)]
        max_age: Option<i64>,
    },

    /// Record observations or chat events read as JSON lines
    Ingest {
        /// Input file; stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Move all samples of a room to its replacement
    Migrate {
        /// Superseded room ID
        #[arg(long)]
        from: String,
        /// Replacement room ID; nothing happens without one
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Debug, Default)]
struct IngestCounts {
    recorded: u64,
    duplicates: u64,
    migrated: u64,
    ignored: u64,
    invalid: u64,
}

async fn ingest_line(ingestor: &PongIngestor, line: &str, counts: &mut IngestCounts) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(line)?;

    // Chat events carry a type or content block; anything else is a bare observation
    let outcome = if value.get("type").is_some() || value.get("content").is_some() {
        ingestor.handle_event(&value).await?
    } else {
        let observation: Observation = serde_json::from_value(value)?;
        match ingestor.record(&observation).await? {
            RecordOutcome::Recorded => EventOutcome::Recorded,
            RecordOutcome::Duplicate => EventOutcome::Duplicate,
        }
    };

    match outcome {
        EventOutcome::Recorded => counts.recorded += 1,
        EventOutcome::Duplicate => counts.duplicates += 1,
        EventOutcome::Migrated { samples } => counts.migrated += samples,
        EventOutcome::Ignored => counts.ignored += 1,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging_with_level(cli.verbose, cli.quiet); // Ignore error if already initialized

    let quiet = cli.quiet;

    with_trace_id("pingstat-cli", async move {
        let config = PingStatConfig::load(cli.config.as_deref())?;
        let store = create_store(&config.storage).await?;

        match cli.command {
            Commands::Serve { port } => {
                let port = port.unwrap_or(config.server.port);
                let addr = format!("{}:{}", config.server.host, port);
                let stats = StatsService::new(store, Arc::new(config.disclaimer.clone()));

                log_operation(
                    &OperationContext::new("startup"),
                    &Operation::Startup {
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                    &Ok::<(), anyhow::Error>(()),
                );
                qprintln!(quiet, "Starting pingstat HTTP server on {addr}");
                qprintln!(quiet, "   GET /health");
                qprintln!(quiet, "   GET /stats?room_id=...");
                qprintln!(quiet, "   GET /stats.json?room_id=...&min_age=&max_age=&max_span=");
                qprintln!(quiet, "   GET /stats.raw.json?room_id=...&max_age=");

                start_server(AppState::new(stats), &addr).await?;
            }

            Commands::Stats {
                room,
                min_age,
                max_age,
                max_span,
                json,
            } => {
                let stats = StatsService::new(store, Arc::new(config.disclaimer.clone()));
                let query = WindowQuery::with_ages(min_age, max_age, max_span);
                let report = stats.room_stats(&room, &query).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", render_text_report(&report));
                }
            }

            Commands::Export { room, max_age } => {
                let stats = StatsService::new(store, Arc::new(config.disclaimer.clone()));
                let query = WindowQuery::with_ages(None, max_age, None);
                let samples = stats.raw_samples(&room, &query).await?;
                println!("{}", serde_json::to_string_pretty(&samples)?);
            }

            Commands::Ingest { file } => {
                let reader: Box<dyn BufRead> = match &file {
                    Some(path) => Box::new(BufReader::new(
                        std::fs::File::open(path)
                            .with_context(|| format!("Failed to open {}", path.display()))?,
                    )),
                    None => Box::new(BufReader::new(std::io::stdin())),
                };

                let ingestor = PongIngestor::new(store);
                let mut counts = IngestCounts::default();
                for (number, line) in reader.lines().enumerate() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = ingest_line(&ingestor, &line, &mut counts).await {
                        // A broken store fails every later line too; stop instead of
                        // reporting them all as bad input
                        if e
                            .downcast_ref::<PingStatError>()
                            .is_some_and(PingStatError::is_store_failure)
                        {
                            return Err(e.context(format!(
                                "Storage failed at input line {} after recording {}",
                                number + 1,
                                counts.recorded
                            )));
                        }
                        tracing::warn!(line = number + 1, error = %e, "Skipping input line");
                        counts.invalid += 1;
                    }
                }

                qprintln!(
                    quiet,
                    "Recorded {}, duplicates {}, migrated {}, ignored {}, invalid {}",
                    counts.recorded,
                    counts.duplicates,
                    counts.migrated,
                    counts.ignored,
                    counts.invalid
                );
            }

            Commands::Migrate { from, to } => {
                let ingestor = PongIngestor::new(store);
                let moved = ingestor.migrate_on_tombstone(&from, to.as_deref()).await?;
                match to {
                    Some(to) => qprintln!(quiet, "Moved {moved} samples from {from} to {to}"),
                    None => qprintln!(quiet, "No replacement room given, nothing migrated"),
                }
            }
        }

        Ok::<(), anyhow::Error>(())
    })
    .await
}
