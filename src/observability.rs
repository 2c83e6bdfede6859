// Observability for pingstat
// Structured logging, per-process counters and trace ids for store and query operations

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static INSERT_COUNTER: AtomicU64 = AtomicU64::new(0);
static SCAN_COUNTER: AtomicU64 = AtomicU64::new(0);
static SCANNED_SAMPLES: AtomicU64 = AtomicU64::new(0);
static AGGREGATE_COUNTER: AtomicU64 = AtomicU64::new(0);
static REWRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filter directives for the CLI verbosity flags; `quiet` wins
fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "pingstat=debug,info"
    } else {
        "pingstat=warn,error"
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the flags unless
/// `quiet` is set. Calling it twice is harmless.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let fallback = default_filter(verbose, quiet);
    let env_filter = if !quiet && std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    } else {
        EnvFilter::new(fallback)
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
        && !quiet
    {
        info!("pingstat logging initialized");
    }
    Ok(())
}

/// Operations worth a structured log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    SampleInsert {
        room_id: String,
        ping_id: String,
        pong_server: String,
    },
    SampleScan {
        room_id: String,
        result_count: usize,
    },
    RoomRewrite {
        old_room_id: String,
        new_room_id: String,
    },
    Aggregate {
        room_id: String,
        sample_count: usize,
    },
    Startup {
        version: String,
    },
}

/// Trace id, start time and key/value attributes of one operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Log an operation with its context and bump the matching counters.
/// Counters only move for successful operations, except the error counter.
pub fn log_operation<E: fmt::Display>(
    ctx: &OperationContext,
    op: &Operation,
    result: &std::result::Result<(), E>,
) {
    let elapsed = ctx.elapsed();
    let attrs = ctx
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");

    if let Err(e) = result {
        error!(
            trace_id = %ctx.trace_id,
            operation = %ctx.operation,
            elapsed_ms = elapsed.as_millis(),
            attributes = %attrs,
            error = %e,
            "Operation failed: {:?}", op
        );
        ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        return;
    }

    debug!(
        trace_id = %ctx.trace_id,
        operation = %ctx.operation,
        elapsed_ms = elapsed.as_millis(),
        attributes = %attrs,
        "Operation completed: {:?}", op
    );
    OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);

    match op {
        Operation::SampleInsert { .. } => {
            INSERT_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::SampleScan { result_count, .. } => {
            SCAN_COUNTER.fetch_add(1, Ordering::Relaxed);
            SCANNED_SAMPLES.fetch_add(*result_count as u64, Ordering::Relaxed);
        }
        Operation::Aggregate { .. } => {
            AGGREGATE_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::RoomRewrite { .. } => {
            REWRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::Startup { .. } => {}
    }
}

/// Total samples returned by traced scans in this process
pub fn scanned_samples() -> u64 {
    SCANNED_SAMPLES.load(Ordering::Relaxed)
}

/// Run a future under a fresh trace id, logging its duration and outcome
pub async fn with_trace_id<F, T, E>(operation: &str, f: F) -> std::result::Result<T, E>
where
    F: std::future::Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    let trace_id = Uuid::new_v4();
    debug!(trace_id = %trace_id, "Starting operation: {}", operation);

    let start = Instant::now();
    let result = f.await;
    let elapsed_ms = start.elapsed().as_millis();

    match &result {
        Ok(_) => debug!(trace_id = %trace_id, elapsed_ms, "Operation completed: {}", operation),
        Err(e) => {
            error!(trace_id = %trace_id, elapsed_ms, error = %e, "Operation failed: {}", operation);
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }
    result
}

/// Counter snapshot for the health endpoint
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "operations": {
            "total": OPERATION_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
            "inserts": INSERT_COUNTER.load(Ordering::Relaxed),
            "scans": SCAN_COUNTER.load(Ordering::Relaxed),
            "scanned_samples": SCANNED_SAMPLES.load(Ordering::Relaxed),
            "aggregations": AGGREGATE_COUNTER.load(Ordering::Relaxed),
            "room_rewrites": REWRITE_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}
