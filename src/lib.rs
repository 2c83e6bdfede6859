// pingstat - Federation latency statistics for ping rooms
// Root library module

pub mod aggregation;
pub mod config;
pub mod contracts;
pub mod disclaimer;
pub mod duration_format;
pub mod error;
pub mod factory;
pub mod file_storage;
pub mod http_server;
pub mod ingestion;
pub mod memory_storage;
pub mod observability;
pub mod postgres_storage;
pub mod services;
pub mod types;
pub mod validation;
pub mod window;
pub mod wrappers;

// Re-export key types
pub use observability::{init_logging_with_level, log_operation, with_trace_id, Operation};

pub use contracts::{Sample, SampleKey, SampleStore, ScanFilter};
pub use error::{PingStatError, Result};

pub use types::{server_name_from_user_id, ValidatedEventId, ValidatedRoomId, ValidatedServerName};

// Storage backends
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use postgres_storage::PostgresStorage;
pub use wrappers::TracedStore;
pub use factory::{create_store, create_test_store};

pub use aggregation::{aggregate, PingServerSummary, PongServerStats, RoomSummary};
pub use duration_format::{plural, prettify_diff, prettify_diff_with};
pub use ingestion::{EventOutcome, Observation, PongEvent, PongIngestor, RecordOutcome, TombstoneEvent};
pub use window::{Window, WindowQuery};

pub use config::{PingStatConfig, StorageBackend, StorageConfig};
pub use disclaimer::{DisclaimerLookup, Disclaimers};
pub use services::{render_text_report, RoomStatsReport, StatsService};
pub use http_server::{create_server, start_server, AppState};
