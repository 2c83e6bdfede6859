// Error taxonomy for sample ingestion, storage and aggregation
// Every failure is local to the operation that detects it

/// Errors surfaced by the pingstat core
#[derive(Debug, thiserror::Error)]
pub enum PingStatError {
    #[error("Invalid observation: {field} - {reason}")]
    InvalidObservation { field: String, reason: String },

    #[error("Duplicate sample: room {room_id}, ping {ping_id}, pong server {pong_server}")]
    DuplicateKey {
        room_id: String,
        ping_id: String,
        pong_server: String,
    },

    #[error(
        "Cannot migrate room {old_room_id} to {new_room_id}: {conflicts} sample(s) already exist under the new room"
    )]
    KeyCollision {
        old_room_id: String,
        new_room_id: String,
        conflicts: u64,
    },

    #[error(
        "Invalid sample {ping_server} -> {pong_server} (ping {ping_id}): diff {diff} cannot be aggregated"
    )]
    InvalidSample {
        ping_server: String,
        pong_server: String,
        ping_id: String,
        diff: i64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PingStatError {
    pub fn invalid_observation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for logs and HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidObservation { .. } => "invalid_observation",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::KeyCollision { .. } => "key_collision",
            Self::InvalidSample { .. } => "invalid_sample",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Database(_) => "database_error",
        }
    }

    /// The backing store itself failed; retrying the same input will not help
    /// until the store is fixed
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, PingStatError>;
