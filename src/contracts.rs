// Contract-First Design
// This module defines the sample model and the storage contract
// (preconditions, postconditions, invariants) every backend must honour.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One recorded response to a ping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub room_id: String,
    pub ping_id: String,
    pub pong_server: String,
    pub ping_server: String,
    pub receive_diff: i64,
    pub pong_timestamp: i64,
}

impl Sample {
    pub fn key(&self) -> SampleKey {
        SampleKey {
            room_id: self.room_id.clone(),
            ping_id: self.ping_id.clone(),
            pong_server: self.pong_server.clone(),
        }
    }
}

/// Primary key of a sample: at most one response per responder, ping and room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleKey {
    pub room_id: String,
    pub ping_id: String,
    pub pong_server: String,
}

/// Inclusive bounds applied by `SampleStore::scan`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub min_diff: i64,
    pub max_diff: i64,
}

impl ScanFilter {
    /// Filter that accepts every sample
    pub fn unbounded() -> Self {
        Self {
            min_timestamp: i64::MIN,
            max_timestamp: i64::MAX,
            min_diff: i64::MIN,
            max_diff: i64::MAX,
        }
    }

    pub fn contains(&self, sample: &Sample) -> bool {
        (self.min_timestamp..=self.max_timestamp).contains(&sample.pong_timestamp)
            && (self.min_diff..=self.max_diff).contains(&sample.receive_diff)
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Core trait for sample storage
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Insert one sample
    ///
    /// # Preconditions
    /// - (room_id, ping_id, pong_server) is not already stored
    ///
    /// # Postconditions
    /// - Sample is visible to subsequent scans of its room
    /// - Returns `DuplicateKey` and leaves the store untouched otherwise
    async fn insert(&self, sample: Sample) -> Result<()>;

    /// Return every sample of `room_id` accepted by `filter`, in no particular order
    ///
    /// # Postconditions
    /// - Does not modify any state
    /// - Never observes a half-applied `rewrite_room`
    async fn scan(&self, room_id: &str, filter: &ScanFilter) -> Result<Vec<Sample>>;

    /// Reattribute every sample of `old_room_id` to `new_room_id`
    ///
    /// # Postconditions
    /// - Returns the number of rewritten samples (0 when `old_room_id` is empty
    ///   or equal to `new_room_id`)
    /// - Applied atomically with respect to concurrent scans and inserts
    /// - Returns `KeyCollision` and changes nothing if any (ping_id, pong_server)
    ///   of the old room already exists under the new room
    async fn rewrite_room(&self, old_room_id: &str, new_room_id: &str) -> Result<u64>;

    /// Number of samples stored for a room
    async fn count(&self, room_id: &str) -> Result<u64>;
}
