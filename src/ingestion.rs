// Sample Ingestion
// Validates ping/pong observations, records them idempotently and
// carries samples over when a room is replaced by a successor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::contracts::{Sample, SampleStore};
use crate::error::{PingStatError, Result};
use crate::types::{server_name_from_user_id, ValidatedEventId, ValidatedRoomId, ValidatedServerName};

pub const TOMBSTONE_EVENT_TYPE: &str = "m.room.tombstone";

/// Largest accepted |receive_diff|; the delay column is a 32-bit integer
pub const MAX_RECEIVE_DIFF_MS: i64 = i32::MAX as i64;

/// One raw ping/pong observation; every field must be present to record it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Event id of the ping
    pub ping_id: Option<String>,
    /// Peer that answered
    pub pong_server: Option<String>,
    /// Milliseconds between ping send and response receipt
    pub receive_diff: Option<i64>,
    /// Peer the ping was sent on behalf of
    pub ping_server: Option<String>,
    pub room_id: Option<String>,
    /// Acknowledgment timestamp, ms since epoch
    pub pong_timestamp: Option<i64>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| PingStatError::invalid_observation(field, "missing"))
}

fn invalid(field: &str) -> impl FnOnce(anyhow::Error) -> PingStatError + '_ {
    move |e| PingStatError::invalid_observation(field, e.to_string())
}

impl Observation {
    /// Turn the observation into a sample, naming the first bad field on failure
    pub fn validate(&self) -> Result<Sample> {
        let room_id = ValidatedRoomId::new(required(self.room_id.clone(), "room_id")?)
            .map_err(invalid("room_id"))?;
        let ping_id = ValidatedEventId::new(required(self.ping_id.clone(), "ping_id")?)
            .map_err(invalid("ping_id"))?;
        let pong_server = ValidatedServerName::new(required(self.pong_server.clone(), "pong_server")?)
            .map_err(invalid("pong_server"))?;
        let ping_server = ValidatedServerName::new(required(self.ping_server.clone(), "ping_server")?)
            .map_err(invalid("ping_server"))?;
        let receive_diff = required(self.receive_diff, "receive_diff")?;
        if receive_diff.unsigned_abs() > MAX_RECEIVE_DIFF_MS as u64 {
            return Err(PingStatError::invalid_observation(
                "receive_diff",
                format!("delay exceeds {MAX_RECEIVE_DIFF_MS} ms"),
            ));
        }
        let pong_timestamp = required(self.pong_timestamp, "pong_timestamp")?;
        if pong_timestamp < 0 {
            return Err(PingStatError::invalid_observation(
                "pong_timestamp",
                "timestamp cannot be negative",
            ));
        }

        Ok(Sample {
            room_id: room_id.into_inner(),
            ping_id: ping_id.into_inner(),
            pong_server: pong_server.into_inner(),
            ping_server: ping_server.into_inner(),
            receive_diff,
            pong_timestamp,
        })
    }
}

/// Decoder for the pong acknowledgment message posted by ping bots
///
/// Expected shape:
/// `{"event_id", "room_id", "sender": "@bot:server", "origin_server_ts",
///   "content": {"msgtype": "m.notice", "pong": {"ms", "from", "ping"}}}`
pub struct PongEvent;

impl PongEvent {
    /// `Ok(None)` for messages that are not pongs at all
    pub fn parse(event: &Value) -> Result<Option<Observation>> {
        let content = match event.get("content") {
            Some(content) => content,
            None => return Ok(None),
        };
        if let Some(msgtype) = content.get("msgtype").and_then(Value::as_str) {
            if msgtype != "m.notice" {
                return Ok(None);
            }
        }
        let pong = match content.get("pong") {
            Some(pong) => pong,
            None => return Ok(None),
        };

        let receive_diff = pong
            .get("ms")
            .and_then(|ms| ms.as_i64().or_else(|| ms.as_f64().map(|f| f.round() as i64)))
            .ok_or_else(|| PingStatError::invalid_observation("pong.ms", "missing or not a number"))?;
        let ping_server = pong
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| PingStatError::invalid_observation("pong.from", "missing"))?;
        let ping_id = pong
            .get("ping")
            .and_then(Value::as_str)
            .ok_or_else(|| PingStatError::invalid_observation("pong.ping", "missing"))?;

        let sender = event
            .get("sender")
            .and_then(Value::as_str)
            .ok_or_else(|| PingStatError::invalid_observation("sender", "missing"))?;
        let pong_server = server_name_from_user_id(sender).map_err(invalid("sender"))?;

        Ok(Some(Observation {
            ping_id: Some(ping_id.to_string()),
            pong_server: Some(pong_server.into_inner()),
            receive_diff: Some(receive_diff),
            ping_server: Some(ping_server.to_string()),
            room_id: event.get("room_id").and_then(Value::as_str).map(str::to_string),
            pong_timestamp: event.get("origin_server_ts").and_then(Value::as_i64),
        }))
    }
}

/// Notification that a room has been superseded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneEvent {
    pub room_id: String,
    pub replacement_room: Option<String>,
}

impl TombstoneEvent {
    pub fn parse(event: &Value) -> Result<Self> {
        let room_id = event
            .get("room_id")
            .and_then(Value::as_str)
            .ok_or_else(|| PingStatError::invalid_observation("room_id", "missing"))?;
        let replacement_room = event
            .get("content")
            .and_then(|content| content.get("replacement_room"))
            .and_then(Value::as_str)
            .filter(|room| !room.is_empty())
            .map(str::to_string);
        Ok(Self {
            room_id: room_id.to_string(),
            replacement_room,
        })
    }
}

/// Result of recording one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded,
    /// Already stored; retries of the same acknowledgment land here
    Duplicate,
}

/// Result of handling one chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Recorded,
    Duplicate,
    Migrated { samples: u64 },
    Ignored,
}

/// Writes observations into a sample store
#[derive(Clone)]
pub struct PongIngestor {
    store: Arc<dyn SampleStore>,
}

impl PongIngestor {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Validate and store one observation
    ///
    /// Duplicates are not errors: the acknowledgment channel delivers at least
    /// once, so a repeated (room, ping, pong_server) is reported as `Duplicate`.
    pub async fn record(&self, observation: &Observation) -> Result<RecordOutcome> {
        let sample = observation.validate().inspect_err(|e| {
            warn!(error = %e, "Dropping invalid observation");
        })?;

        match self.store.insert(sample).await {
            Ok(()) => Ok(RecordOutcome::Recorded),
            Err(PingStatError::DuplicateKey {
                room_id,
                ping_id,
                pong_server,
            }) => {
                debug!(%room_id, %ping_id, %pong_server, "Ignoring duplicate pong");
                Ok(RecordOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    /// Move a superseded room's samples to its replacement
    ///
    /// No-op without a replacement. Repeating a finished migration finds no
    /// samples left under the old id and returns 0.
    pub async fn migrate_on_tombstone(
        &self,
        old_room_id: &str,
        replacement_room_id: Option<&str>,
    ) -> Result<u64> {
        let Some(new_room_id) = replacement_room_id else {
            debug!(room_id = %old_room_id, "Tombstone without replacement room, nothing to migrate");
            return Ok(0);
        };
        ValidatedRoomId::new(old_room_id).map_err(invalid("room_id"))?;
        ValidatedRoomId::new(new_room_id).map_err(invalid("replacement_room"))?;

        let moved = self.store.rewrite_room(old_room_id, new_room_id).await?;
        if moved > 0 {
            info!(
                old_room_id = %old_room_id,
                new_room_id = %new_room_id,
                samples = moved,
                "Migrated samples to replacement room"
            );
        }
        Ok(moved)
    }

    /// Dispatch a raw chat event: tombstones migrate, pongs are recorded,
    /// anything else is ignored
    pub async fn handle_event(&self, event: &Value) -> Result<EventOutcome> {
        if event.get("type").and_then(Value::as_str) == Some(TOMBSTONE_EVENT_TYPE) {
            let tombstone = TombstoneEvent::parse(event)?;
            let samples = self
                .migrate_on_tombstone(&tombstone.room_id, tombstone.replacement_room.as_deref())
                .await?;
            return Ok(EventOutcome::Migrated { samples });
        }

        let observation = match PongEvent::parse(event) {
            Ok(Some(observation)) => observation,
            Ok(None) => return Ok(EventOutcome::Ignored),
            Err(e) => {
                let event_id = event.get("event_id").and_then(Value::as_str).unwrap_or("?");
                warn!(%event_id, error = %e, "Event had invalid pong data");
                return Err(e);
            }
        };

        Ok(match self.record(&observation).await? {
            RecordOutcome::Recorded => EventOutcome::Recorded,
            RecordOutcome::Duplicate => EventOutcome::Duplicate,
        })
    }
}
