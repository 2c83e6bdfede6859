// In-memory Storage Implementation
// Ordered table keyed by (room_id, ping_id, pong_server); also the
// replay target of the file-backed store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::contracts::{Sample, SampleKey, SampleStore, ScanFilter};
use crate::error::{PingStatError, Result};

/// Non-key columns of a stored sample
#[derive(Debug, Clone, PartialEq, Eq)]
struct SampleRow {
    ping_server: String,
    receive_diff: i64,
    pong_timestamp: i64,
}

/// Ordered sample table shared by the memory and file backends
#[derive(Debug, Default)]
pub struct SampleTable {
    rows: BTreeMap<SampleKey, SampleRow>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail with `DuplicateKey` if the sample's key is taken
    pub fn check_insert(&self, sample: &Sample) -> Result<()> {
        if self.rows.contains_key(&sample.key()) {
            return Err(PingStatError::DuplicateKey {
                room_id: sample.room_id.clone(),
                ping_id: sample.ping_id.clone(),
                pong_server: sample.pong_server.clone(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, sample: Sample) -> Result<()> {
        self.check_insert(&sample)?;
        let key = sample.key();
        self.rows.insert(
            key,
            SampleRow {
                ping_server: sample.ping_server,
                receive_diff: sample.receive_diff,
                pong_timestamp: sample.pong_timestamp,
            },
        );
        Ok(())
    }

    fn room_range<'a>(
        &'a self,
        room_id: &'a str,
    ) -> impl Iterator<Item = (&'a SampleKey, &'a SampleRow)> + 'a {
        let start = SampleKey {
            room_id: room_id.to_string(),
            ping_id: String::new(),
            pong_server: String::new(),
        };
        self.rows
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(move |(key, _)| key.room_id == room_id)
    }

    pub fn scan(&self, room_id: &str, filter: &ScanFilter) -> Vec<Sample> {
        self.room_range(room_id)
            .map(|(key, row)| Sample {
                room_id: key.room_id.clone(),
                ping_id: key.ping_id.clone(),
                pong_server: key.pong_server.clone(),
                ping_server: row.ping_server.clone(),
                receive_diff: row.receive_diff,
                pong_timestamp: row.pong_timestamp,
            })
            .filter(|sample| filter.contains(sample))
            .collect()
    }

    pub fn count(&self, room_id: &str) -> u64 {
        self.room_range(room_id).count() as u64
    }

    /// Keys of `old_room_id` that would collide under `new_room_id`
    pub fn rewrite_conflicts(&self, old_room_id: &str, new_room_id: &str) -> u64 {
        if old_room_id == new_room_id {
            return 0;
        }
        self.room_range(old_room_id)
            .filter(|(key, _)| {
                self.rows.contains_key(&SampleKey {
                    room_id: new_room_id.to_string(),
                    ping_id: key.ping_id.clone(),
                    pong_server: key.pong_server.clone(),
                })
            })
            .count() as u64
    }

    /// Check for collisions, then move every row of the old room.
    /// Nothing is modified when a collision is found.
    pub fn rewrite_room(&mut self, old_room_id: &str, new_room_id: &str) -> Result<u64> {
        if old_room_id == new_room_id {
            return Ok(0);
        }

        let conflicts = self.rewrite_conflicts(old_room_id, new_room_id);
        if conflicts > 0 {
            return Err(PingStatError::KeyCollision {
                old_room_id: old_room_id.to_string(),
                new_room_id: new_room_id.to_string(),
                conflicts,
            });
        }

        let keys: Vec<SampleKey> = self
            .room_range(old_room_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(row) = self.rows.remove(key) {
                self.rows.insert(
                    SampleKey {
                        room_id: new_room_id.to_string(),
                        ping_id: key.ping_id.clone(),
                        pong_server: key.pong_server.clone(),
                    },
                    row,
                );
            }
        }

        Ok(keys.len() as u64)
    }
}

/// Volatile sample store, mainly for tests and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryStorage {
    table: RwLock<SampleTable>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleStore for MemoryStorage {
    async fn insert(&self, sample: Sample) -> Result<()> {
        self.table.write().insert(sample)
    }

    async fn scan(&self, room_id: &str, filter: &ScanFilter) -> Result<Vec<Sample>> {
        Ok(self.table.read().scan(room_id, filter))
    }

    async fn rewrite_room(&self, old_room_id: &str, new_room_id: &str) -> Result<u64> {
        // Single write lock: readers see either the old or the new layout
        self.table.write().rewrite_room(old_room_id, new_room_id)
    }

    async fn count(&self, room_id: &str) -> Result<u64> {
        Ok(self.table.read().count(room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(room: &str, ping: &str, pong_server: &str, diff: i64) -> Sample {
        Sample {
            room_id: room.into(),
            ping_id: ping.into(),
            pong_server: pong_server.into(),
            ping_server: "origin.example".into(),
            receive_diff: diff,
            pong_timestamp: 1_000,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let store = MemoryStorage::new();
        store.insert(sample("!a", "$1", "x", 10)).await.unwrap();

        let err = store.insert(sample("!a", "$1", "x", 99)).await.unwrap_err();
        assert!(matches!(err, PingStatError::DuplicateKey { .. }));

        // Same ping answered by another peer is a distinct sample
        store.insert(sample("!a", "$1", "y", 11)).await.unwrap();
        assert_eq!(store.count("!a").await.unwrap(), 2);

        let rows = store.scan("!a", &ScanFilter::unbounded()).await.unwrap();
        let original = rows.iter().find(|s| s.pong_server == "x").unwrap();
        assert_eq!(original.receive_diff, 10);
    }

    #[tokio::test]
    async fn test_scan_is_scoped_to_room() {
        let store = MemoryStorage::new();
        store.insert(sample("!a", "$1", "x", 10)).await.unwrap();
        store.insert(sample("!ab", "$1", "x", 10)).await.unwrap();
        store.insert(sample("!b", "$1", "x", 10)).await.unwrap();

        let rows = store.scan("!a", &ScanFilter::unbounded()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].room_id, "!a");
    }

    #[test]
    fn test_rewrite_collision_leaves_table_untouched() {
        let mut table = SampleTable::new();
        table.insert(sample("!old", "$1", "x", 10)).unwrap();
        table.insert(sample("!old", "$2", "x", 20)).unwrap();
        table.insert(sample("!new", "$2", "x", 30)).unwrap();

        let err = table.rewrite_room("!old", "!new").unwrap_err();
        assert!(matches!(
            err,
            PingStatError::KeyCollision { conflicts: 1, .. }
        ));
        assert_eq!(table.count("!old"), 2);
        assert_eq!(table.count("!new"), 1);
    }

    #[test]
    fn test_rewrite_to_same_room_is_noop() {
        let mut table = SampleTable::new();
        table.insert(sample("!a", "$1", "x", 10)).unwrap();
        assert_eq!(table.rewrite_room("!a", "!a").unwrap(), 0);
        assert_eq!(table.count("!a"), 1);
    }
}
