// File-based Storage Implementation
// Durable sample store: an append-only write-ahead log replayed into an
// in-memory table on open. Every accepted mutation is logged and synced
// before it becomes visible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::contracts::{Sample, SampleStore, ScanFilter};
use crate::error::{PingStatError, Result};
use crate::memory_storage::SampleTable;

const WAL_FILE_NAME: &str = "pongs.wal";

/// One logged mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WalRecord {
    Insert {
        sample: Sample,
    },
    RewriteRoom {
        old_room_id: String,
        new_room_id: String,
    },
}

struct FileState {
    table: SampleTable,
    wal: fs::File,
    /// Length of the log up to the last fully synced record
    synced_len: u64,
    /// A failed append left bytes past `synced_len` that could not be cut off
    dirty_tail: bool,
}

impl FileState {
    /// Append one record and sync it; on failure the log is rolled back to
    /// the last synced record so it never holds a mutation the table lacks
    async fn append(&mut self, record: &WalRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        if self.dirty_tail {
            line.insert(0, b'\n');
        }

        match self.write_synced(&line).await {
            Ok(()) => {
                self.synced_len += line.len() as u64;
                self.dirty_tail = false;
                Ok(())
            }
            Err(e) => {
                self.rollback().await;
                Err(e.into())
            }
        }
    }

    async fn write_synced(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.wal.write_all(bytes).await?;
        // Buffered write errors only surface on flush
        self.wal.flush().await?;
        self.wal.sync_data().await
    }

    async fn rollback(&mut self) {
        match self.wal.set_len(self.synced_len).await {
            Ok(()) => debug!(len = self.synced_len, "Rolled back WAL after failed append"),
            Err(e) => {
                warn!(error = %e, "Could not truncate WAL after failed append");
                self.dirty_tail = true;
            }
        }
    }
}

/// Write-ahead-logged sample store rooted at a directory
pub struct FileStorage {
    db_path: PathBuf,
    state: RwLock<FileState>,
}

impl FileStorage {
    /// Open (or create) a store in `path`, replaying any existing log
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&db_path).await?;

        let wal_path = db_path.join(WAL_FILE_NAME);
        let (table, torn_tail) = Self::replay(&wal_path).await?;
        info!(
            path = %db_path.display(),
            samples = table.len(),
            "Opened file sample store"
        );

        let mut wal = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .await?;
        if torn_tail {
            // Terminate a partially written record so new appends start on a fresh line
            wal.write_all(b"\n").await?;
            wal.sync_data().await?;
        }
        let synced_len = wal.metadata().await?.len();

        Ok(Self {
            db_path,
            state: RwLock::new(FileState {
                table,
                wal,
                synced_len,
                dirty_tail: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Rebuild the table from the log; also reports whether the log ends mid-record
    async fn replay(wal_path: &Path) -> Result<(SampleTable, bool)> {
        let mut table = SampleTable::new();
        if !fs::try_exists(wal_path).await? {
            return Ok((table, false));
        }

        // Bytes, not text: a record cut inside a multi-byte character must not
        // fail the whole replay
        let content = fs::read(wal_path).await?;
        for (line_no, line) in content.split(|&b| b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record = match serde_json::from_slice::<WalRecord>(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "Skipping corrupt WAL record");
                    continue;
                }
            };
            let applied = match record {
                WalRecord::Insert { sample } => table.insert(sample).map(|_| ()),
                WalRecord::RewriteRoom {
                    old_room_id,
                    new_room_id,
                } => table.rewrite_room(&old_room_id, &new_room_id).map(|_| ()),
            };
            if let Err(e) = applied {
                warn!(line = line_no + 1, error = %e, "WAL record could not be replayed");
            }
        }

        debug!(samples = table.len(), "WAL replay finished");
        let torn_tail = content.last().is_some_and(|&b| b != b'\n');
        Ok((table, torn_tail))
    }
}

#[async_trait]
impl SampleStore for FileStorage {
    async fn insert(&self, sample: Sample) -> Result<()> {
        let mut state = self.state.write().await;
        state.table.check_insert(&sample)?;
        state
            .append(&WalRecord::Insert {
                sample: sample.clone(),
            })
            .await?;
        state.table.insert(sample)
    }

    async fn scan(&self, room_id: &str, filter: &ScanFilter) -> Result<Vec<Sample>> {
        let state = self.state.read().await;
        Ok(state.table.scan(room_id, filter))
    }

    async fn rewrite_room(&self, old_room_id: &str, new_room_id: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        if old_room_id == new_room_id || state.table.count(old_room_id) == 0 {
            return Ok(0);
        }

        // Validate before logging so rejected rewrites never reach the WAL
        let conflicts = state.table.rewrite_conflicts(old_room_id, new_room_id);
        if conflicts > 0 {
            return Err(PingStatError::KeyCollision {
                old_room_id: old_room_id.to_string(),
                new_room_id: new_room_id.to_string(),
                conflicts,
            });
        }

        state
            .append(&WalRecord::RewriteRoom {
                old_room_id: old_room_id.to_string(),
                new_room_id: new_room_id.to_string(),
            })
            .await?;
        state.table.rewrite_room(old_room_id, new_room_id)
    }

    async fn count(&self, room_id: &str) -> Result<u64> {
        Ok(self.state.read().await.table.count(room_id))
    }
}
