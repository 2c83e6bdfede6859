// Wrapper Components
// Store wrappers that apply tracing and metrics uniformly to every backend.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::contracts::{Sample, SampleStore, ScanFilter};
use crate::error::Result;
use crate::observability::*;

/// Store wrapper that adds automatic tracing to all operations
pub struct TracedStore<S: SampleStore> {
    inner: S,
    trace_id: Uuid,
    operation_count: AtomicU64,
}

impl<S: SampleStore> TracedStore<S> {
    /// Wrap a store implementation with tracing
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            trace_id: Uuid::new_v4(),
            operation_count: AtomicU64::new(0),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Number of store calls made through this wrapper
    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn increment_op_count(&self) {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl<S: SampleStore> SampleStore for TracedStore<S> {
    async fn insert(&self, sample: Sample) -> Result<()> {
        self.increment_op_count();

        let mut ctx = OperationContext::new("store.insert");
        ctx.add_attribute("store", self.trace_id.to_string());
        ctx.add_attribute("ping_server", sample.ping_server.clone());
        let op = Operation::SampleInsert {
            room_id: sample.room_id.clone(),
            ping_id: sample.ping_id.clone(),
            pong_server: sample.pong_server.clone(),
        };

        let result = self.inner.insert(sample).await;
        log_operation(&ctx, &op, &result);
        result
    }

    async fn scan(&self, room_id: &str, filter: &ScanFilter) -> Result<Vec<Sample>> {
        self.increment_op_count();

        let mut ctx = OperationContext::new("store.scan");
        ctx.add_attribute("store", self.trace_id.to_string());
        ctx.add_attribute("min_timestamp", filter.min_timestamp.to_string());
        ctx.add_attribute("max_timestamp", filter.max_timestamp.to_string());

        let result = self.inner.scan(room_id, filter).await;
        let op = Operation::SampleScan {
            room_id: room_id.to_string(),
            result_count: result.as_ref().map(Vec::len).unwrap_or(0),
        };
        log_operation(&ctx, &op, &result.as_ref().map(|_| ()));
        result
    }

    async fn rewrite_room(&self, old_room_id: &str, new_room_id: &str) -> Result<u64> {
        self.increment_op_count();

        let ctx = OperationContext::new("store.rewrite_room");
        let result = self.inner.rewrite_room(old_room_id, new_room_id).await;
        if let Ok(rows) = &result {
            debug!(
                "[{}] Rewrote {} sample(s) from {} to {}",
                self.trace_id, rows, old_room_id, new_room_id
            );
        }

        let op = Operation::RoomRewrite {
            old_room_id: old_room_id.to_string(),
            new_room_id: new_room_id.to_string(),
        };
        log_operation(&ctx, &op, &result.as_ref().map(|_| ()));
        result
    }

    async fn count(&self, room_id: &str) -> Result<u64> {
        self.increment_op_count();
        self.inner.count(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryStorage;

    #[tokio::test]
    async fn test_traced_store_delegates_and_counts() -> anyhow::Result<()> {
        let store = TracedStore::new(MemoryStorage::new());
        store
            .insert(Sample {
                room_id: "!r".into(),
                ping_id: "$p".into(),
                pong_server: "b".into(),
                ping_server: "a".into(),
                receive_diff: 5,
                pong_timestamp: 10,
            })
            .await?;

        let rows = store.scan("!r", &ScanFilter::unbounded()).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(store.rewrite_room("!r", "!s").await?, 1);
        assert_eq!(store.count("!s").await?, 1);
        assert_eq!(store.operation_count(), 4);
        assert!(crate::observability::scanned_samples() >= 1);
        Ok(())
    }
}
