// StatsService - Room statistics shared by the CLI and the HTTP API
//
// Resolves a window, scans the store and aggregates. Presentation (text or
// JSON) happens on top of the returned report.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::aggregation::{aggregate, RoomSummary};
use crate::contracts::{Sample, SampleStore};
use crate::disclaimer::DisclaimerLookup;
use crate::duration_format::prettify_diff;
use crate::error::Result;
use crate::observability::{log_operation, Operation, OperationContext};
use crate::window::{Window, WindowQuery, DEFAULT_MAX_SPAN_SECS, UNBOUNDED_SPAN};

/// Aggregated statistics plus the context they were computed in
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatsReport {
    #[serde(flatten)]
    pub summary: RoomSummary,
    pub disclaimer: String,
    pub window: Window,
}

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn SampleStore>,
    disclaimers: Arc<dyn DisclaimerLookup>,
}

impl StatsService {
    pub fn new(store: Arc<dyn SampleStore>, disclaimers: Arc<dyn DisclaimerLookup>) -> Self {
        Self { store, disclaimers }
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Aggregate a room over the requested window (span capped at 7 days by default)
    pub async fn room_stats(&self, room_id: &str, query: &WindowQuery) -> Result<RoomStatsReport> {
        let window = Window::resolve(query, DEFAULT_MAX_SPAN_SECS);
        self.room_stats_in(room_id, window).await
    }

    /// Aggregate a room over an already resolved window
    pub async fn room_stats_in(&self, room_id: &str, window: Window) -> Result<RoomStatsReport> {
        let samples = self.store.scan(room_id, &window.filter()).await?;

        let mut ctx = OperationContext::new("aggregate");
        ctx.add_attribute("room_id", room_id);
        let result = aggregate(&samples, room_id);
        log_operation(
            &ctx,
            &Operation::Aggregate {
                room_id: room_id.to_string(),
                sample_count: samples.len(),
            },
            &result.as_ref().map(|_| ()),
        );

        Ok(RoomStatsReport {
            summary: result?,
            disclaimer: self.disclaimers.disclaimer_for(room_id).to_string(),
            window,
        })
    }

    /// Samples in the window, oldest first; no span cap unless one is requested
    pub async fn raw_samples(&self, room_id: &str, query: &WindowQuery) -> Result<Vec<Sample>> {
        let window = Window::resolve(query, UNBOUNDED_SPAN);
        let mut samples = self.store.scan(room_id, &window.filter()).await?;
        samples.sort_by(|a, b| {
            a.pong_timestamp
                .cmp(&b.pong_timestamp)
                .then_with(|| a.key().cmp(&b.key()))
        });
        debug!(room_id, count = samples.len(), "Exporting raw samples");
        Ok(samples)
    }
}

/// Plain-text ranking of the ping servers in a report
pub fn render_text_report(report: &RoomStatsReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    let _ = writeln!(out, "Ping statistics for {}", summary.room_id);
    let _ = writeln!(out);
    if summary.is_empty() {
        let _ = writeln!(out, "No pongs in the selected window.");
    } else {
        let _ = writeln!(out, "Room mean: {}", prettify_diff(summary.mean));
        let _ = writeln!(
            out,
            "{} servers responded: {}",
            summary.pongservers.len(),
            summary.pongservers.join(", ")
        );
        let _ = writeln!(out);
        for (rank, (ping_server, ping)) in summary.pings.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} ({} pings, {} responders): median {}, mean {}, gmean {}",
                rank + 1,
                ping_server,
                ping.pings.len(),
                ping.pongs.len(),
                prettify_diff(ping.median),
                prettify_diff(ping.mean),
                prettify_diff(ping.gmean),
            );
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.disclaimer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclaimer::Disclaimers;
    use crate::error::PingStatError;
    use crate::memory_storage::MemoryStorage;
    use chrono::Utc;

    fn sample(ping_server: &str, pong_server: &str, ping_id: &str, diff: i64, age_ms: i64) -> Sample {
        Sample {
            room_id: "!room:example.org".into(),
            ping_id: ping_id.into(),
            pong_server: pong_server.into(),
            ping_server: ping_server.into(),
            receive_diff: diff,
            pong_timestamp: Utc::now().timestamp_millis() - age_ms,
        }
    }

    async fn service(samples: Vec<Sample>) -> anyhow::Result<StatsService> {
        let store = Arc::new(MemoryStorage::new());
        for s in samples {
            store.insert(s).await?;
        }
        Ok(StatsService::new(
            store,
            Arc::new(Disclaimers::new("default text").with_room("!room:example.org", "room text")),
        ))
    }

    #[tokio::test]
    async fn test_room_stats_ranks_and_attaches_disclaimer() -> anyhow::Result<()> {
        let svc = service(vec![
            sample("slow.example", "a.example", "$1", 900, 1_000),
            sample("fast.example", "a.example", "$2", 100, 2_000),
            sample("fast.example", "b.example", "$2", 300, 2_000),
        ])
        .await?;

        let report = svc.room_stats("!room:example.org", &WindowQuery::default()).await?;
        let order: Vec<&str> = report.summary.pings.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["fast.example", "slow.example"]);
        assert_eq!(report.disclaimer, "room text");
        assert_eq!(report.summary.pongservers, vec!["a.example", "b.example"]);

        let text = render_text_report(&report);
        assert!(text.contains("1. fast.example"));
        assert!(text.contains("2. slow.example"));
        assert!(text.contains("median 200 ms"));
        assert!(text.ends_with("room text\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_window_excludes_old_samples() -> anyhow::Result<()> {
        let svc = service(vec![
            sample("a.example", "b.example", "$new", 10, 1_000),
            sample("a.example", "b.example", "$old", 10, 3_600_000),
        ])
        .await?;

        let query = WindowQuery::with_ages(None, Some(60), None);
        let report = svc.room_stats("!room:example.org", &query).await?;
        assert_eq!(report.summary.pings["a.example"].pings, vec!["$new"]);

        let raw = svc.raw_samples("!room:example.org", &WindowQuery::default()).await?;
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].ping_id, "$old");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_sample_fails_whole_report() -> anyhow::Result<()> {
        let svc = service(vec![
            sample("a.example", "b.example", "$1", 10, 1_000),
            sample("a.example", "c.example", "$1", 0, 1_000),
        ])
        .await?;
        let err = svc
            .room_stats("!room:example.org", &WindowQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PingStatError::InvalidSample { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_room_report() -> anyhow::Result<()> {
        let svc = service(vec![]).await?;
        let report = svc.room_stats("!empty:example.org", &WindowQuery::default()).await?;
        assert!(report.summary.is_empty());
        assert_eq!(report.disclaimer, "default text");
        assert!(render_text_report(&report).contains("No pongs"));
        Ok(())
    }
}
