// Window Selector
// Turns caller-supplied ages (seconds before now) into absolute scan bounds.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::contracts::ScanFilter;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const DEFAULT_MIN_AGE_SECS: i64 = 0;
pub const DEFAULT_MAX_AGE_SECS: i64 = 7 * SECONDS_PER_DAY;
/// Span cap for aggregated statistics
pub const DEFAULT_MAX_SPAN_SECS: i64 = 7 * SECONDS_PER_DAY;
/// Span cap for raw exports (0 = unbounded)
pub const UNBOUNDED_SPAN: i64 = 0;

/// Raw window parameters as received from a query string
///
/// Values stay unparsed so malformed input can fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowQuery {
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub max_span: Option<String>,
    pub min_diff: Option<String>,
    pub max_diff: Option<String>,
}

impl WindowQuery {
    pub fn with_ages(min_age: Option<i64>, max_age: Option<i64>, max_span: Option<i64>) -> Self {
        Self {
            min_age: min_age.map(|v| v.to_string()),
            max_age: max_age.map(|v| v.to_string()),
            max_span: max_span.map(|v| v.to_string()),
            ..Self::default()
        }
    }
}

/// Absolute, inclusive bounds for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub min_diff: i64,
    pub max_diff: i64,
}

/// Non-negative whole seconds; anything else is treated as absent
fn parse_seconds(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 0)
}

fn parse_diff(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
}

impl Window {
    /// Resolve against the current wall clock
    pub fn resolve(query: &WindowQuery, default_max_span_secs: i64) -> Self {
        Self::resolve_at(query, default_max_span_secs, Utc::now().timestamp_millis())
    }

    /// Resolve against an explicit `now` (milliseconds since epoch)
    ///
    /// A span wider than `max_span` is narrowed by pulling `max_age` in to
    /// `min_age + max_span`; the window is never widened.
    pub fn resolve_at(query: &WindowQuery, default_max_span_secs: i64, now_ms: i64) -> Self {
        let min_age = parse_seconds(query.min_age.as_deref()).unwrap_or(DEFAULT_MIN_AGE_SECS);
        let mut max_age = parse_seconds(query.max_age.as_deref()).unwrap_or(DEFAULT_MAX_AGE_SECS);
        let max_span = parse_seconds(query.max_span.as_deref()).unwrap_or(default_max_span_secs);

        if max_span > 0 && max_age.saturating_sub(min_age) > max_span {
            max_age = min_age.saturating_add(max_span);
        }

        Self {
            min_timestamp: now_ms.saturating_sub(max_age.saturating_mul(1000)),
            max_timestamp: now_ms.saturating_sub(min_age.saturating_mul(1000)),
            min_diff: parse_diff(query.min_diff.as_deref()).unwrap_or(i64::MIN),
            max_diff: parse_diff(query.max_diff.as_deref()).unwrap_or(i64::MAX),
        }
    }

    pub fn span_ms(&self) -> i64 {
        self.max_timestamp.saturating_sub(self.min_timestamp)
    }

    pub fn filter(&self) -> ScanFilter {
        ScanFilter {
            min_timestamp: self.min_timestamp,
            max_timestamp: self.max_timestamp,
            min_diff: self.min_diff,
            max_diff: self.max_diff,
        }
    }
}
