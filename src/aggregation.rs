// Aggregation Engine
// Reduces a room's samples to per-responder statistics in three passes:
// group by (ping_server, pong_server), compute statistics, rank by median.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::contracts::Sample;
use crate::error::{PingStatError, Result};

/// Statistics for one (ping_server, pong_server) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongServerStats {
    /// ping_id -> receive_diff
    pub diffs: BTreeMap<String, i64>,
    pub sum: i64,
    pub mean: f64,
    pub median: f64,
    pub gmean: f64,
}

/// Statistics for everything measured on behalf of one ping_server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingServerSummary {
    pub pongs: BTreeMap<String, PongServerStats>,
    /// Distinct ping ids, ascending
    pub pings: Vec<String>,
    pub mean: f64,
    pub median: f64,
    pub gmean: f64,
}

/// Aggregated view of one room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    /// Ordered by ascending median
    pub pings: IndexMap<String, PingServerSummary>,
    /// Unweighted mean of the per-ping_server means
    pub mean: f64,
    /// Every responder seen in the room, ascending
    pub pongservers: Vec<String>,
}

impl RoomSummary {
    pub fn is_empty(&self) -> bool {
        self.pings.is_empty()
    }
}

pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Middle value of the sorted input, or the average of the two middle values
pub fn median(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    }
}

/// `exp(mean(ln x))`; `None` if any value is not strictly positive
pub fn geometric_mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|&v| v <= 0) {
        return None;
    }
    let log_sum: f64 = values.iter().map(|&v| (v as f64).ln()).sum();
    Some((log_sum / values.len() as f64).exp())
}

type PairDiffs<'a> = BTreeMap<&'a str, i64>;

/// Pass 1: ping_server (encounter order) -> pong_server -> ping_id -> diff
fn group_samples(samples: &[Sample]) -> IndexMap<&str, BTreeMap<&str, PairDiffs<'_>>> {
    samples.iter().fold(IndexMap::new(), |mut groups, sample| {
        groups
            .entry(sample.ping_server.as_str())
            .or_insert_with(BTreeMap::new)
            .entry(sample.pong_server.as_str())
            .or_insert_with(BTreeMap::new)
            // Repeated ping_id within a pair: last write wins
            .insert(sample.ping_id.as_str(), sample.receive_diff);
        groups
    })
}

fn pair_stats(
    ping_server: &str,
    pong_server: &str,
    diffs: &PairDiffs<'_>,
) -> Result<PongServerStats> {
    if let Some((ping_id, &diff)) = diffs.iter().find(|(_, diff)| **diff <= 0) {
        return Err(PingStatError::InvalidSample {
            ping_server: ping_server.to_string(),
            pong_server: pong_server.to_string(),
            ping_id: ping_id.to_string(),
            diff,
        });
    }

    let values: Vec<i64> = diffs.values().copied().collect();
    let mut sum: i64 = 0;
    for (ping_id, &diff) in diffs {
        sum = sum.checked_add(diff).ok_or_else(|| PingStatError::InvalidSample {
            ping_server: ping_server.to_string(),
            pong_server: pong_server.to_string(),
            ping_id: ping_id.to_string(),
            diff,
        })?;
    }

    Ok(PongServerStats {
        diffs: diffs
            .iter()
            .map(|(ping_id, &diff)| (ping_id.to_string(), diff))
            .collect(),
        sum,
        mean: mean(&values),
        median: median(&values),
        gmean: geometric_mean(&values).unwrap_or_default(),
    })
}

/// Pass 2 for one ping_server: per-pair statistics plus statistics over the union
fn ping_server_summary(
    ping_server: &str,
    pairs: &BTreeMap<&str, PairDiffs<'_>>,
) -> Result<PingServerSummary> {
    let pongs = pairs
        .iter()
        .map(|(pong_server, diffs)| {
            pair_stats(ping_server, pong_server, diffs)
                .map(|stats| (pong_server.to_string(), stats))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    let all_diffs: Vec<i64> = pairs
        .values()
        .flat_map(|diffs| diffs.values().copied())
        .collect();
    let pings: BTreeSet<&str> = pairs
        .values()
        .flat_map(|diffs| diffs.keys().copied())
        .collect();

    Ok(PingServerSummary {
        pongs,
        pings: pings.into_iter().map(str::to_string).collect(),
        mean: mean(&all_diffs),
        median: median(&all_diffs),
        // Every diff already passed the positivity check in pair_stats
        gmean: geometric_mean(&all_diffs).unwrap_or_default(),
    })
}

/// Aggregate a room's samples
///
/// Fails with `InvalidSample` if any diff is zero or negative; no partial
/// summary is returned in that case.
pub fn aggregate(samples: &[Sample], room_id: &str) -> Result<RoomSummary> {
    let groups = group_samples(samples);

    let mut ranked = groups
        .iter()
        .map(|(ping_server, pairs)| {
            ping_server_summary(ping_server, pairs)
                .map(|summary| (ping_server.to_string(), summary))
        })
        .collect::<Result<Vec<_>>>()?;

    // Pass 3: stable sort, ties keep encounter order
    ranked.sort_by(|(_, a), (_, b)| a.median.total_cmp(&b.median));

    let room_mean = if ranked.is_empty() {
        0.0
    } else {
        ranked.iter().map(|(_, summary)| summary.mean).sum::<f64>() / ranked.len() as f64
    };

    let pongservers: BTreeSet<&str> = samples.iter().map(|s| s.pong_server.as_str()).collect();

    Ok(RoomSummary {
        room_id: room_id.to_string(),
        pings: ranked.into_iter().collect(),
        mean: room_mean,
        pongservers: pongservers.into_iter().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(ping_server: &str, pong_server: &str, ping_id: &str, diff: i64) -> Sample {
        Sample {
            room_id: "!room:example.org".into(),
            ping_id: ping_id.into(),
            pong_server: pong_server.into(),
            ping_server: ping_server.into(),
            receive_diff: diff,
            pong_timestamp: 0,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_empty_input_yields_empty_summary() {
        let summary = aggregate(&[], "!room").unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.mean, 0.0);
        assert!(summary.pongservers.is_empty());
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[30, 10, 20]), 20.0);
        assert_eq!(median(&[40, 10, 30, 20]), 25.0);
        assert_eq!(median(&[7]), 7.0);
    }

    #[test]
    fn test_geometric_mean() {
        assert_close(geometric_mean(&[4, 4, 4]).unwrap(), 4.0);
        assert_close(geometric_mean(&[2, 8]).unwrap(), 4.0);
        assert_eq!(geometric_mean(&[2, 0]), None);
        assert_eq!(geometric_mean(&[2, -3]), None);
    }

    #[test]
    fn test_pair_and_ping_server_statistics() {
        let samples = vec![
            sample("a.org", "x.org", "$1", 100),
            sample("a.org", "x.org", "$2", 300),
            sample("a.org", "y.org", "$1", 200),
        ];
        let summary = aggregate(&samples, "!room").unwrap();

        let a = &summary.pings["a.org"];
        let x = &a.pongs["x.org"];
        assert_eq!(x.sum, 400);
        assert_close(x.mean, 200.0);
        assert_close(x.median, 200.0);
        assert_close(x.gmean, (100.0f64 * 300.0).sqrt());

        let y = &a.pongs["y.org"];
        assert_eq!(y.sum, 200);
        assert_close(y.median, 200.0);
        assert_close(y.gmean, 200.0);

        assert_close(a.mean, 200.0);
        assert_close(a.median, 200.0);
        assert_eq!(a.pings, vec!["$1".to_string(), "$2".to_string()]);
        assert_eq!(summary.pongservers, vec!["x.org", "y.org"]);
    }

    #[test]
    fn test_ranking_by_median_is_stable() {
        let samples = vec![
            sample("slow.org", "x.org", "$1", 900),
            sample("tie-first.org", "x.org", "$1", 50),
            sample("fast.org", "x.org", "$1", 10),
            sample("tie-second.org", "x.org", "$1", 50),
        ];
        let summary = aggregate(&samples, "!room").unwrap();
        let order: Vec<&str> = summary.pings.keys().map(String::as_str).collect();
        assert_eq!(
            order,
            vec!["fast.org", "tie-first.org", "tie-second.org", "slow.org"]
        );
    }

    #[test]
    fn test_room_mean_is_unweighted() {
        let mut samples = vec![sample("a.org", "x.org", "$1", 10)];
        samples.push(sample("b.org", "x.org", "$1", 20));
        samples.push(sample("b.org", "x.org", "$2", 20));
        samples.push(sample("b.org", "y.org", "$3", 20));
        for i in 0..10 {
            samples.push(sample("c.org", "x.org", &format!("${i}"), 30));
        }
        let summary = aggregate(&samples, "!room").unwrap();
        assert_close(summary.mean, 20.0);
    }

    #[test]
    fn test_non_positive_diff_fails_whole_aggregation() {
        let samples = vec![
            sample("a.org", "x.org", "$1", 10),
            sample("b.org", "x.org", "$2", 0),
        ];
        let err = aggregate(&samples, "!room").unwrap_err();
        match err {
            PingStatError::InvalidSample {
                ping_server,
                ping_id,
                diff,
                ..
            } => {
                assert_eq!(ping_server, "b.org");
                assert_eq!(ping_id, "$2");
                assert_eq!(diff, 0);
            }
            other => panic!("unexpected error: {other}"),
        }

        let negative = vec![sample("a.org", "x.org", "$1", -4)];
        assert!(matches!(
            aggregate(&negative, "!room"),
            Err(PingStatError::InvalidSample { .. })
        ));
    }

    #[test]
    fn test_sum_overflow_is_an_error_not_a_panic() {
        let samples = vec![
            sample("a.org", "x.org", "$1", 5_000_000_000_000_000_000),
            sample("a.org", "x.org", "$2", 5_000_000_000_000_000_000),
        ];
        match aggregate(&samples, "!room") {
            Err(PingStatError::InvalidSample { ping_id, .. }) => assert_eq!(ping_id, "$2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_serialized_shape() {
        let samples = vec![sample("a.org", "x.org", "$1", 10)];
        let json = serde_json::to_value(aggregate(&samples, "!room").unwrap()).unwrap();
        assert_eq!(json["pings"]["a.org"]["pongs"]["x.org"]["diffs"]["$1"], 10);
        assert_eq!(json["pings"]["a.org"]["pings"][0], "$1");
        assert_eq!(json["pongservers"][0], "x.org");
        assert_eq!(json["mean"], 10.0);
    }
}
