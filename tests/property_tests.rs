// Property-based tests for aggregation, windows and duration formatting

use pingstat::aggregation::{geometric_mean, mean, median};
use pingstat::*;
use proptest::prelude::*;

mod strategies {
    use super::*;

    pub fn server_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("a.example".to_string()),
            Just("b.example".to_string()),
            Just("c.example".to_string()),
            Just("d.example".to_string()),
        ]
    }

    /// Samples with unique keys and strictly positive diffs
    pub fn samples_strategy() -> impl Strategy<Value = Vec<Sample>> {
        prop::collection::vec(
            (server_strategy(), server_strategy(), 1i64..100_000),
            1..60,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (ping_server, pong_server, diff))| Sample {
                    room_id: "!room:example.org".to_string(),
                    ping_id: format!("$p{i}"),
                    pong_server,
                    ping_server,
                    receive_diff: diff,
                    pong_timestamp: 1_700_000_000_000 + i as i64,
                })
                .collect()
        })
    }
}

use strategies::*;

proptest! {
    #[test]
    fn test_medians_are_ascending(samples in samples_strategy()) {
        let summary = aggregate(&samples, "!room:example.org").unwrap();
        let medians: Vec<f64> = summary.pings.values().map(|p| p.median).collect();
        prop_assert!(medians.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_pair_mean_is_sum_over_count(samples in samples_strategy()) {
        let summary = aggregate(&samples, "!room:example.org").unwrap();
        for ping in summary.pings.values() {
            for pong in ping.pongs.values() {
                let expected = pong.sum as f64 / pong.diffs.len() as f64;
                prop_assert!((pong.mean - expected).abs() < 1e-9);
                prop_assert!(pong.median >= *pong.diffs.values().min().unwrap() as f64);
                prop_assert!(pong.median <= *pong.diffs.values().max().unwrap() as f64);
            }
        }
    }

    #[test]
    fn test_room_mean_is_unweighted(samples in samples_strategy()) {
        let summary = aggregate(&samples, "!room:example.org").unwrap();
        let expected = summary.pings.values().map(|p| p.mean).sum::<f64>()
            / summary.pings.len() as f64;
        prop_assert!((summary.mean - expected).abs() < 1e-9);
    }

    #[test]
    fn test_every_sample_is_counted_once(samples in samples_strategy()) {
        let summary = aggregate(&samples, "!room:example.org").unwrap();
        let counted: usize = summary
            .pings
            .values()
            .flat_map(|p| p.pongs.values())
            .map(|pong| pong.diffs.len())
            .sum();
        prop_assert_eq!(counted, samples.len());
    }

    #[test]
    fn test_gmean_of_identical_values(value in 1i64..1_000_000, count in 1usize..50) {
        let values = vec![value; count];
        let gmean = geometric_mean(&values).unwrap();
        prop_assert!((gmean - value as f64).abs() / (value as f64) < 1e-9);
        prop_assert_eq!(median(&values), value as f64);
        prop_assert_eq!(mean(&values), value as f64);
    }

    #[test]
    fn test_gmean_bounded_by_mean(values in prop::collection::vec(1i64..100_000, 1..40)) {
        let gmean = geometric_mean(&values).unwrap();
        prop_assert!(gmean <= mean(&values) + 1e-6);
    }

    #[test]
    fn test_non_positive_diff_fails(mut samples in samples_strategy(), bad in -1_000i64..=0) {
        let last = samples.len() - 1;
        samples[last].receive_diff = bad;
        let is_invalid_sample = matches!(
            aggregate(&samples, "!room:example.org"),
            Err(PingStatError::InvalidSample { .. })
        );
        prop_assert!(is_invalid_sample);
    }

    #[test]
    fn test_window_never_exceeds_span(
        min_age in 0i64..1_000_000,
        max_age in 0i64..10_000_000,
        max_span in 1i64..1_000_000,
    ) {
        let query = WindowQuery::with_ages(Some(min_age), Some(max_age), Some(max_span));
        let window = Window::resolve_at(&query, 0, 1_700_000_000_000);
        prop_assert!(window.span_ms() <= max_span * 1000);
    }

    #[test]
    fn test_prettify_never_panics(diff in -1e12f64..1e12) {
        let rendered = prettify_diff(diff);
        prop_assert!(!rendered.is_empty());
        prop_assert!(!rendered.contains("NaN"));
    }
}
