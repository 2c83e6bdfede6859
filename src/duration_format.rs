// Duration Formatter
// Human-readable rendering of signed millisecond durations

/// Precision of the millisecond and second ranges
pub const DEFAULT_DECIMALS: u32 = 1;

const MS_PER_SECOND: f64 = 1_000.0;
const SECONDS_RANGE_MS: f64 = 10.0 * MS_PER_SECOND;
const MINUTES_RANGE_MS: f64 = 60.0 * MS_PER_SECOND;
const HOURS_RANGE_MS: f64 = 60.0 * MINUTES_RANGE_MS;
const DAYS_RANGE_MS: f64 = 24.0 * HOURS_RANGE_MS;

/// Round half to even, so `2.5` seconds renders as `2`
fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// Shortest rendering of an already rounded number: `5.0` -> `5`, `5.5` -> `5.5`
fn render_number(value: f64) -> String {
    if value == 0.0 {
        // Also folds -0.0
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Floor-based divmod, matching the sign behaviour of the decomposition below
fn divmod(value: f64, divisor: f64) -> (f64, f64) {
    let quotient = (value / divisor).floor();
    (quotient, value - quotient * divisor)
}

/// Render `value unit`, pluralized unless the rounded value is exactly 1
pub fn plural(value: f64, unit: &str, decimals: Option<u32>) -> String {
    let rounded = round_to(value, decimals.unwrap_or(0));
    if rounded == 1.0 {
        format!("{} {unit}", render_number(rounded))
    } else {
        format!("{} {unit}s", render_number(rounded))
    }
}

/// Format a duration given in milliseconds
pub fn prettify_diff(diff_ms: f64) -> String {
    prettify_diff_with(diff_ms, None)
}

/// Format a duration, overriding the precision of the ms/seconds ranges
///
/// Unit selection uses the absolute value; negative durations go through the
/// same divmod steps, so a component can come out positive next to a
/// negative one (`-65000` is `-2 minutes and 55 seconds`).
pub fn prettify_diff_with(diff_ms: f64, decimals: Option<u32>) -> String {
    let precision = decimals.unwrap_or(DEFAULT_DECIMALS);
    let magnitude = diff_ms.abs();

    if magnitude < SECONDS_RANGE_MS {
        return format!("{} ms", render_number(round_to(diff_ms, precision)));
    }
    if magnitude < MINUTES_RANGE_MS {
        return plural(diff_ms / MS_PER_SECOND, "second", Some(precision));
    }

    let (minutes, seconds) = divmod(diff_ms / MS_PER_SECOND, 60.0);
    if magnitude < HOURS_RANGE_MS {
        return format!(
            "{} and {}",
            plural(minutes, "minute", None),
            plural(seconds, "second", None)
        );
    }

    let (hours, minutes) = divmod(minutes, 60.0);
    if magnitude < DAYS_RANGE_MS {
        return format!(
            "{}, {} and {}",
            plural(hours, "hour", None),
            plural(minutes, "minute", None),
            plural(seconds, "second", None)
        );
    }

    let (days, hours) = divmod(hours, 24.0);
    format!(
        "{}, {}, {} and {}",
        plural(days, "day", None),
        plural(hours, "hour", None),
        plural(minutes, "minute", None),
        plural(seconds, "second", None)
    )
}
