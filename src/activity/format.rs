const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Formats a duration in milliseconds for rollup tables.
///
/// The subordinate unit is rounded without carrying into the leading one, so `59.6s` is shown as
/// `60s` and `1h 59m 40s` as `1h 60m`.
pub fn format_duration(millis: i64) -> String {
    if millis < SECOND_MS {
        return "<1s".into();
    }
    if millis < HOUR_MS {
        let minutes = millis / MINUTE_MS;
        let seconds = rounded(millis % MINUTE_MS, SECOND_MS);
        return if minutes > 0 {
            format!("{minutes}m {seconds}s")
        } else {
            format!("{seconds}s")
        };
    }
    let hours = millis / HOUR_MS;
    let minutes = rounded(millis % HOUR_MS, MINUTE_MS);
    format!("{hours}h {minutes}m")
}

fn rounded(value: i64, unit: i64) -> i64 {
    (value as f64 / unit as f64).round() as i64
}
