use chrono::{DateTime, Duration, TimeZone};
use now::DateTimeNow;

/// Hour of the local day the timeline is anchored at.
pub const REFERENCE_HOUR: i64 = 8;

/// Hours that get a tick on the timeline.
pub const MARKED_HOURS: std::ops::RangeInclusive<i64> = 8..=23;

/// Returns the reference hour of the day `date` belongs to.
pub fn day_anchor<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    date.beginning_of_day() + Duration::hours(REFERENCE_HOUR)
}

/// Returns the marked hours of the day `date` belongs to.
pub fn hour_marks<Tz: TimeZone>(date: DateTime<Tz>) -> Vec<DateTime<Tz>> {
    let start = date.beginning_of_day();
    MARKED_HOURS
        .map(|hour| start.clone() + Duration::hours(hour))
        .collect()
}
