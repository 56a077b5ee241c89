// Clock helpers.
//
// Every backend stores timestamps as epoch milliseconds, so instants are
// taken at that precision to compare equal before and after a round trip.

use chrono::{DateTime, Utc};

/// The current instant, truncated to whole milliseconds.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Drop the sub-millisecond part of `at`.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
