//! Timestamp helpers.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! precision, so string order in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as a storable timestamp.
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Format a timestamp for storage.
pub fn to_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Returns `None` for malformed input.
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
