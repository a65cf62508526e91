use chrono::{DateTime, SecondsFormat, Utc};

/// Seconds since the unix epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// ISO-8601 with an explicit UTC offset, e.g. `2024-05-01T09:30:00+00:00`.
pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn iso8601_from_epoch(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(iso8601)
}
