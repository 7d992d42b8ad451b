//! Stateless date parsing and formatting, safe to call from any thread.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::{ConnectorError, Result};

/// Formats a timestamp the way metadata values are emitted.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ConnectorError::Config {
            reason: format!("unparsable date '{}', expected YYYY-MM-DD", s),
        })
}
