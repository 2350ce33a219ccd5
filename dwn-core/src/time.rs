// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamps carried inside message descriptors.
//!
//! Descriptors store timestamps as ISO-8601 UTC strings with microsecond
//! precision and a `Z` suffix. The fixed width makes timestamps comparable
//! with plain string comparison, which the conflict resolution rule depends
//! on.
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Current time in descriptor format.
pub fn now() -> String {
    Utc::now().format(FORMAT).to_string()
}

/// Parses a descriptor timestamp, rejecting anything which is not in the
/// fixed microsecond UTC form.
pub fn parse(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let timestamp = DateTime::parse_from_rfc3339(value)
        .map_err(|_| TimestampError::InvalidTimestamp(value.to_string()))?
        .with_timezone(&Utc);

    // Reject forms which would break lexicographic comparability.
    if timestamp.to_rfc3339_opts(SecondsFormat::Micros, true) != value {
        return Err(TimestampError::InvalidTimestamp(value.to_string()));
    }

    Ok(timestamp)
}

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("'{0}' is not a microsecond precision UTC timestamp")]
    InvalidTimestamp(String),
}

#[cfg(test)]
mod tests {
    use super::{now, parse};

    #[test]
    fn now_is_parseable() {
        let timestamp = now();
        assert!(parse(&timestamp).is_ok());
    }

    #[test]
    fn fixed_width_forms_only() {
        assert!(parse("2022-04-29T10:30:00.123456Z").is_ok());

        // Millisecond precision, offset notation and missing zulu marker all
        // break string comparability.
        assert!(parse("2022-04-29T10:30:00.123Z").is_err());
        assert!(parse("2022-04-29T10:30:00.123456+00:00").is_err());
        assert!(parse("2022-04-29T10:30:00").is_err());
        assert!(parse("not a timestamp").is_err());
    }

    #[test]
    fn string_order_matches_time_order() {
        let earlier = "2022-04-29T10:30:00.123456Z";
        let later = "2022-04-29T10:30:00.123457Z";
        assert!(earlier < later);
        assert!(parse(earlier).unwrap() < parse(later).unwrap());
    }
}
