use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Canonical render format: UTC, microsecond precision, sortable.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("invalid timestamp '{value}': not an absolute time or a relative offset like '-10m'")]
    InvalidTimestamp { value: String },
}

/// A point in time used for all interval logic: always UTC, truncated to
/// microsecond resolution so that a value survives a string round-trip.
///
/// Lexicographic order of `to_string()` agrees with `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncates to microsecond resolution.
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        let micros = value.timestamp_micros();
        Self(DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(value))
    }

    /// Parse an optional timestamp expression.
    ///
    /// `None` means "now". A leading sign with a number and a unit
    /// (`s`/`m`/`h`/`d`) is an offset relative to now (`-10m` is ten
    /// minutes ago). Anything else must be an absolute RFC 3339 / ISO-8601
    /// string, with date-only values anchored at midnight UTC.
    pub fn parse(value: Option<&str>) -> Result<Self, TimestampError> {
        let raw = match value {
            None => return Ok(Self::now()),
            Some(raw) => raw.trim(),
        };
        if raw.is_empty() {
            return Err(TimestampError::InvalidTimestamp {
                value: raw.to_string(),
            });
        }

        if let Some(relative) = Self::parse_relative(raw) {
            return Ok(relative);
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::from_datetime(parsed.with_timezone(&Utc)));
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self::from_datetime(parsed.and_utc()));
        }
        if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return Ok(Self::from_datetime(midnight.and_utc()));
            }
        }

        Err(TimestampError::InvalidTimestamp {
            value: raw.to_string(),
        })
    }

    fn parse_relative(raw: &str) -> Option<Self> {
        let (negative, rest) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+')?),
        };
        if rest.len() < 2 {
            return None;
        }
        let (digits, unit) = rest.split_at(rest.len() - 1);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let amount: i64 = digits.parse().ok()?;
        let delta = match unit {
            "s" => Duration::seconds(amount),
            "m" => Duration::minutes(amount),
            "h" => Duration::hours(amount),
            "d" => Duration::days(amount),
            _ => return None,
        };
        let now = Self::now();
        Some(if negative {
            now.subtract(delta)
        } else {
            now.add_delta(delta)
        })
    }

    pub fn add_delta(&self, delta: Duration) -> Timestamp {
        Self::from_datetime(self.0 + delta)
    }

    pub fn subtract(&self, delta: Duration) -> Timestamp {
        Self::from_datetime(self.0 - delta)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_datetime(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(Some(&raw)).map_err(serde::de::Error::custom)
    }
}
