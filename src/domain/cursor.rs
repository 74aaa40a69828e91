//! Cursor timestamps: lenient parsing of client input and one canonical output form.
//!
//! Every timestamp leaving the service (item fields, `next_cursor`, cache keys) goes
//! through [`format_timestamp`], which renders RFC 3339 in UTC with a `Z` designator and
//! sub-second digits only when they are non-zero.

use time::{
    Date, OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::{FormatItem, well_known::Rfc3339},
    macros::format_description,
};

use super::error::DomainError;

const NAIVE_DATE_TIME_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse an ISO-8601 cursor.
///
/// Accepted shapes, tried in order:
/// - RFC 3339 with `Z` or a numeric offset (`2025-01-01T09:00:00+09:00`)
/// - a date-time without offset, read as UTC (`2025-01-01T00:00:00`)
/// - a bare date, read as midnight UTC (`2025-01-01`)
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, DomainError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DomainError::invalid_cursor(raw, "cursor must not be empty"));
    }

    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return to_utc(parsed)
            .ok_or_else(|| DomainError::invalid_cursor(raw, "timestamp is out of range in UTC"));
    }

    if let Ok(parsed) = PrimitiveDateTime::parse(value, NAIVE_DATE_TIME_FORMAT) {
        return Ok(parsed.assume_utc());
    }

    match Date::parse(value, DATE_FORMAT) {
        Ok(date) => Ok(date.midnight().assume_utc()),
        Err(err) => Err(DomainError::invalid_cursor(
            raw,
            format!("not a valid ISO 8601 timestamp ({err})"),
        )),
    }
}

/// Render a timestamp in the canonical output form.
pub fn format_timestamp(value: OffsetDateTime) -> Result<String, DomainError> {
    to_utc(value)
        .ok_or_else(|| DomainError::unrepresentable("timestamp is out of range in UTC"))?
        .format(&Rfc3339)
        .map_err(|err| DomainError::unrepresentable(err.to_string()))
}

/// `None` when the instant falls outside the representable year range once shifted to UTC.
fn to_utc(value: OffsetDateTime) -> Option<OffsetDateTime> {
    value.checked_to_offset(UtcOffset::UTC)
}

/// A client-supplied page boundary: the text as sent plus its parsed instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    raw: String,
    at: OffsetDateTime,
}

impl Cursor {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let at = parse_timestamp(raw)?;
        Ok(Self {
            raw: raw.trim().to_string(),
            at,
        })
    }

    /// Cursor for an instant chosen by the server, carrying its canonical text.
    pub fn from_timestamp(at: OffsetDateTime) -> Result<Self, DomainError> {
        let at = to_utc(at)
            .ok_or_else(|| DomainError::unrepresentable("timestamp is out of range in UTC"))?;
        Ok(Self {
            raw: format_timestamp(at)?,
            at,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn at(&self) -> OffsetDateTime {
        self.at
    }
}

/// `serde(with = ...)` adapter that serializes through [`format_timestamp`].
pub mod canonical {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use time::{OffsetDateTime, format_description::well_known::Rfc3339};

    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rendered = super::format_timestamp(*value).map_err(ser::Error::custom)?;
        serializer.serialize_str(&rendered)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let parsed = OffsetDateTime::parse(&raw, &Rfc3339).map_err(de::Error::custom)?;
        super::to_utc(parsed)
            .ok_or_else(|| de::Error::custom(format!("timestamp `{raw}` is out of range in UTC")))
    }
}
