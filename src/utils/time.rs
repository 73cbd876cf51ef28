//! Timestamps stored as Unix milliseconds.
//!
//! Use with `#[serde(with = "crate::utils::time")]`.  Values produced by [`now_millis`] carry no
//! sub-millisecond component, so they survive a serialize/deserialize cycle unchanged.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;

/// The current UTC time truncated to whole milliseconds.
pub fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(u32::from(now.millisecond()) * 1_000_000)
        .unwrap_or(now)
}

/// Deserialize Unix milliseconds into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = i64::deserialize(deserializer)?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime as Unix milliseconds
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = datetime.unix_timestamp_nanos() / 1_000_000;
    let millis = i64::try_from(millis).map_err(serde::ser::Error::custom)?;
    serializer.serialize_i64(millis)
}
