//! Capture timestamps as written by camera EXIF (`YYYY:MM:DD HH:MM:SS`).

use chrono::NaiveDateTime;

use crate::Real;

pub const TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Signed `b - a` in seconds.
pub fn seconds_between(a: &NaiveDateTime, b: &NaiveDateTime) -> Real {
    (*b - *a).num_milliseconds() as Real / 1000.0
}

/// Serde adapter for `Option<NaiveDateTime>` in [`TIMESTAMP_FORMAT`].
///
/// Unparseable strings deserialize to `None` rather than failing the whole
/// document.
pub mod serde_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}
