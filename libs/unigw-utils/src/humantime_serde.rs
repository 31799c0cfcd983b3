//! `Duration` fields as human readable strings (`"2s"`, `"1m 30s"`).
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Timeouts {
//!     #[serde(with = "unigw_utils::humantime_serde")]
//!     read: Duration,
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserializer, Serializer, de};

struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"2s\" or \"500ms\"")
    }

    fn visit_str<E>(self, v: &str) -> Result<Duration, E>
    where
        E: de::Error,
    {
        humantime::parse_duration(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// Deserialize a `Duration` from a humantime string.
///
/// # Errors
/// Fails when the input is not a string or not a valid humantime duration.
pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_str(DurationVisitor)
}

/// Serialize a `Duration` as a humantime string.
///
/// # Errors
/// Propagates serializer errors.
pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.collect_str(&humantime::format_duration(*d))
}

/// Same as the parent module for `Option<Duration>`.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    /// Fails when a present value is not a valid humantime duration.
    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|v| {
            humantime::parse_duration(&v).map_err(|_| {
                serde::de::Error::invalid_value(serde::de::Unexpected::Str(&v), &"a duration")
            })
        })
        .transpose()
    }

    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => s.collect_str(&humantime::format_duration(*d)),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "super")]
        connect: Duration,
        #[serde(with = "super::option", default)]
        backoff: Option<Duration>,
    }

    #[test]
    fn parses_and_formats() {
        let t: Timeouts = serde_json::from_str(r#"{"connect":"2s","backoff":"150ms"}"#).unwrap();
        assert_eq!(t.connect, Duration::from_secs(2));
        assert_eq!(t.backoff, Some(Duration::from_millis(150)));
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"connect":"2s","backoff":"150ms"}"#
        );
    }

    #[test]
    fn missing_option_is_none() {
        let t: Timeouts = serde_json::from_str(r#"{"connect":"1m 30s"}"#).unwrap();
        assert_eq!(t.connect, Duration::from_secs(90));
        assert!(t.backoff.is_none());
    }

    #[test]
    fn rejects_garbage() {
        let err = serde_json::from_str::<Timeouts>(r#"{"connect":"soon"}"#);
        assert!(err.is_err());
    }
}
