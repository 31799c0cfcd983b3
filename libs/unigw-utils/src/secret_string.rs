use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credential string that never shows up in logs.
///
/// `Debug` and `Display` print `[REDACTED]`. The buffer is wiped on drop.
/// Read the value through [`expose`](Self::expose) only where it is consumed,
/// e.g. when feeding the token digest.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plain value. Do not log or persist it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Deserialize only: a secret loaded from config must not be written back out.
#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn formatting_is_redacted() {
        let s = SecretString::new("gw-secret-123");
        assert_eq!(format!("{s:?}"), "[REDACTED]");
        assert_eq!(format!("{s}"), "[REDACTED]");
        assert!(!format!("{s:?}").contains("gw-secret"));
    }

    #[test]
    fn expose_returns_original_value() {
        let s = SecretString::from("gw-secret-123");
        assert_eq!(s.expose(), "gw-secret-123");
        assert!(!s.is_empty());
        assert!(SecretString::default().is_empty());
    }

    #[test]
    fn zeroize_clears_buffer() {
        let mut s = SecretString::new("sensitive");
        s.zeroize();
        assert!(s.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_from_plain_string() {
        #[derive(serde::Deserialize)]
        struct Creds {
            secret: SecretString,
        }

        let creds: Creds = serde_json::from_str(r#"{"secret":"abc"}"#).unwrap();
        assert_eq!(creds.secret.expose(), "abc");
    }
}
