use thiserror::Error;
use unigw_crypto::SignError;
use unigw_http::HttpError;

/// Errors returned by [`GatewayClient`](crate::GatewayClient)
///
/// Decode failures are not errors: they come back as an unsuccessful
/// response carrying the raw body.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Token derivation failed; never retried
    #[error("failed to sign request: {0}")]
    Sign(#[from] SignError),

    /// Dispatch failed after the retry budget was spent
    #[error("gateway request failed: {0}")]
    Transport(#[from] HttpError),

    /// Client-side validation of a request rejected it before sending
    #[error("request rule violated for '{field}': {message}")]
    Rule { field: String, message: String },

    /// Invalid client configuration
    #[error("invalid gateway configuration: {0}")]
    Config(String),

    /// The request envelope could not be serialized
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl GatewayError {
    #[must_use]
    pub fn rule(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rule {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code.
    ///
    /// The HTTP status for status errors, a stable name otherwise. `None` for
    /// transport failures without a more specific class.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Sign(_) => Some("SIGN_FAILED".to_owned()),
            Self::Transport(HttpError::HttpStatus { status, .. }) => {
                Some(status.as_u16().to_string())
            }
            Self::Transport(HttpError::Timeout(_)) => Some("TIMEOUT".to_owned()),
            Self::Transport(_) => None,
            Self::Rule { .. } => Some("RULE_VIOLATION".to_owned()),
            Self::Config(_) => Some("INVALID_CONFIG".to_owned()),
            Self::Serialize(_) => Some("SERIALIZE_FAILED".to_owned()),
        }
    }
}
