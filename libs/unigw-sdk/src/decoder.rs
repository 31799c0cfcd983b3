//! Response decoding keyed by the declared content type.
//!
//! A body that does not parse is never an error for the caller: the response
//! comes back as `R::default()` marked unsuccessful, with the raw body set,
//! and the parse error is kept next to it for logging.

use crate::response::GatewayResponse;
use serde_json::Value;
use thiserror::Error;

/// Content type that selects XML decoding
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Wire format of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
}

impl ResponseFormat {
    /// Exactly `text/xml` selects XML; anything else, empty included, is JSON.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type == XML_CONTENT_TYPE {
            Self::Xml
        } else {
            Self::Json
        }
    }
}

/// Why a body could not be decoded
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed XML response: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Well-formed JSON whose top level is an array or a scalar
    #[error("JSON response is not an object")]
    NotAnObject,
}

/// Outcome of [`decode`]: always a response, plus the parse error if any
#[derive(Debug)]
pub struct Decoded<R> {
    response: R,
    error: Option<DecodeError>,
}

impl<R> Decoded<R> {
    #[must_use]
    pub fn response(&self) -> &R {
        &self.response
    }

    #[must_use]
    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn is_decoded(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn into_response(self) -> R {
        self.response
    }

    #[must_use]
    pub fn into_parts(self) -> (R, Option<DecodeError>) {
        (self.response, self.error)
    }
}

/// Decode `body` into `R` as selected by `content_type`.
///
/// On success the raw body is attached and success is left to `R`'s own
/// derivation. On failure `R::default()` is returned with success forced to
/// `false` and the raw body attached. A JSON body must be an object at the
/// top level.
pub fn decode<R: GatewayResponse>(body: &str, content_type: &str) -> Decoded<R> {
    let format = ResponseFormat::from_content_type(content_type);
    let parsed: Result<R, DecodeError> = match format {
        ResponseFormat::Json => decode_json(body),
        ResponseFormat::Xml => quick_xml::de::from_str(body).map_err(DecodeError::from),
    };

    match parsed {
        Ok(mut response) => {
            response.set_body(body.to_owned());
            Decoded {
                response,
                error: None,
            }
        }
        Err(error) => {
            tracing::warn!(
                format = ?format,
                error = %error,
                body_len = body.len(),
                "failed to decode gateway response; returning it as unsuccessful"
            );
            let mut response = R::default();
            response.set_success(false);
            response.set_body(body.to_owned());
            Decoded {
                response,
                error: Some(error),
            }
        }
    }
}

fn decode_json<R: GatewayResponse>(body: &str) -> Result<R, DecodeError> {
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}
