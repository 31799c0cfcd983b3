//! Per-request token derivation.
//!
//! `token = hex(SM3("app_id" + app_id + "timestamp" + timestamp + "trans_id" + trans_id + secret))`
//!
//! The timestamp is rendered as `YYYY-MM-DD HH:MM:SS.mmm` in a fixed UTC
//! offset (`+08:00` unless configured otherwise).

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use zeroize::Zeroize;

use crate::sm3;

pub const APP_ID_KEY: &str = "app_id";
/// Wire name of the secret field. The misspelling is what the gateway uses.
pub const APP_SECRET_KEY: &str = "app_secrect";
pub const TOKEN_KEY: &str = "token";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const TRANS_ID_KEY: &str = "trans_id";

/// Default signing zone, UTC+8.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 8 * 60;
const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
const MAX_UTC_OFFSET_MINUTES: i32 = 13 * 60;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TRANS_ID_TIME_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const TRANS_ID_RANDOM_DIGITS: usize = 4;

static TRANS_ID_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Errors raised while deriving a token.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SignError {
    #[error("missing signing field `{0}`")]
    MissingField(&'static str),

    #[error("signing field `{field}` must be a {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Output of one signing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub token: String,
    pub timestamp: String,
    pub trans_id: String,
}

/// Derives request tokens in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct TokenSigner {
    offset: FixedOffset,
}

impl TokenSigner {
    /// Offsets outside `-12h..=+13h` fall back to UTC.
    #[must_use]
    pub fn new(utc_offset_minutes: i32) -> Self {
        let minutes = if (MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES)
            .contains(&utc_offset_minutes)
        {
            utc_offset_minutes
        } else {
            tracing::warn!(
                utc_offset_minutes,
                "signing offset out of range, falling back to UTC"
            );
            0
        };
        let offset = FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    #[must_use]
    pub fn timestamp_at(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Time digits, a process-wide sequence, then random digits.
    ///
    /// The sequence keeps ids from one process distinct within the same
    /// millisecond; the random tail separates processes.
    #[must_use]
    pub fn generate_trans_id(&self, now: DateTime<Utc>) -> String {
        let seq = TRANS_ID_SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1000;
        format!(
            "{}{seq:03}{}",
            now.with_timezone(&self.offset).format(TRANS_ID_TIME_FORMAT),
            generate_random_number(TRANS_ID_RANDOM_DIGITS)
        )
    }

    /// Sign with the current time and a fresh transaction id.
    ///
    /// # Errors
    /// [`SignError::MissingField`] when `app_id` or `app_secret` is empty.
    pub fn make_token(&self, app_id: &str, app_secret: &str) -> Result<SignedToken, SignError> {
        self.make_token_at(app_id, app_secret, Utc::now())
    }

    /// Same as [`make_token`](Self::make_token) with an explicit clock reading.
    ///
    /// # Errors
    /// [`SignError::MissingField`] when `app_id` or `app_secret` is empty.
    pub fn make_token_at(
        &self,
        app_id: &str,
        app_secret: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedToken, SignError> {
        if app_id.is_empty() {
            return Err(SignError::MissingField(APP_ID_KEY));
        }
        if app_secret.is_empty() {
            return Err(SignError::MissingField(APP_SECRET_KEY));
        }

        let timestamp = self.timestamp_at(now);
        let trans_id = self.generate_trans_id(now);
        let token = compute_token(app_id, &timestamp, &trans_id, app_secret);

        tracing::debug!(app_id, %timestamp, %trans_id, "issued request token");

        Ok(SignedToken {
            token,
            timestamp,
            trans_id,
        })
    }

    /// Sign a parameter map seeded with `app_id` and `app_secrect`.
    ///
    /// On return the map holds `token`, `timestamp` and `trans_id`. The
    /// secret entry is always removed, also on error, and its buffer wiped.
    ///
    /// # Errors
    /// [`SignError::MissingField`] when either credential is absent or empty,
    /// [`SignError::InvalidFieldType`] when either is not a JSON string.
    pub fn sign_params(&self, params: &mut Map<String, Value>) -> Result<SignedToken, SignError> {
        let mut secret = match params.remove(APP_SECRET_KEY) {
            Some(Value::String(secret)) => secret,
            Some(_) => {
                return Err(SignError::InvalidFieldType {
                    field: APP_SECRET_KEY,
                    expected: "string",
                });
            }
            None => return Err(SignError::MissingField(APP_SECRET_KEY)),
        };

        let signed = match params.get(APP_ID_KEY) {
            Some(Value::String(app_id)) => self.make_token(app_id, &secret),
            Some(_) => Err(SignError::InvalidFieldType {
                field: APP_ID_KEY,
                expected: "string",
            }),
            None => Err(SignError::MissingField(APP_ID_KEY)),
        };
        secret.zeroize();
        let signed = signed?;

        params.insert(TOKEN_KEY.to_owned(), Value::String(signed.token.clone()));
        params.insert(
            TIMESTAMP_KEY.to_owned(),
            Value::String(signed.timestamp.clone()),
        );
        params.insert(
            TRANS_ID_KEY.to_owned(),
            Value::String(signed.trans_id.clone()),
        );
        Ok(signed)
    }
}

impl Default for TokenSigner {
    fn default() -> Self {
        Self::new(DEFAULT_UTC_OFFSET_MINUTES)
    }
}

/// Hex SM3 digest of the token input for already chosen parts.
#[must_use]
pub fn compute_token(app_id: &str, timestamp: &str, trans_id: &str, app_secret: &str) -> String {
    let mut input = String::with_capacity(
        APP_ID_KEY.len()
            + app_id.len()
            + TIMESTAMP_KEY.len()
            + timestamp.len()
            + TRANS_ID_KEY.len()
            + trans_id.len()
            + app_secret.len(),
    );
    input.push_str(APP_ID_KEY);
    input.push_str(app_id);
    input.push_str(TIMESTAMP_KEY);
    input.push_str(timestamp);
    input.push_str(TRANS_ID_KEY);
    input.push_str(trans_id);
    input.push_str(app_secret);

    let token = sm3::digest_hex(input.as_bytes());
    input.zeroize();
    token
}

/// Decimal string of exactly `digits` random digits.
#[must_use]
pub fn generate_random_number(digits: usize) -> String {
    let mut rng = rand::rng();
    (0..digits)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
