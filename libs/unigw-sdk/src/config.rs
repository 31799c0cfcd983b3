use crate::error::GatewayError;
use figment::Figment;
use serde::Deserialize;
use std::time::Duration;
use unigw_crypto::token::DEFAULT_UTC_OFFSET_MINUTES;
use unigw_http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_USER_AGENT, ExponentialBackoff};
use unigw_utils::SecretString;

/// Gateway client configuration
///
/// Durations are humantime strings (`"2s"`, `"1500ms"`). Missing fields take
/// their defaults; unknown fields are rejected.
///
/// ```yaml
/// server_url: https://gwapi.example.com/api/
/// app_id: my-app
/// app_secret: s3cr3t
/// connect_timeout: 2s
/// read_timeout: 30s
/// retry_count: 1
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway base URL; `/` is appended when missing
    pub server_url: String,

    pub app_id: String,

    pub app_secret: SecretString,

    /// Caller's open id, kept for request builders that need it
    pub open_id: String,

    /// TCP connect timeout (default: 2s)
    #[serde(with = "unigw_utils::humantime_serde")]
    pub connect_timeout: Duration,

    /// Read timeout (default: 30s)
    #[serde(with = "unigw_utils::humantime_serde")]
    pub read_timeout: Duration,

    /// Extra attempts after a failed one (default: 0)
    pub retry_count: usize,

    /// Delay between attempts; none by default
    pub retry_backoff: Option<ExponentialBackoff>,

    /// Verify the gateway certificate (default: true)
    pub verify_tls: bool,

    /// Permit plain `http://` server URLs (default: false)
    pub allow_insecure_http: bool,

    /// Zone of the signed timestamp, minutes east of UTC (default: 480)
    pub utc_offset_minutes: i32,

    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            app_id: String::new(),
            app_secret: SecretString::default(),
            open_id: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry_count: 0,
            retry_backoff: None,
            verify_tls: true,
            allow_insecure_http: false,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Extract from an assembled figment.
    ///
    /// # Errors
    /// [`GatewayError::Config`] when a value has the wrong type or a field is unknown.
    pub fn from_figment(figment: &Figment) -> Result<Self, GatewayError> {
        figment
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}
