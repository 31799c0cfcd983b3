use std::time::Duration;

use serde::Deserialize;

/// Default User-Agent string for gateway requests
pub const DEFAULT_USER_AGENT: &str = concat!("unigw-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// `Accept` header sent on every request
pub const DEFAULT_ACCEPT: &str = "text/xml,text/javascript,application/json";

/// Content type of gateway POST bodies
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Content type of form POST bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff between retry attempts
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    #[serde(with = "unigw_utils::humantime_serde")]
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    #[serde(with = "unigw_utils::humantime_serde")]
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% to each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// 1ms initial, 100ms max, no jitter. For tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Fixed-count retry policy
///
/// A request is attempted `retry_count + 1` times at most. Every failure is
/// retried: transport errors, timeouts and status errors alike. The last
/// attempt's error is returned once the budget is spent.
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    /// Additional attempts after the first one (default: 0)
    pub retry_count: usize,

    /// Delay between attempts. `None` (default) retries immediately.
    pub backoff: Option<ExponentialBackoff>,
}

impl RetryConfig {
    #[must_use]
    pub fn new(retry_count: usize) -> Self {
        Self {
            retry_count,
            backoff: None,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Total number of attempts, first one included.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.retry_count.saturating_add(1)
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the dispatcher enforces TLS or allows plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections
    ///
    /// Gateways reachable only over plain HTTP and local mock servers need this.
    AllowInsecureHttp,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// TCP connect timeout (default: 2 seconds)
    pub connect_timeout: Duration,

    /// Read timeout (default: 30 seconds)
    ///
    /// Each attempt as a whole is bounded by `connect_timeout + read_timeout`.
    pub read_timeout: Duration,

    /// Retry policy (default: no retries, no backoff)
    pub retry: RetryConfig,

    /// Verify the server certificate chain (default: true)
    ///
    /// When false, any server certificate is accepted. The setting is scoped
    /// to this dispatcher.
    pub verify_tls: bool,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// User-Agent header value (default: `unigw-sdk-rust/<version>`)
    pub user_agent: String,

    /// Maximum response body size in bytes, after decompression (default: 10 MB)
    pub max_body_size: usize,

    /// Queue capacity of the shared service (default: 1024)
    pub buffer_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: RetryConfig::default(),
            verify_tls: true,
            tls_roots: TlsRootConfig::default(),
            transport: TransportSecurity::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: 10 * 1024 * 1024,
            buffer_capacity: 1024,
        }
    }
}

impl DispatcherConfig {
    /// Upper bound for a single attempt.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        self.connect_timeout.saturating_add(self.read_timeout)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.attempt_timeout(), Duration::from_secs(32));
        assert_eq!(config.retry.retry_count, 0);
        assert!(config.retry.backoff.is_none());
        assert!(config.verify_tls);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert!(config.user_agent.starts_with("unigw-sdk-rust/"));
    }

    #[test]
    fn test_retry_config_attempts() {
        assert_eq!(RetryConfig::default().max_attempts(), 1);
        assert_eq!(RetryConfig::new(3).max_attempts(), 4);
        assert_eq!(RetryConfig::new(usize::MAX).max_attempts(), usize::MAX);

        let with_backoff = RetryConfig::new(1).with_backoff(ExponentialBackoff::fast());
        assert_eq!(with_backoff.max_attempts(), 2);
        assert!(with_backoff.backoff.is_some());
    }

    #[test]
    fn test_attempt_timeout_saturates() {
        let config = DispatcherConfig {
            connect_timeout: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(config.attempt_timeout(), Duration::MAX);
    }

    #[test]
    fn test_backoff_deserializes_humantime() {
        let backoff: ExponentialBackoff =
            serde_json::from_str(r#"{"initial":"250ms","max":"5s","jitter":false}"#).unwrap();
        assert_eq!(backoff.initial, Duration::from_millis(250));
        assert_eq!(backoff.max, Duration::from_secs(5));
        assert!(!backoff.jitter);
        assert!((backoff.multiplier - 2.0).abs() < f64::EPSILON);
    }
}
