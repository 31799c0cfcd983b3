use crate::config::{
    DispatcherConfig, ExponentialBackoff, RetryConfig, TlsRootConfig, TransportSecurity,
};
use crate::error::HttpError;
use crate::layers::{DefaultHeadersLayer, RetryLayer};
use crate::response::{ResponseBody, collect_checked};
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Builder for a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// TCP connect timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Read timeout
    ///
    /// Each attempt as a whole must finish within connect + read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Extra attempts after the first failure
    #[must_use]
    pub fn retry_count(mut self, retry_count: usize) -> Self {
        self.config.retry.retry_count = retry_count;
        self
    }

    /// Delay between attempts (none by default)
    #[must_use]
    pub fn retry_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.config.retry.backoff = Some(backoff);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Verify server certificates (default: true)
    ///
    /// Disabling accepts any certificate for this dispatcher only.
    #[must_use]
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.config.verify_tls = verify;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set transport security mode
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain `http://` gateway URLs
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "unigw_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Maximum decompressed response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Queue capacity of the shared service
    ///
    /// Clamped to at least 1; `tower::buffer::Buffer` panics on 0.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Build the dispatcher
    ///
    /// Must be called inside a tokio runtime: the buffer worker is spawned here.
    ///
    /// # Errors
    /// Returns an error if TLS setup fails or the user agent is not a valid header value
    pub fn build(self) -> Result<crate::Dispatcher, HttpError> {
        let config = self.config;

        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 gateway traffic may be sent unencrypted"
            );
        }
        if !config.verify_tls {
            tracing::warn!(
                "TLS certificate verification disabled; any server certificate is accepted"
            );
        }

        let timeout = config.attempt_timeout();
        let max_body_size = config.max_body_size;

        let https = build_https_connector(&config)?;
        let hyper_client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        let headers_layer = DefaultHeadersLayer::try_new(&config.user_agent)?;

        // One attempt, outer to inner:
        //   Timeout → [collect body + status check] → DefaultHeaders →
        //   Decompression → hyper_client
        //
        // The body is read inside the timeout, so a slow body counts against
        // the attempt and a failed read is retried like any transport error.
        let attempt = ServiceBuilder::new()
            .layer(headers_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(HttpError::from)
            .and_then(move |response| collect_checked(response, max_body_size));

        let attempt = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .service(attempt)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone();

        let retrying = ServiceBuilder::new()
            .layer(RetryLayer::new(config.retry.clone()))
            .service(attempt)
            .boxed_clone();

        let buffered: crate::dispatcher::BufferedService =
            Buffer::new(retrying, config.buffer_capacity.max(1));

        tracing::debug!(
            connect_timeout = ?config.connect_timeout,
            read_timeout = ?config.read_timeout,
            retry_count = config.retry.retry_count,
            verify_tls = config.verify_tls,
            "gateway dispatcher built"
        );

        Ok(crate::Dispatcher {
            service: buffered,
            transport_security: config.transport,
        })
    }
}

/// Map tower errors to `HttpError` with the attempt timeout
///
/// Typed errors boxed by tower middleware are unwrapped before falling back
/// to `Transport`.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompressed body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector for the configured roots and verification mode.
///
/// The connect timeout is enforced by the inner `HttpConnector`; the TLS
/// handshake and the rest of the attempt fall under the attempt timeout.
///
/// # Errors
/// `HttpError::Tls` when the crypto provider cannot be set up, or when
/// native roots are requested and the OS store yields no usable certificate.
fn build_https_connector(
    config: &DispatcherConfig,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));

    let builder = if !config.verify_tls {
        let client_config =
            tls::insecure_client_config().map_err(|e| HttpError::Tls(Box::new(e)))?;
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
    } else {
        match config.tls_roots {
            TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::get_crypto_provider())
                .map_err(|e| HttpError::Tls(Box::new(e)))?,
            TlsRootConfig::Native => {
                let client_config =
                    tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
            }
        }
    };

    let connector = if config.transport == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_http1().wrap_connector(http)
    } else {
        builder.https_only().enable_http1().wrap_connector(http)
    };
    Ok(connector)
}
