use crate::config::GatewayConfig;
use crate::decoder::decode;
use crate::error::GatewayError;
use crate::request::GatewayRequest;
use crate::response::GatewayResponse;
use serde_json::{Map, Value};
use std::time::Duration;
use unigw_crypto::TokenSigner;
use unigw_crypto::token::{APP_ID_KEY, APP_SECRET_KEY, DEFAULT_UTC_OFFSET_MINUTES};
use unigw_http::{
    Dispatcher, DispatcherBuilder, ExponentialBackoff, TlsRootConfig, TransportSecurity,
};
use unigw_utils::SecretString;

/// Key of the business parameters in the request envelope
pub const DATA_KEY: &str = "data";

/// Entry point for gateway calls
///
/// Holds the credentials, the token signer and a [`Dispatcher`]. Cloning is
/// cheap and clones share the connection pool. [`execute`](Self::execute) may
/// run concurrently from many tasks.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    server_url: String,
    app_id: String,
    app_secret: SecretString,
    open_id: String,
    signer: TokenSigner,
    dispatcher: Dispatcher,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry_count: usize,
}

impl GatewayClient {
    #[must_use]
    pub fn builder(
        server_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<SecretString>,
    ) -> GatewayClientBuilder {
        GatewayClientBuilder::new(server_url, app_id, app_secret)
    }

    /// Client from loaded configuration.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// [`GatewayError::Config`] for an unusable server URL,
    /// [`GatewayError::Transport`] when the TLS stack cannot be set up.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let GatewayConfig {
            server_url,
            app_id,
            app_secret,
            open_id,
            connect_timeout,
            read_timeout,
            retry_count,
            retry_backoff,
            verify_tls,
            allow_insecure_http,
            utc_offset_minutes,
            user_agent,
        } = config;

        let mut builder = Self::builder(server_url, app_id, app_secret)
            .open_id(open_id)
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .retry_count(retry_count)
            .verify_tls(verify_tls)
            .utc_offset_minutes(utc_offset_minutes)
            .user_agent(user_agent);
        if let Some(backoff) = retry_backoff {
            builder = builder.retry_backoff(backoff);
        }
        if allow_insecure_http {
            builder = builder.transport(TransportSecurity::AllowInsecureHttp);
        }
        builder.build()
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn open_id(&self) -> &str {
        &self.open_id
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    #[must_use]
    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    /// Sign, send and decode one call.
    ///
    /// The envelope is `app_id`, `token`, `timestamp`, `trans_id` and the
    /// request's parameters under `data`; the secret never leaves the
    /// process. An empty response body yields `Ok(None)`. A body that does
    /// not decode yields an unsuccessful response, not an error.
    ///
    /// # Errors
    /// - [`GatewayError::Rule`] when the request's own check rejects it
    /// - [`GatewayError::Sign`] when `app_id` or the secret is empty
    /// - [`GatewayError::Serialize`] when the envelope cannot be encoded
    /// - [`GatewayError::Transport`] when every attempt failed
    pub async fn execute<R: GatewayRequest>(
        &self,
        request: &mut R,
    ) -> Result<Option<R::Response>, GatewayError> {
        request.check()?;

        let mut envelope = Map::new();
        envelope.insert(APP_ID_KEY.to_owned(), Value::String(self.app_id.clone()));
        envelope.insert(
            APP_SECRET_KEY.to_owned(),
            Value::String(self.app_secret.expose().to_owned()),
        );
        let signed = self.signer.sign_params(&mut envelope)?;

        envelope.insert(DATA_KEY.to_owned(), Value::Object(request.params().clone()));
        request.set_trans_id(signed.trans_id.clone());
        request.set_request_text(String::new());
        request.before_send(&envelope);

        let body = if request.request_text().is_empty() {
            serde_json::to_vec(&envelope)?
        } else {
            request.request_text().as_bytes().to_vec()
        };

        tracing::debug!(
            api = request.api_name(),
            version = request.api_version(),
            trans_id = %signed.trans_id,
            "executing gateway call"
        );

        let text = self
            .dispatcher
            .post_gateway(
                &self.server_url,
                request.api_name(),
                request.api_version(),
                body,
            )
            .await?;

        if text.is_empty() {
            tracing::debug!(trans_id = %signed.trans_id, "gateway returned an empty body");
            return Ok(None);
        }

        let response = decode::<R::Response>(&text, request.content_type()).into_response();
        tracing::debug!(
            trans_id = %signed.trans_id,
            success = response.is_success(),
            status = response.status(),
            "gateway call completed"
        );
        Ok(Some(response))
    }
}

/// Builder for [`GatewayClient`]
#[derive(Debug, Clone)]
pub struct GatewayClientBuilder {
    server_url: String,
    app_id: String,
    app_secret: SecretString,
    open_id: String,
    utc_offset_minutes: i32,
    dispatcher: DispatcherBuilder,
}

impl GatewayClientBuilder {
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<SecretString>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            open_id: String::new(),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            dispatcher: DispatcherBuilder::new(),
        }
    }

    #[must_use]
    pub fn open_id(mut self, open_id: impl Into<String>) -> Self {
        self.open_id = open_id.into();
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.connect_timeout(timeout);
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.read_timeout(timeout);
        self
    }

    /// Extra attempts after a failed one.
    #[must_use]
    pub fn retry_count(mut self, retry_count: usize) -> Self {
        self.dispatcher = self.dispatcher.retry_count(retry_count);
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.dispatcher = self.dispatcher.retry_backoff(backoff);
        self
    }

    #[must_use]
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.dispatcher = self.dispatcher.verify_tls(verify);
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.dispatcher = self.dispatcher.tls_roots(roots);
        self
    }

    /// `AllowInsecureHttp` is needed for `http://` gateways.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.dispatcher = self.dispatcher.transport(transport);
        self
    }

    #[must_use]
    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.dispatcher = self.dispatcher.user_agent(user_agent);
        self
    }

    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.dispatcher = self.dispatcher.buffer_capacity(capacity);
        self
    }

    /// Build the client.
    ///
    /// Must be called within a tokio runtime. Credentials are not checked
    /// here; empty ones fail each [`execute`](GatewayClient::execute).
    ///
    /// # Errors
    /// [`GatewayError::Config`] for an empty server URL, one without an
    /// `http`/`https` scheme, or an `http://` one without
    /// `TransportSecurity::AllowInsecureHttp`. [`GatewayError::Transport`]
    /// when the dispatcher cannot be built.
    pub fn build(self) -> Result<GatewayClient, GatewayError> {
        let config = self.dispatcher.config();
        validate_server_url(&self.server_url, config.transport)?;

        let connect_timeout = config.connect_timeout;
        let read_timeout = config.read_timeout;
        let retry_count = config.retry.retry_count;
        let dispatcher = self.dispatcher.build()?;

        tracing::debug!(
            server_url = %self.server_url,
            app_id = %self.app_id,
            ?connect_timeout,
            ?read_timeout,
            retry_count,
            "gateway client built"
        );

        Ok(GatewayClient {
            server_url: self.server_url,
            app_id: self.app_id,
            app_secret: self.app_secret,
            open_id: self.open_id,
            signer: TokenSigner::new(self.utc_offset_minutes),
            dispatcher,
            connect_timeout,
            read_timeout,
            retry_count,
        })
    }
}

/// Plain `http://` is accepted only with `TransportSecurity::AllowInsecureHttp`.
fn validate_server_url(
    server_url: &str,
    transport: TransportSecurity,
) -> Result<(), GatewayError> {
    if server_url.trim().is_empty() {
        return Err(GatewayError::Config("server_url must not be empty".to_owned()));
    }
    let lower = server_url.to_ascii_lowercase();
    if lower.starts_with("https://") {
        return Ok(());
    }
    if !lower.starts_with("http://") {
        return Err(GatewayError::Config(format!(
            "server_url '{server_url}' must start with http:// or https://"
        )));
    }
    if transport == TransportSecurity::AllowInsecureHttp {
        Ok(())
    } else {
        Err(GatewayError::Config(format!(
            "server_url '{server_url}' uses plain http://; set allow_insecure_http \
             (TransportSecurity::AllowInsecureHttp) to permit it"
        )))
    }
}
