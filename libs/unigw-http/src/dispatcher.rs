use crate::builder::DispatcherBuilder;
use crate::config::{FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, TransportSecurity};
use crate::endpoint::{build_gateway_url, build_get_url};
use crate::error::{HttpError, InvalidUriKind};
use crate::multipart::{self, FileItem};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::{Method, Request};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::buffer::Buffer;
use tower::{Service, ServiceExt};

/// Future of the retrying service behind the buffer
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send>>;

/// `Buffer<Req, F>` over the boxed retry stack
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Sends gateway calls through the shared transport stack
///
/// Cloning is cheap; clones share the connection pool and the buffer worker.
/// Every operation returns the decompressed body text of the first
/// successful attempt, or the last attempt's error.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) service: BufferedService,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        DispatcherBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// POST a JSON body to the endpoint of `api_name` at `api_version`.
    ///
    /// # Errors
    /// Invalid URL or scheme, or the error of the final attempt.
    pub async fn post_gateway(
        &self,
        base_url: &str,
        api_name: &str,
        api_version: &str,
        body: impl Into<Bytes>,
    ) -> Result<String, HttpError> {
        let url = build_gateway_url(base_url, api_name, api_version);
        self.post(&url, JSON_CONTENT_TYPE, body.into()).await
    }

    /// POST a JSON-serialized parameter map to the endpoint of `api_name`.
    ///
    /// # Errors
    /// Serialization failure, invalid URL or scheme, or the final attempt's error.
    pub async fn post_params(
        &self,
        base_url: &str,
        api_name: &str,
        api_version: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, HttpError> {
        let body = serde_json::to_vec(params)?;
        self.post_gateway(base_url, api_name, api_version, body)
            .await
    }

    /// POST `application/x-www-form-urlencoded` pairs to `url`.
    ///
    /// # Errors
    /// Encoding failure, invalid URL or scheme, or the final attempt's error.
    pub async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<String, HttpError> {
        let body = serde_urlencoded::to_string(params)?;
        self.post(url, FORM_CONTENT_TYPE, Bytes::from(body)).await
    }

    /// POST `multipart/form-data` with text fields and files.
    ///
    /// Files without content are skipped. When none remain the call is sent
    /// as a plain form POST.
    ///
    /// # Errors
    /// Invalid URL or scheme, or the final attempt's error.
    pub async fn post_multipart(
        &self,
        url: &str,
        text_params: &[(&str, &str)],
        file_params: &[(&str, &FileItem)],
    ) -> Result<String, HttpError> {
        if file_params.iter().all(|(_, file)| file.is_empty()) {
            return self.post_form(url, text_params).await;
        }

        let boundary = multipart::generate_boundary();
        let body = multipart::encode(&boundary, text_params, file_params);
        self.post(url, &multipart::content_type(&boundary), body)
            .await
    }

    /// GET `url` with `params` appended to the query.
    ///
    /// # Errors
    /// Invalid URL or scheme, or the final attempt's error.
    pub async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<String, HttpError> {
        let url = build_get_url(url, params)?;
        let response = self.send(Method::GET, &url, None, Bytes::new()).await?;
        Ok(response.text())
    }

    async fn post(&self, url: &str, content_type: &str, body: Bytes) -> Result<String, HttpError> {
        let response = self
            .send(Method::POST, url, Some(content_type), body)
            .await?;
        Ok(response.text())
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        let uri = self.validate_url(url)?;

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(Full::new(body))?;

        tracing::debug!(%method, url, "dispatching gateway request");

        let mut service = self.service.clone();
        let response = service
            .ready()
            .await
            .map_err(map_buffer_error)?
            .call(request)
            .await
            .map_err(map_buffer_error)?;

        tracing::debug!(
            %method,
            url,
            status = response.status().as_u16(),
            bytes = response.body().len(),
            "gateway response received"
        );
        Ok(response)
    }

    /// Parse `url` and check its scheme against the transport security mode.
    fn validate_url(&self, url: &str) -> Result<http::Uri, HttpError> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }
}

/// Map buffer errors to `HttpError`
///
/// The buffer boxes errors of the inner service; anything else means the
/// worker is gone.
fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ExponentialBackoff;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn test_dispatcher(retry_count: usize) -> Dispatcher {
        Dispatcher::builder()
            .allow_insecure_http()
            .retry_count(retry_count)
            .build()
            .unwrap()
    }

    fn gzip_compress(data: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_post_gateway_builds_url_and_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/iot/usernumber/check/v1.1")
                .header("content-type", JSON_CONTENT_TYPE)
                .header("accept", "text/xml,text/javascript,application/json")
                .header_exists("user-agent")
                .body(r#"{"app_id":"demo"}"#);
            then.status(200).body(r#"{"status":"0"}"#);
        });

        let text = test_dispatcher(0)
            .post_gateway(
                &server.base_url(),
                "cn.iot.usernumber.check",
                "1.1",
                r#"{"app_id":"demo"}"#,
            )
            .await
            .unwrap();

        assert_eq!(text, r#"{"status":"0"}"#);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_user_agent_is_sdk_default() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/a/b/v1")
                .header("user-agent", crate::config::DEFAULT_USER_AGENT);
            then.status(200).body("ok");
        });

        test_dispatcher(0)
            .post_gateway(&server.base_url(), "a.b", "1", "{}")
            .await
            .unwrap();
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_post_params_serializes_map() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/iot/card/query/v2")
                .json_body(json!({"iccid": "8986", "page": 1}));
            then.status(200).body("done");
        });

        let params = json!({"iccid": "8986", "page": 1});
        let text = test_dispatcher(0)
            .post_params(
                &server.base_url(),
                "cn.iot.card.query",
                "2",
                params.as_object().unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(text, "done");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_status_error_returns_http_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/x/v1");
            then.status(503).body("maintenance");
        });

        let err = test_dispatcher(0)
            .post_gateway(&server.base_url(), "x", "1", "{}")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(http::StatusCode::SERVICE_UNAVAILABLE));
        match err {
            HttpError::HttpStatus { body_preview, .. } => assert_eq!(body_preview, "maintenance"),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_server_is_attempted_retry_count_plus_one_times() {
        for retry_count in [0usize, 1, 3] {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/x/v1");
                then.status(500).body("boom");
            });

            let result = test_dispatcher(retry_count)
                .post_gateway(&server.base_url(), "x", "1", "{}")
                .await;

            assert!(matches!(result, Err(HttpError::HttpStatus { .. })));
            assert_eq!(
                mock.calls(),
                retry_count + 1,
                "retry_count={retry_count}: expected {} calls, got {}",
                retry_count + 1,
                mock.calls()
            );
        }
    }

    #[tokio::test]
    async fn test_backoff_keeps_attempt_count() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/x/v1");
            then.status(502);
        });

        let dispatcher = Dispatcher::builder()
            .allow_insecure_http()
            .retry_count(2)
            .retry_backoff(ExponentialBackoff::fast())
            .build()
            .unwrap();

        let result = dispatcher
            .post_gateway(&server.base_url(), "x", "1", "{}")
            .await;
        assert!(result.is_err());
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_redirect_body_is_returned_not_followed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/x/v1");
            then.status(302)
                .header("location", "/elsewhere")
                .body("moved");
        });

        let text = test_dispatcher(2)
            .post_gateway(&server.base_url(), "x", "1", "{}")
            .await
            .unwrap();
        assert_eq!(text, "moved");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_gzip_response_is_decompressed() {
        let server = MockServer::start();
        let original = r#"{"status":"0","message":"ok","result":{"respcode":"0"}}"#;
        let compressed = gzip_compress(original.as_bytes());

        let _m = server.mock(|when, then| {
            when.method(POST)
                .path("/iot/card/status/v1.0")
                .header_exists("accept-encoding");
            then.status(200)
                .header("content-type", "application/json")
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let text = test_dispatcher(0)
            .post_gateway(&server.base_url(), "cn.iot.card.status", "1.0", "{}")
            .await
            .unwrap();
        assert_eq!(text, original);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/slow/v1");
            then.status(200).delay(Duration::from_millis(500)).body("late");
        });

        let dispatcher = Dispatcher::builder()
            .allow_insecure_http()
            .connect_timeout(Duration::from_millis(50))
            .read_timeout(Duration::from_millis(50))
            .retry_count(1)
            .build()
            .unwrap();

        let err = dispatcher
            .post_gateway(&server.base_url(), "slow", "1", "{}")
            .await
            .unwrap_err();
        assert!(
            matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(100)),
            "expected Timeout, got {err:?}"
        );
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind and drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = test_dispatcher(1)
            .post_gateway(&format!("http://127.0.0.1:{port}"), "x", "1", "{}")
            .await
            .unwrap_err();
        assert!(
            matches!(err, HttpError::Transport(_)),
            "expected Transport, got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_post_form() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/form")
                .header("content-type", FORM_CONTENT_TYPE)
                .form_urlencoded_tuple("msisdn", "1440 1")
                .form_urlencoded_tuple("type", "a&b");
            then.status(200).body("form ok");
        });

        let text = test_dispatcher(0)
            .post_form(
                &format!("{}/form", server.base_url()),
                &[("msisdn", "1440 1"), ("type", "a&b")],
            )
            .await
            .unwrap();
        assert_eq!(text, "form ok");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_post_multipart_sends_files() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upload")
                .header_matches("content-type", "^multipart/form-data; boundary=[A-Za-z0-9]+$")
                .body_includes("name=\"batch\"")
                .body_includes("filename=\"cards.csv\"")
                .body_includes("Content-Type: text/csv")
                .body_includes("8986001,active");
            then.status(200).body("uploaded");
        });

        let file = FileItem::new("cards.csv", "8986001,active\n", "text/csv");
        let text = test_dispatcher(0)
            .post_multipart(
                &format!("{}/upload", server.base_url()),
                &[("batch", "42")],
                &[("file", &file)],
            )
            .await
            .unwrap();
        assert_eq!(text, "uploaded");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_post_multipart_without_content_falls_back_to_form() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upload")
                .header("content-type", FORM_CONTENT_TYPE)
                .form_urlencoded_tuple("batch", "42");
            then.status(200).body("form");
        });

        let empty = FileItem::new("empty.csv", Bytes::new(), "text/csv");
        let text = test_dispatcher(0)
            .post_multipart(
                &format!("{}/upload", server.base_url()),
                &[("batch", "42")],
                &[("file", &empty)],
            )
            .await
            .unwrap();
        assert_eq!(text, "form");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_appends_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/query")
                .query_param("iccid", "8986")
                .query_param_missing("empty");
            then.status(200).body("got");
        });

        let text = test_dispatcher(0)
            .get(
                &format!("{}/query", server.base_url()),
                &[("iccid", "8986"), ("empty", "")],
            )
            .await
            .unwrap();
        assert_eq!(text, "got");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_tls_only_rejects_http_url() {
        let dispatcher = Dispatcher::builder().build().unwrap();
        let err = dispatcher
            .post_gateway("http://gw.example.com/", "a.b", "1", "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "http"));
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected() {
        let dispatcher = test_dispatcher(0);

        let err = dispatcher.post_form("/relative", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::MissingAuthority,
                ..
            }
        ));

        let err = dispatcher
            .post_form("ftp://files.example.com/x", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidScheme { ref scheme, .. } if scheme == "ftp"));

        let err = dispatcher.post_form("http://bad host/", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatcher_is_shared_across_tasks() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/x/v1");
            then.status(200).body("ok");
        });

        let dispatcher = test_dispatcher(0);
        let base = server.base_url();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let base = base.clone();
                tokio::spawn(async move { dispatcher.post_gateway(&base, "x", "1", "{}").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }
        assert_eq!(mock.calls(), 4);
    }
}
