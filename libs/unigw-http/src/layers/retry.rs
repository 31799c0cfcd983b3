use crate::config::{ExponentialBackoff, RetryConfig};
use crate::error::HttpError;
use crate::response::HttpResponse;
use bytes::Bytes;
use http::Request;
use http_body_util::Full;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Tower layer that retries a failed attempt a fixed number of times
///
/// The wrapped service performs one complete attempt: send, read body,
/// check status. Any error from it is retried until `retry_count` extra
/// attempts are spent, then the last error is returned.
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Service that replays a request until it succeeds or the budget is spent
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: RetryConfig,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = HttpResponse, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = HttpResponse;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        let (parts, body) = req.into_parts();

        Box::pin(async move {
            let mut attempt = 0usize;
            loop {
                let req = Request::from_parts(parts.clone(), body.clone());

                let mut svc = inner.clone();
                let result = match svc.ready().await {
                    Ok(ready) => ready.call(req).await,
                    Err(err) => Err(err),
                };

                let err = match result {
                    Ok(resp) => return Ok(resp),
                    Err(err) if attempt >= config.retry_count => return Err(err),
                    Err(err) => err,
                };

                let backoff = config
                    .backoff
                    .as_ref()
                    .map(|b| calculate_backoff(b, attempt));

                tracing::debug!(
                    retry = attempt + 1,
                    max_retries = config.retry_count,
                    error = %err,
                    method = %parts.method,
                    uri = %parts.uri,
                    backoff = ?backoff,
                    "retrying gateway request"
                );

                if let Some(delay) = backoff {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        })
    }
}

/// Delay before retry number `attempt + 1`
///
/// Non-finite or negative multipliers fall back to 1.0.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    // One day; anything longer is a misconfiguration
    const MAX_BACKOFF_SECS: f64 = 86400.0;

    let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

    let multiplier = if backoff.multiplier.is_finite() && backoff.multiplier >= 0.0 {
        backoff.multiplier
    } else {
        1.0
    };

    let initial_secs = backoff.initial.as_secs_f64();
    let max_secs = backoff.max.as_secs_f64().min(MAX_BACKOFF_SECS);

    let base = initial_secs * multiplier.powi(attempt_i32);
    let clamped = if base.is_finite() {
        base.min(max_secs).max(0.0)
    } else {
        max_secs
    };
    let duration = Duration::from_secs_f64(clamped);

    let duration = if backoff.jitter {
        let jitter_factor = rand::rng().random_range(0.0..=0.25);
        duration + duration.mul_f64(jitter_factor)
    } else {
        duration
    };

    duration.min(Duration::from_secs_f64(max_secs))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Fails the first `failures` calls, then succeeds.
    #[derive(Clone)]
    struct FlakyService {
        call_count: Arc<Mutex<usize>>,
        failures: usize,
    }

    impl FlakyService {
        fn new(failures: usize) -> Self {
            Self {
                call_count: Arc::new(Mutex::new(0)),
                failures,
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    impl Service<Request<Full<Bytes>>> for FlakyService {
        type Response = HttpResponse;
        type Error = HttpError;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Full<Bytes>>) -> Self::Future {
            let count = self.call_count.clone();
            let failures = self.failures;
            Box::pin(async move {
                let n = {
                    let mut c = count.lock().unwrap();
                    *c += 1;
                    *c
                };
                if n <= failures {
                    Err(HttpError::Transport(format!("attempt {n} refused").into()))
                } else {
                    Ok(test_response(b"ok"))
                }
            })
        }
    }

    fn test_response(body: &'static [u8]) -> HttpResponse {
        let response = http::Response::builder()
            .status(200)
            .body(Bytes::from_static(body))
            .unwrap();
        HttpResponse::from(response)
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .method(http::Method::POST)
            .uri("http://gw.example.com/iot/v1.0")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_first_attempt_calls_once() {
        let service = FlakyService::new(0);
        let mut retry = RetryLayer::new(RetryConfig::new(3)).layer(service.clone());

        let resp = retry.ready().await.unwrap().call(request()).await.unwrap();
        assert_eq!(resp.body().as_ref(), b"ok");
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_retry_count_means_single_attempt() {
        let service = FlakyService::new(1);
        let mut retry = RetryLayer::new(RetryConfig::default()).layer(service.clone());

        let err = retry.ready().await.unwrap().call(request()).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_k_failures_within_budget_succeed_after_k_plus_one_attempts() {
        for (k, retry_count) in [(1usize, 1usize), (2, 2), (2, 5), (4, 4)] {
            let service = FlakyService::new(k);
            let mut retry = RetryLayer::new(RetryConfig::new(retry_count)).layer(service.clone());

            let result = retry.ready().await.unwrap().call(request()).await;
            assert!(result.is_ok(), "k={k} retry_count={retry_count}");
            assert_eq!(service.calls(), k + 1, "k={k} retry_count={retry_count}");
        }
    }

    #[tokio::test]
    async fn test_k_failures_beyond_budget_return_last_error() {
        for (k, retry_count) in [(1usize, 0usize), (3, 2), (5, 1)] {
            let service = FlakyService::new(k);
            let mut retry = RetryLayer::new(RetryConfig::new(retry_count)).layer(service.clone());

            let err = retry
                .ready()
                .await
                .unwrap()
                .call(request())
                .await
                .unwrap_err();
            assert_eq!(service.calls(), retry_count + 1);
            assert!(
                err.to_string()
                    .contains(&format!("attempt {} refused", retry_count + 1)),
                "expected error of the final attempt, got: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_status_errors_are_retried() {
        #[derive(Clone)]
        struct StatusThenOk {
            call_count: Arc<Mutex<usize>>,
        }

        impl Service<Request<Full<Bytes>>> for StatusThenOk {
            type Response = HttpResponse;
            type Error = HttpError;
            type Future =
                Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

            fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
                assert_eq!(req.method(), http::Method::POST);
                let count = self.call_count.clone();
                Box::pin(async move {
                    let mut c = count.lock().unwrap();
                    *c += 1;
                    if *c == 1 {
                        Err(HttpError::HttpStatus {
                            status: http::StatusCode::SERVICE_UNAVAILABLE,
                            body_preview: String::new(),
                            content_type: None,
                        })
                    } else {
                        Ok(test_response(b"ok"))
                    }
                })
            }
        }

        let call_count = Arc::new(Mutex::new(0));
        let mut retry = RetryLayer::new(RetryConfig::new(1)).layer(StatusThenOk {
            call_count: call_count.clone(),
        });

        let result = retry.ready().await.unwrap().call(request()).await;
        assert!(result.is_ok());
        assert_eq!(*call_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_backoff_does_not_change_attempt_count() {
        let service = FlakyService::new(10);
        let config = RetryConfig::new(2).with_backoff(ExponentialBackoff::fast());
        let mut retry = RetryLayer::new(config).layer(service.clone());

        let started = tokio::time::Instant::now();
        let result = retry.ready().await.unwrap().call(request()).await;
        assert!(result.is_err());
        assert_eq!(service.calls(), 3);
        // 1ms + 2ms of backoff at least
        assert!(started.elapsed() >= Duration::from_millis(3));
    }

    #[test]
    fn test_calculate_backoff_no_jitter() {
        let backoff = ExponentialBackoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(calculate_backoff(&backoff, 0), Duration::from_millis(100));
        assert_eq!(calculate_backoff(&backoff, 1), Duration::from_millis(200));
        assert_eq!(calculate_backoff(&backoff, 2), Duration::from_millis(400));
        assert_eq!(calculate_backoff(&backoff, 10), Duration::from_secs(10));
    }

    #[test]
    fn test_calculate_backoff_with_jitter() {
        let backoff = ExponentialBackoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        };

        let delay = calculate_backoff(&backoff, 0);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn test_calculate_backoff_sanitizes_multiplier() {
        for multiplier in [f64::NAN, f64::INFINITY, -2.0] {
            let backoff = ExponentialBackoff {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(10),
                multiplier,
                jitter: false,
            };
            assert_eq!(calculate_backoff(&backoff, 3), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_calculate_backoff_with_huge_attempt() {
        let backoff = ExponentialBackoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(calculate_backoff(&backoff, usize::MAX), Duration::from_secs(10));
    }
}
