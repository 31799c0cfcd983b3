#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP dispatcher for the IoT gateway SDK
//!
//! A hyper + rustls client behind a tower stack. Every attempt is one POST
//! (or GET) bounded by the combined connect + read timeout, with transparent
//! gzip decompression. Responses with status >= 400 fail the attempt. A
//! fixed-count retry layer wraps the whole attempt, so the body read and the
//! status check are retried along with the transport.
//!
//! # Example
//!
//! ```ignore
//! use unigw_http::Dispatcher;
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::builder()
//!     .connect_timeout(Duration::from_secs(2))
//!     .read_timeout(Duration::from_secs(30))
//!     .retry_count(2)
//!     .build()?;
//!
//! let text = dispatcher
//!     .post_gateway("https://gw.example.com/", "cn.iot.usernumber.check", "1.1", body)
//!     .await?;
//! ```

mod builder;
mod config;
mod dispatcher;
mod endpoint;
mod error;
mod layers;
mod multipart;
mod response;
mod tls;

pub use builder::DispatcherBuilder;
pub use config::{
    DEFAULT_ACCEPT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_USER_AGENT,
    DispatcherConfig, ExponentialBackoff, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, RetryConfig,
    TlsRootConfig, TransportSecurity,
};
pub use dispatcher::Dispatcher;
pub use endpoint::{build_gateway_url, build_get_url};
pub use error::{HttpError, InvalidUriKind};
pub use http::StatusCode;
pub use layers::{DefaultHeadersLayer, DefaultHeadersService, RetryLayer, RetryService};
pub use multipart::FileItem;
pub use response::HttpResponse;
