#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]

//! Client SDK for the carrier IoT gateway
//!
//! Every call is a signed JSON POST to
//! `<server_url>/<api/name/path>/v<version>`. [`GatewayClient::execute`]
//! signs the envelope with an SM3 token, dispatches it with timeouts and
//! retries, and decodes the body as JSON or XML.
//!
//! ```ignore
//! use unigw_sdk::{CommonJsonRequest, GatewayClient, GatewayResponse};
//!
//! let client = GatewayClient::builder("https://gw.example.com/api/", "app-id", "secret")
//!     .retry_count(1)
//!     .build()?;
//!
//! let mut request = CommonJsonRequest::new("cn.iot.usernumber.check", "1.1")
//!     .with_param("msisdn", "1440000000001");
//! if let Some(response) = client.execute(&mut request).await? {
//!     println!("{} {}", response.is_success(), response.body());
//! }
//! ```

mod client;
mod config;
mod decoder;
mod error;
mod request;
mod response;

pub use client::{DATA_KEY, GatewayClient, GatewayClientBuilder};
pub use config::GatewayConfig;
pub use decoder::{DecodeError, Decoded, ResponseFormat, XML_CONTENT_TYPE, decode};
pub use error::GatewayError;
pub use request::{ApiType, CommonJsonRequest, GatewayRequest};
pub use response::{CommonJsonResponse, ERROR_CODE_KEY, GatewayResponse};

pub use unigw_http::{ExponentialBackoff, FileItem, TlsRootConfig, TransportSecurity};
