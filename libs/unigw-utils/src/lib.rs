#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]

//! Small helpers shared by the unigw crates.
//!
//! - [`SecretString`]: redacted, zeroized holder for credentials
//! - [`humantime_serde`]: `Duration` fields written as `"2s"`, `"30s"` (feature `humantime-serde`)

#[cfg(feature = "humantime-serde")]
pub mod humantime_serde;
mod secret_string;

pub use secret_string::SecretString;
