#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]

//! Cryptographic core of the gateway SDK.
//!
//! - [`sm3`]: from-scratch SM3 (GB/T 32905-2016) digest
//! - [`token`]: per-request token derivation over `app_id`, `timestamp`,
//!   `trans_id` and the application secret

pub mod sm3;
pub mod token;

pub use sm3::{Sm3, digest, digest_hex};
pub use token::{SignError, SignedToken, TokenSigner, compute_token};
