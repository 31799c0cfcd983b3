//! Tower layers of the dispatcher stack
//!
//! - [`DefaultHeadersLayer`] - Adds `User-Agent` and `Accept` when absent
//! - [`RetryLayer`] - Fixed-count retry around a whole attempt

mod headers;
mod retry;

pub use headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use retry::{RetryLayer, RetryService};
