//! # warmcache core
//!
//! Shared building blocks for the warmcache engines:
//!
//! - **Options**: millisecond-based cache options and their normalized [`CachePolicy`]
//! - **Errors**: the [`CacheError`] hierarchy and `Result` alias
//! - **Clock**: the monotonic time source every deadline is measured against
//! - **Traits**: loader interfaces the engines call to fetch fresh data
//! - **Copy**: deep copies of cached values for callers that need to mutate them
//!
//! ## Example
//!
//! ```rust
//! use warmcache_core::{CacheOptions, CachePolicy};
//!
//! let options = CacheOptions::new().expiration_ms(50).wait_timeout_ms(5);
//! let policy = CachePolicy::from_options(&options);
//! assert_eq!(policy.evict_timeout, policy.expiration * 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod clock;
pub mod constants;
pub mod copy;
pub mod error;
pub mod options;
pub mod traits;

// Re-export commonly used items at crate root
pub use constants::*;
pub use copy::deep_copy;
pub use error::{BoxError, CacheError, Result};
pub use options::{CacheOptions, CachePolicy};
pub use traits::*;
