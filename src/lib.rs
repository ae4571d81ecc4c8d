#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod rate_limiter;
pub use rate_limiter::*;

mod redis;
pub use redis::*;

mod error;
pub use error::*;

mod common;
pub use common::{Decision, KeyTtlMs, MAX_COST_PER_CALL, WindowLimit, WindowSizeMs};

#[cfg(test)]
mod tests;
