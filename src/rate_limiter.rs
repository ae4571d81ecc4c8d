//! Admission capability shared by every limiter strategy.
//!
//! Callers depend on [`RateLimiter`] rather than a concrete limiter, so another
//! admission strategy can be swapped in without touching call sites. Today the
//! crate ships one implementation, [`WindowRateLimiter`](crate::WindowRateLimiter).

use async_trait::async_trait;

use crate::{Decision, SlidegateError};

/// Per-identity admission check.
///
/// The trait is object safe, so limiters can be held as
/// `Arc<dyn RateLimiter>`.
///
/// # Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use slidegate::{RateLimiter, SlidegateError};
///
/// async fn handle(limiter: Arc<dyn RateLimiter>, user: &str) -> Result<bool, SlidegateError> {
///     let decision = limiter.allow(user).await?;
///     Ok(decision.allowed)
/// }
/// ```
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Request one unit of quota for `id`. Same as `allow_n(id, 1)`.
    async fn allow(&self, id: &str) -> Result<Decision, SlidegateError> {
        self.allow_n(id, 1).await
    }

    /// Request `cost` units of quota for `id`.
    ///
    /// Fails without contacting the store when `cost` is zero.
    async fn allow_n(&self, id: &str, cost: u64) -> Result<Decision, SlidegateError>;
}
