use std::time::Duration;

use crate::redis::RedisKey;

/// Configuration for [`WindowRateLimiter`](crate::WindowRateLimiter).
///
/// Fixed for the lifetime of a limiter. Validated when the limiter is built:
/// `limit` must be greater than zero and `window` at least one millisecond.
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use slidegate::{RedisKey, WindowOptions};
///
/// let options = WindowOptions {
///     limit: 100,
///     window: Duration::from_secs(10),
///     ttl: None, // expires idle keys after one window
///     prefix: Some(RedisKey::try_from("api")?), // keys: api:<id>
///     hash_tag: false,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct WindowOptions {
    /// Maximum total cost admitted per window for one identity.
    pub limit: u64,

    /// Sliding window length. Sub-millisecond precision is truncated.
    pub window: Duration,

    /// Expiration applied to an identity's key on every admission so idle
    /// identities are reclaimed by Redis.
    ///
    /// `None` or zero means one `window`.
    pub ttl: Option<Duration>,

    /// Optional prefix for all Redis keys.
    ///
    /// Keys are `<prefix>:<id>`. If `None`, defaults to `"slidegate"`.
    pub prefix: Option<RedisKey>,

    /// Wrap the id in a Redis Cluster hash tag, `<prefix>:{<id>}`.
    pub hash_tag: bool,
}
