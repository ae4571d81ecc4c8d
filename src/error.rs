/// Error type for this crate.
///
/// Any error means the admission outcome is unknown to the caller. It must
/// never be read as a deny: the store may have applied the call even when the
/// reply was lost.
#[derive(Debug, thiserror::Error)]
pub enum SlidegateError {
    /// Limit, window or TTL rejected at construction.
    #[error("invalid window options: {0}")]
    InvalidOptions(String),

    /// Key prefix failed validation.
    #[error("invalid redis key: {0}")]
    InvalidRedisKey(String),

    /// Requested cost is zero. Raised before any store round trip.
    #[error("invalid cost: {0}")]
    InvalidCost(String),

    /// The admission script could not be registered when building the limiter.
    #[error("failed to register admission script: {0}")]
    ScriptRegistration(#[source] StoreError),

    /// The store forgot the script and registering it again failed.
    #[error("failed to re-register admission script after NOSCRIPT: {0}")]
    ScriptReload(#[source] StoreError),

    /// The admission script failed before any recovery was attempted.
    #[error("admission script failed: {0}")]
    Invocation(#[source] StoreError),

    /// The single retry after re-registering the script failed.
    #[error("admission script failed after re-registering it: {0}")]
    InvocationAfterReload(#[source] StoreError),

    /// The script replied with something other than a three element array.
    #[error("unexpected admission script reply: {0}")]
    UnexpectedReply(String),
}

/// Error reported by a [`ScriptStore`](crate::ScriptStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store does not know the script handle (evicted or never loaded).
    #[error("NOSCRIPT: no matching script")]
    NoScript,

    /// Redis error.
    #[error("redis error: {0}")]
    Redis(#[source] redis::RedisError),

    /// Error from a non-Redis store implementation.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the store reported the script handle as unknown.
    pub fn is_no_script(&self) -> bool {
        matches!(self, StoreError::NoScript)
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::Server(redis::ServerErrorKind::NoScript) {
            StoreError::NoScript
        } else {
            StoreError::Redis(err)
        }
    }
}
