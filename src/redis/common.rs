use std::{ops::Deref, sync::Arc};

use crate::SlidegateError;

/// A validated newtype for Redis key prefixes.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// Create a new default prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("slidegate"))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for RedisKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = SlidegateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(SlidegateError::InvalidRedisKey(
                "Redis key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(SlidegateError::InvalidRedisKey(
                "Redis key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(SlidegateError::InvalidRedisKey(
                "Redis key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for RedisKey {
    type Error = SlidegateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Builds the per-identity window key, `<prefix>:<id>`.
///
/// With `hash_tag` the id is wrapped as `<prefix>:{<id>}` so that a Redis
/// Cluster routes it by the id alone.
#[derive(Clone, Debug)]
pub(crate) struct WindowKeyGenerator {
    pub prefix: RedisKey,
    pub hash_tag: bool,
}

impl WindowKeyGenerator {
    pub(crate) fn new(prefix: RedisKey, hash_tag: bool) -> Self {
        Self { prefix, hash_tag }
    }

    pub(crate) fn get_window_key(&self, id: &str) -> String {
        if self.hash_tag {
            format!("{}:{{{}}}", *self.prefix, id)
        } else {
            format!("{}:{}", *self.prefix, id)
        }
    }
}
