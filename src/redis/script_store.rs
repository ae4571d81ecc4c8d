use std::sync::Arc;

use async_trait::async_trait;
use redis::Value;

use crate::StoreError;

/// Shared store able to run a registered script atomically against one key.
///
/// Scripts are content addressed: [`load_script`](ScriptStore::load_script)
/// returns a handle (the SHA1 of the source for Redis) and loading identical
/// source twice yields the same handle. When the store no longer knows a
/// handle, [`eval_sha`](ScriptStore::eval_sha) must fail with
/// [`StoreError::NoScript`].
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Register `source` and return its handle.
    async fn load_script(&self, source: &str) -> Result<String, StoreError>;

    /// Run the script behind `sha` against `key` with positional `args`.
    async fn eval_sha(&self, sha: &str, key: &str, args: &[u64])
    -> Result<Vec<Value>, StoreError>;
}

#[async_trait]
impl<T: ScriptStore + ?Sized> ScriptStore for Arc<T> {
    async fn load_script(&self, source: &str) -> Result<String, StoreError> {
        (**self).load_script(source).await
    }

    async fn eval_sha(
        &self,
        sha: &str,
        key: &str,
        args: &[u64],
    ) -> Result<Vec<Value>, StoreError> {
        (**self).eval_sha(sha, key, args).await
    }
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[async_trait]
impl ScriptStore for redis::aio::ConnectionManager {
    async fn load_script(&self, source: &str) -> Result<String, StoreError> {
        let mut connection_manager = self.clone();

        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(&mut connection_manager)
            .await?;

        Ok(sha)
    }

    async fn eval_sha(
        &self,
        sha: &str,
        key: &str,
        args: &[u64],
    ) -> Result<Vec<Value>, StoreError> {
        let mut connection_manager = self.clone();

        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(sha).arg(1).arg(key);
        for arg in args {
            cmd.arg(*arg);
        }

        let reply: Vec<Value> = cmd.query_async(&mut connection_manager).await?;

        Ok(reply)
    }
}
