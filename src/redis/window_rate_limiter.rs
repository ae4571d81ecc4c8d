use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    Decision, KeyTtlMs, RateLimiter, SlidegateError, StoreError, WindowLimit, WindowSizeMs,
    redis::{
        ADMISSION_SCRIPT, RedisKey, ScriptStore, WindowKeyGenerator, WindowOptions,
        admission_script::{AdmissionArgs, parse_admission_reply},
    },
};

type StoreFn<S> = Arc<dyn Fn(&str) -> S + Send + Sync>;

/// Distributed sliding-window-log rate limiter backed by a shared store.
///
/// Every admission is a single atomic execution of [`ADMISSION_SCRIPT`] on the
/// identity's key, so any number of processes may share the same limits
/// without client-side locking. The limiter holds no per-key state.
///
/// # Script handle
///
/// The script is registered once when the limiter is built and called by its
/// handle afterwards. If the store has forgotten it (restart, `SCRIPT FLUSH`,
/// a different node behind the store supplier), the call registers it again
/// and retries exactly once. A second failure is returned to the caller.
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use slidegate::{WindowOptions, WindowRateLimiter};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let limiter = WindowRateLimiter::new(
///     connection_manager,
///     WindowOptions {
///         limit: 5,
///         window: Duration::from_secs(3),
///         ttl: None,
///         prefix: None,
///         hash_tag: false,
///     },
/// )
/// .await?;
///
/// let decision = limiter.allow("user_123").await?;
/// if !decision.allowed {
///     // send 429, retry after decision.retry_after
/// }
/// ```
pub struct WindowRateLimiter<S: ScriptStore> {
    store_fn: StoreFn<S>,
    script_sha: RwLock<Arc<str>>,
    key_generator: WindowKeyGenerator,
    window_limit: WindowLimit,
    window_size_ms: WindowSizeMs,
    key_ttl_ms: KeyTtlMs,
}

impl<S: ScriptStore + 'static> WindowRateLimiter<S> {
    /// Validate `options`, register the admission script on `store` and build
    /// the limiter.
    pub async fn new(store: S, options: WindowOptions) -> Result<Self, SlidegateError>
    where
        S: Clone,
    {
        Self::with_store_fn(move |_| store.clone(), options).await
    }

    /// Like [`new`](Self::new), but resolves the store from the identity on
    /// every call.
    ///
    /// Use this to route identities to different stores, e.g. per tenant.
    /// At construction the supplier is called once with an empty id and the
    /// script is registered on that store. Other stores pick it up through
    /// the NOSCRIPT recovery path on their first call.
    pub async fn with_store_fn<F>(
        store_fn: F,
        options: WindowOptions,
    ) -> Result<Self, SlidegateError>
    where
        F: Fn(&str) -> S + Send + Sync + 'static,
    {
        let window_limit =
            WindowLimit::try_from(options.limit).map_err(SlidegateError::InvalidOptions)?;
        let window_size_ms =
            WindowSizeMs::try_from(options.window).map_err(SlidegateError::InvalidOptions)?;
        let key_ttl_ms = match options.ttl {
            Some(ttl) if !ttl.is_zero() => {
                KeyTtlMs::try_from(ttl).map_err(SlidegateError::InvalidOptions)?
            }
            _ => KeyTtlMs::from(window_size_ms),
        };

        if *key_ttl_ms < *window_size_ms {
            tracing::warn!(
                ttl_ms = *key_ttl_ms,
                window_ms = *window_size_ms,
                "key TTL is shorter than the window; idle keys may expire with live events"
            );
        }

        let prefix = options.prefix.unwrap_or_else(RedisKey::default_prefix);
        let store_fn: StoreFn<S> = Arc::new(store_fn);

        let sha = store_fn("")
            .load_script(ADMISSION_SCRIPT)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "Failed to register admission script");
                SlidegateError::ScriptRegistration(err)
            })?;

        Ok(Self {
            store_fn,
            script_sha: RwLock::new(Arc::from(sha)),
            key_generator: WindowKeyGenerator::new(prefix, options.hash_tag),
            window_limit,
            window_size_ms,
            key_ttl_ms,
        })
    }

    /// Request one unit of quota for `id`.
    pub async fn allow(&self, id: &str) -> Result<Decision, SlidegateError> {
        self.allow_n(id, 1).await
    }

    /// Request `cost` units of quota for `id`.
    ///
    /// A zero `cost` fails locally. Costs above
    /// [`MAX_COST_PER_CALL`](crate::MAX_COST_PER_CALL) are clamped by the script.
    /// The call is one round trip, two more if the script has to be
    /// re-registered.
    pub async fn allow_n(&self, id: &str, cost: u64) -> Result<Decision, SlidegateError> {
        if cost == 0 {
            return Err(SlidegateError::InvalidCost("cost must be >= 1".to_string()));
        }

        let key = self.key_generator.get_window_key(id);
        let args = AdmissionArgs {
            now_ms: now_ms(),
            window_ms: *self.window_size_ms,
            limit: *self.window_limit,
            ttl_ms: *self.key_ttl_ms,
            cost,
        }
        .to_argv();

        let store = (self.store_fn)(id);
        let sha = self.script_sha();

        let reply = match store.eval_sha(&sha, &key, &args).await {
            Ok(reply) => reply,
            Err(StoreError::NoScript) => {
                tracing::debug!(key = %key, "Admission script unknown to store, re-registering");

                let sha = self.reload_script(&store).await?;

                store.eval_sha(&sha, &key, &args).await.map_err(|err| {
                    tracing::error!(
                        error = ?err,
                        key = %key,
                        "Admission script failed after re-registering"
                    );
                    SlidegateError::InvocationAfterReload(err)
                })?
            }
            Err(err) => return Err(SlidegateError::Invocation(err)),
        };

        parse_admission_reply(&reply)
    } // end method allow_n

    /// Handle of the admission script as currently cached.
    pub fn script_sha(&self) -> Arc<str> {
        self.script_sha.read().clone()
    }

    /// Store key holding the window of `id`.
    pub fn key_for(&self, id: &str) -> String {
        self.key_generator.get_window_key(id)
    }

    async fn reload_script(&self, store: &S) -> Result<Arc<str>, SlidegateError> {
        let sha = store.load_script(ADMISSION_SCRIPT).await.map_err(|err| {
            tracing::error!(error = ?err, "Failed to re-register admission script");
            SlidegateError::ScriptReload(err)
        })?;

        // Racing reloads store the same content-addressed handle.
        let sha: Arc<str> = Arc::from(sha);
        *self.script_sha.write() = sha.clone();

        Ok(sha)
    }
}

#[async_trait]
impl<S: ScriptStore + 'static> RateLimiter for WindowRateLimiter<S> {
    async fn allow_n(&self, id: &str, cost: u64) -> Result<Decision, SlidegateError> {
        WindowRateLimiter::allow_n(self, id, cost).await
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
