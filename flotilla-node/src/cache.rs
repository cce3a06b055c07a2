// Cache-Aside Lookup Module
//
// INTENTION:
// Provide the shared lookup-through cache used by the expensive driver
// bases. Entries hold a serialized `Outcome`, so failures are first-class
// cached values: a successful lookup stays for a long TTL, a failed one is
// retained briefly so a broken upstream is not hammered, and a read never
// raises.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flotilla_common::logging::Logger;

use crate::error::{DelegationError, Outcome};

/// How long a successful lookup stays cached.
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(20 * 24 * 60 * 60);

/// How long a failed lookup stays cached before the upstream is retried.
pub const DEFAULT_ERROR_TTL: Duration = Duration::from_secs(20);

/// TTL pair for a cache-aside lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub success_ttl: Duration,
    pub error_ttl: Duration,
}

impl CacheConfig {
    /// Build a config, enforcing that failures expire before successes.
    pub fn new(success_ttl: Duration, error_ttl: Duration) -> Result<Self, DelegationError> {
        if error_ttl >= success_ttl {
            return Err(DelegationError::Config(format!(
                "error ttl ({error_ttl:?}) must be shorter than success ttl ({success_ttl:?})"
            )));
        }
        Ok(Self {
            success_ttl,
            error_ttl,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl: DEFAULT_SUCCESS_TTL,
            error_ttl: DEFAULT_ERROR_TTL,
        }
    }
}

struct CacheEntry {
    value_json: String,
    expires_at: Instant,
}

/// Keyed cache-aside lookup over an async compute function.
pub struct CacheLookup {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    logger: Arc<Logger>,
}

impl CacheLookup {
    pub fn new(config: CacheConfig, logger: Arc<Logger>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            logger,
        }
    }

    /// Look up `key`, computing and caching on a miss.
    ///
    /// The compute result is captured into an `Outcome` before caching, so
    /// both arms are served from the cache until their TTL lapses. An entry
    /// that no longer deserializes is dropped and treated as a miss.
    pub async fn lookup<T, F, Fut>(&self, key: &str, compute: F) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // Read under a scoped guard; never hold it across the compute await
        // or the insert below.
        let cached_json = {
            match self.entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    Some(entry.value_json.clone())
                }
                _ => None,
            }
        };

        if let Some(json) = cached_json {
            match serde_json::from_str::<Outcome<T>>(&json) {
                Ok(outcome) => return outcome,
                Err(err) => {
                    self.logger
                        .warn(format!("dropping undecodable cache entry for {key}: {err}"));
                    self.entries.remove(key);
                }
            }
        }

        let outcome = Outcome::capture(compute().await);
        let ttl = if outcome.is_ok() {
            self.config.success_ttl
        } else {
            self.config.error_ttl
        };
        match serde_json::to_string(&outcome) {
            Ok(value_json) => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value_json,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            Err(err) => {
                self.logger
                    .warn(format!("not caching unserializable value for {key}: {err}"));
            }
        }
        outcome
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_logger() -> Arc<Logger> {
        Arc::new(Logger::new_root(
            flotilla_common::logging::Component::Cache,
            "test",
        ))
    }

    #[tokio::test]
    async fn success_is_computed_once() {
        let cache = CacheLookup::new(CacheConfig::default(), test_logger());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let outcome: Outcome<u32> = cache
                .lookup("answer", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(outcome, Outcome::Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    async fn flaky_lookup(cache: &CacheLookup, calls: &AtomicUsize) -> Outcome<u32> {
        cache
            .lookup("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(anyhow::anyhow!("upstream down"))
                } else {
                    Ok(7u32)
                }
            })
            .await
    }

    #[tokio::test]
    async fn failure_is_cached_then_retried_after_error_ttl() {
        let config = CacheConfig::new(Duration::from_secs(60), Duration::from_millis(50)).unwrap();
        let cache = CacheLookup::new(config, test_logger());
        let calls = AtomicUsize::new(0);

        assert!(flaky_lookup(&cache, &calls).await.is_err());
        // inside the error TTL the cached failure is served
        assert!(flaky_lookup(&cache, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(flaky_lookup(&cache, &calls).await, Outcome::Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn error_ttl_must_be_shorter_than_success_ttl() {
        let err = CacheConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        assert!(matches!(err, Err(DelegationError::Config(_))));
    }
}
