//! TTL cache backed by a shared field store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::store::FieldStore;
use crate::{Result, TokenSwapError};

use super::{is_expired, spawn_sweeper, TtlCache};

struct State {
    store: Arc<dyn FieldStore>,
    field: String,
    ttl: Duration,
    /// Last-touch time per key; values live in the store
    touched: Mutex<HashMap<String, Instant>>,
    /// Set once the sweep hit an unrecoverable store failure
    fault: Mutex<Option<String>>,
    /// Held across each remote call so an eviction never lands on a fresh write
    remote: tokio::sync::Mutex<()>,
}

impl State {
    fn check_fault(&self) -> Result<()> {
        match self.fault.lock().as_ref() {
            Some(reason) => Err(TokenSwapError::BackendUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn touch(&self, key: &str) {
        self.touched.lock().insert(key.to_string(), Instant::now());
    }

    fn is_idle(&self, key: &str) -> bool {
        self.touched
            .lock()
            .get(key)
            .is_some_and(|last| is_expired(Instant::now(), *last, self.ttl))
    }

    /// Drop the timestamp of `key` if it is still idle as of `cutoff`.
    fn forget_if_idle(&self, key: &str, cutoff: Instant) -> bool {
        let mut touched = self.touched.lock();
        match touched.get(key) {
            Some(last) if is_expired(cutoff, *last, self.ttl) => {
                touched.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Evict idle keys. Returns `false` once the store is unreachable.
    async fn sweep(&self) -> bool {
        let cutoff = Instant::now();
        let expired: Vec<String> = self
            .touched
            .lock()
            .iter()
            .filter(|(_, last)| is_expired(cutoff, **last, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            debug!("Evicting {} idle entries from {}", expired.len(), self.field);
        }

        for key in &expired {
            let _remote = self.remote.lock().await;
            // Touched again while earlier keys were being deleted.
            if !self.forget_if_idle(key, cutoff) {
                continue;
            }

            match self.store.delete_field(key, &self.field).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Stopping {} sweep: {}", self.field, e);
                    *self.fault.lock() = Some(e.to_string());
                    return false;
                }
                Err(e) => warn!("Failed to evict {}/{}: {}", key, self.field, e),
            }
        }

        true
    }
}

/// TTL cache whose values live in a [`FieldStore`] under one field name.
///
/// Reads and writes go straight to the store; only timestamps are kept
/// locally to decide evictions. Once the store becomes unreachable during a
/// sweep, every later call fails with `BackendUnavailable`.
pub struct SharedTtlCache {
    state: Arc<State>,
    sweeper: JoinHandle<()>,
}

impl SharedTtlCache {
    /// Create a cache on `field` of `store` and start its sweep.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime
    #[must_use]
    pub fn new(
        store: Arc<dyn FieldStore>,
        field: impl Into<String>,
        ttl: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let state = Arc::new(State {
            store,
            field: field.into(),
            ttl,
            touched: Mutex::new(HashMap::new()),
            fault: Mutex::new(None),
            remote: tokio::sync::Mutex::new(()),
        });

        let sweeper = {
            let state = Arc::clone(&state);
            spawn_sweeper(sweep_interval, move || {
                let state = Arc::clone(&state);
                async move { state.sweep().await }
            })
        };

        Self { state, sweeper }
    }
}

#[async_trait]
impl TtlCache for SharedTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.state.check_fault()?;

        let _remote = self.state.remote.lock().await;
        // Left for the sweep to delete remotely.
        if self.state.is_idle(key) {
            return Ok(None);
        }

        let value = self.state.store.get_field(key, &self.state.field).await?;
        if value.is_some() {
            self.state.touch(key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.state.check_fault()?;

        let _remote = self.state.remote.lock().await;
        let written = self
            .state
            .store
            .set_field(key, &self.state.field, value)
            .await;
        // Recorded even on failure so a partial write still expires.
        self.state.touch(key);
        written
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.state.check_fault()?;

        let _remote = self.state.remote.lock().await;
        self.state.touched.lock().remove(key);
        self.state.store.delete_field(key, &self.state.field).await
    }

    fn len(&self) -> usize {
        self.state.touched.lock().len()
    }
}

impl Drop for SharedTtlCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFieldStore;

    fn cache(store: &Arc<MemoryFieldStore>, field: &str, ttl_secs: u64) -> SharedTtlCache {
        SharedTtlCache::new(
            Arc::clone(store) as Arc<dyn FieldStore>,
            field,
            Duration::from_secs(ttl_secs),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_get_set_through_store() {
        let store = Arc::new(MemoryFieldStore::new());
        let x_token = cache(&store, "x-access-token", 10);
        let cookie = cache(&store, "set-cookie", 10);

        x_token.set("element", "abcdef").await.unwrap();
        cookie.set("element", "coooooookie").await.unwrap();
        x_token.set("element", "bbbbbb").await.unwrap();

        assert_eq!(x_token.get("element").await.unwrap().as_deref(), Some("bbbbbb"));
        assert_eq!(
            cookie.get("element").await.unwrap().as_deref(),
            Some("coooooookie")
        );
        assert_eq!(
            store.get_field("element", "x-access-token").await.unwrap().as_deref(),
            Some("bbbbbb")
        );
        assert_eq!(x_token.len(), 1);
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let store = Arc::new(MemoryFieldStore::new());
        let cache = cache(&store, "cookie", 10);
        assert_eq!(cache.get("nobody").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_deletes_remote_field() {
        let store = Arc::new(MemoryFieldStore::new());
        let x_token = cache(&store, "x-access-token", 1);
        let cookie = cache(&store, "cookie", 60);

        x_token.set("element", "abcdef").await.unwrap();
        cookie.set("element", "connect.sid=a;").await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(x_token.len(), 0);
        assert_eq!(x_token.get("element").await.unwrap(), None);
        assert_eq!(
            cookie.get("element").await.unwrap().as_deref(),
            Some("connect.sid=a;")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_during_sweep_poisons_cache() {
        let store = Arc::new(MemoryFieldStore::new());
        let cache = cache(&store, "cookie", 1);
        cache.set("447455", "connect.sid=a;").await.unwrap();

        store.set_offline(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        store.set_offline(false);

        assert!(matches!(
            cache.get("447455").await,
            Err(TokenSwapError::BackendUnavailable(_))
        ));
        assert!(cache.set("447455", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_set_still_recorded_for_expiry() {
        let store = Arc::new(MemoryFieldStore::new());
        let cache = cache(&store, "cookie", 10);

        store.set_offline(true);
        assert!(cache.set("447455", "v").await.unwrap_err().is_fatal());
        assert_eq!(cache.len(), 1);
    }

    struct SlowDeleteStore {
        inner: MemoryFieldStore,
        delay: Duration,
    }

    #[async_trait]
    impl FieldStore for SlowDeleteStore {
        async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
            self.inner.get_field(key, field).await
        }

        async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
            self.inner.set_field(key, field, value).await
        }

        async fn delete_field(&self, key: &str, field: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete_field(key, field).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_during_sweep_survives() {
        let store = Arc::new(SlowDeleteStore {
            inner: MemoryFieldStore::new(),
            delay: Duration::from_millis(50),
        });
        let cache = SharedTtlCache::new(
            Arc::clone(&store) as Arc<dyn FieldStore>,
            "cookie",
            Duration::from_secs(3),
            Duration::from_secs(1),
        );

        for i in 0..20 {
            cache.set(&format!("user{i}"), "stale").await.unwrap();
        }

        // The sweep at t=4s is deleting one key every 50ms.
        tokio::time::sleep(Duration::from_millis(4050)).await;
        for i in 0..20 {
            cache.set(&format!("user{i}"), "fresh").await.unwrap();
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        for i in 0..20 {
            let key = format!("user{i}");
            assert_eq!(
                store.inner.get_field(&key, "cookie").await.unwrap().as_deref(),
                Some("fresh"),
                "{key}"
            );
            assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("fresh"));
        }
        assert_eq!(cache.len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_misses_before_sweep() {
        let store = Arc::new(MemoryFieldStore::new());
        let cache = SharedTtlCache::new(
            Arc::clone(&store) as Arc<dyn FieldStore>,
            "cookie",
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        cache.set("447455", "connect.sid=a;").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(cache.get("447455").await.unwrap(), None);
        assert_eq!(cache.get("447455").await.unwrap(), None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.get_field("447455", "cookie").await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
