//! In-process TTL cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::Result;

use super::{is_expired, spawn_sweeper, TtlCache};

struct Entry {
    value: String,
    last_touch: Instant,
}

type Table = Arc<Mutex<HashMap<String, Entry>>>;

/// TTL cache holding values in process memory
pub struct LocalTtlCache {
    entries: Table,
    ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl LocalTtlCache {
    /// Create a cache and start its sweep.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime
    #[must_use]
    pub fn new(name: impl Into<String>, ttl: Duration, sweep_interval: Duration) -> Self {
        let name = name.into();
        let entries: Table = Arc::new(Mutex::new(HashMap::new()));

        let sweeper = {
            let entries = Arc::clone(&entries);
            spawn_sweeper(sweep_interval, move || {
                let evicted = sweep(&entries, ttl);
                if evicted > 0 {
                    debug!("Evicted {} idle entries from {}", evicted, name);
                }
                std::future::ready(true)
            })
        };

        Self {
            entries,
            ttl,
            sweeper,
        }
    }
}

fn sweep(entries: &Table, ttl: Duration) -> usize {
    let now = Instant::now();
    let mut table = entries.lock();
    let before = table.len();
    table.retain(|_, entry| !is_expired(now, entry.last_touch, ttl));
    before - table.len()
}

#[async_trait]
impl TtlCache for LocalTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut table = self.entries.lock();

        // Expired entries may outlive the deadline until the next sweep tick.
        if table
            .get(key)
            .is_some_and(|entry| is_expired(now, entry.last_touch, self.ttl))
        {
            table.remove(key);
            return Ok(None);
        }

        Ok(table.get_mut(key).map(|entry| {
            entry.last_touch = now;
            entry.value.clone()
        }))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                last_touch: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Drop for LocalTtlCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> LocalTtlCache {
        LocalTtlCache::new(
            "test",
            Duration::from_secs(ttl_secs),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache(10);
        cache.set("447455", "connect.sid=abc;").await.unwrap();

        assert_eq!(
            cache.get("447455").await.unwrap().as_deref(),
            Some("connect.sid=abc;")
        );
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_value() {
        let cache = cache(10);
        cache.set("k", "old").await.unwrap();
        cache.set("k", "new").await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = cache(10);
        cache.set("k", "v").await.unwrap();
        cache.remove("k").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_all_idle_entries() {
        let cache = cache(1);
        for i in 0..10_000 {
            cache.set(&format!("key{i}"), &format!("value{i}")).await.unwrap();
        }
        assert_eq!(cache.len(), 10_000);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("key0").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_keeps_entry_alive() {
        let cache = cache(2);
        cache.set("touched", "v").await.unwrap();
        cache.set("idle", "v").await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(cache.get("touched").await.unwrap().is_some());
        }

        assert_eq!(cache.get("idle").await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_misses_before_sweep() {
        // Sweep far in the future so only the read path can expire the entry.
        let cache = LocalTtlCache::new("test", Duration::from_secs(1), Duration::from_secs(60));
        cache.set("k", "v").await.unwrap();

        tokio::time::sleep(Duration::from_millis(1900)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
