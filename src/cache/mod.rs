//! Time-to-live caches keyed by identity
//!
//! Every entry records when it was last read or written. A background sweep
//! evicts entries idle for longer than the TTL. Two backends share the
//! [`TtlCache`] interface:
//!
//! - [`LocalTtlCache`] keeps values in process memory.
//! - [`SharedTtlCache`] keeps values in a [`FieldStore`](crate::store::FieldStore)
//!   and only the timestamps locally.

mod local;
mod set;
mod shared;

pub use local::LocalTtlCache;
pub use set::{CacheSet, LAST_PROBLEM_FIELD, ORIGINAL_TOKENS_FIELD, X_ACCESS_TOKENS_FIELD};
pub use shared::SharedTtlCache;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::Result;

/// Default period of the expiry sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// String cache whose entries expire after a period without access
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Read a value, refreshing its last-touch time on a hit
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value and reset its last-touch time
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Drop a value before it expires
    async fn remove(&self, key: &str) -> Result<()>;

    /// Number of live local entries
    fn len(&self) -> usize;

    /// Whether there are no live local entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether an entry last touched at `last_touch` has outlived `ttl` at `now`
pub(crate) fn is_expired(now: Instant, last_touch: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(last_touch) > ttl
}

/// Run `sweep` every `period` until it returns `false` or the task is aborted.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_sweeper<F, Fut>(period: Duration, mut sweep: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !sweep().await {
                break;
            }
        }
    })
}
