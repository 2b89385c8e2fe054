//! The three caches the rewrite engine correlates through

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{Backend, Config};
use crate::store::{FieldStore, RedisFieldStore};
use crate::{Result, TokenSwapError};

use super::{LocalTtlCache, SharedTtlCache, TtlCache};

/// Store field for session cookie headers
pub const ORIGINAL_TOKENS_FIELD: &str = "cookie";
/// Store field for bearer tokens
pub const X_ACCESS_TOKENS_FIELD: &str = "xaccessToken";
/// Store field for last-seen problem ids
pub const LAST_PROBLEM_FIELD: &str = "problems";

/// Identity-keyed caches, built once at startup and handed to the engine
pub struct CacheSet {
    /// Identity to latest `Set-Cookie` header text
    pub original_tokens: Box<dyn TtlCache>,
    /// Identity to latest bearer token
    pub x_access_tokens: Box<dyn TtlCache>,
    /// Identity to last-seen problem id
    pub last_problem: Box<dyn TtlCache>,
}

impl CacheSet {
    /// In-process caches
    #[must_use]
    pub fn local(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            original_tokens: Box::new(LocalTtlCache::new(
                ORIGINAL_TOKENS_FIELD,
                ttl,
                sweep_interval,
            )),
            x_access_tokens: Box::new(LocalTtlCache::new(
                X_ACCESS_TOKENS_FIELD,
                ttl,
                sweep_interval,
            )),
            last_problem: Box::new(LocalTtlCache::new(
                LAST_PROBLEM_FIELD,
                ttl,
                sweep_interval,
            )),
        }
    }

    /// Caches sharing one field store, one field each
    #[must_use]
    pub fn shared(store: &Arc<dyn FieldStore>, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            original_tokens: Box::new(SharedTtlCache::new(
                Arc::clone(store),
                ORIGINAL_TOKENS_FIELD,
                ttl,
                sweep_interval,
            )),
            x_access_tokens: Box::new(SharedTtlCache::new(
                Arc::clone(store),
                X_ACCESS_TOKENS_FIELD,
                ttl,
                sweep_interval,
            )),
            last_problem: Box::new(SharedTtlCache::new(
                Arc::clone(store),
                LAST_PROBLEM_FIELD,
                ttl,
                sweep_interval,
            )),
        }
    }

    /// Build the backend selected by `config`, connecting to the shared
    /// store if needed.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the shared store cannot be reached
    pub async fn from_config(config: &Config) -> Result<Self> {
        let ttl = config.ttl();
        let sweep_interval = config.sweep_interval();

        match config.backend {
            Backend::Local => {
                info!("Using in-process caches (ttl {}s)", config.ttl_secs);
                Ok(Self::local(ttl, sweep_interval))
            }
            Backend::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    TokenSwapError::ConfigError("redis backend requires redis_url".to_string())
                })?;
                let store: Arc<dyn FieldStore> = Arc::new(RedisFieldStore::connect(url).await?);
                info!("Using shared caches (ttl {}s)", config.ttl_secs);
                Ok(Self::shared(&store, ttl, sweep_interval))
            }
        }
    }
}
