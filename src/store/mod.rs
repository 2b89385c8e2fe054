//! Keyed-field stores backing the shared TTL cache
//!
//! A store maps `(key, field)` to a string value. Each cache instance owns one
//! field name and uses the identity as the key, so several caches can share
//! the same key space.

mod memory;
mod redis_store;

pub use memory::MemoryFieldStore;
pub use redis_store::RedisFieldStore;

use async_trait::async_trait;

use crate::Result;

/// Remote keyed-field store.
///
/// Absent keys or fields are not errors: `get_field` returns `Ok(None)` and
/// `delete_field` returns `Ok(())`.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Read `field` of `key`
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Write `field` of `key`, returning once the store acknowledged it
    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Remove `field` of `key`
    async fn delete_field(&self, key: &str, field: &str) -> Result<()>;
}
