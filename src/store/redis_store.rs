//! Redis hash-backed field store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::info;

use crate::{Result, TokenSwapError};

use super::FieldStore;

/// Field store on Redis hashes (`HGET`/`HSET`/`HDEL`)
#[derive(Clone)]
pub struct RedisFieldStore {
    conn: ConnectionManager,
}

impl RedisFieldStore {
    /// Connect to the store at `url`
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the url is invalid or the server
    /// cannot be reached
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(classify)?;
        let conn = ConnectionManager::new(client).await.map_err(classify)?;

        info!("Connected to shared store at {}", url);

        Ok(Self { conn })
    }
}

/// Connectivity failures are fatal; a rejected command is not.
fn classify(err: RedisError) -> TokenSwapError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.kind() == redis::ErrorKind::InvalidClientConfig
    {
        TokenSwapError::BackendUnavailable(err.to_string())
    } else {
        TokenSwapError::Backend(err.to_string())
    }
}

#[async_trait]
impl FieldStore for RedisFieldStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget::<_, _, Option<String>>(key, field)
            .await
            .map_err(classify)
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(classify)
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_error_is_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify(err).is_fatal());
    }

    #[test]
    fn test_classify_type_error_is_transient() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE"));
        assert!(!classify(err).is_fatal());
    }

    // NOTE: requires a reachable Redis at GOR_REDIS_ADDR
    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn test_redis_roundtrip() {
        let addr = std::env::var(crate::config::REDIS_ADDR_ENV).unwrap();
        let store = RedisFieldStore::connect(&crate::config::normalize_redis_url(&addr))
            .await
            .unwrap();

        store.set_field("element", "x-access-token", "abcdef").await.unwrap();
        assert_eq!(
            store.get_field("element", "x-access-token").await.unwrap().as_deref(),
            Some("abcdef")
        );
        store.delete_field("element", "x-access-token").await.unwrap();
        assert_eq!(store.get_field("element", "x-access-token").await.unwrap(), None);
    }
}
