//! In-process field store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Result, TokenSwapError};

use super::FieldStore;

/// Field store kept in process memory.
///
/// Lets the shared cache run without an external server, and can be switched
/// offline to exercise the unavailable-backend path.
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    entries: DashMap<String, HashMap<String, String>>,
    offline: AtomicBool,
}

impl MemoryFieldStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `BackendUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of keys with at least one field
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TokenSwapError::BackendUnavailable(
                "memory store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        Ok(self
            .entries
            .get(key)
            .and_then(|fields| fields.get(field).cloned()))
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.ensure_online()?;
        self.entries
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<()> {
        self.ensure_online()?;
        self.entries.remove_if_mut(key, |_, fields| {
            fields.remove(field);
            fields.is_empty()
        });
        Ok(())
    }
}
