//! Cookie header codec
//!
//! Values containing `;` or `=` are not escaped on output. Field order is not
//! preserved across a parse/serialize cycle. Values are kept as written on
//! parse and trimmed on output, so padded values settle after one cycle.

use std::collections::HashMap;
use std::fmt;

/// `key=value; key2=value2` cookie header as a mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieMap(HashMap<String, String>);

impl CookieMap {
    /// Create an empty cookie map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a cookie header into a new map
    #[must_use]
    pub fn parsed(text: &str) -> Self {
        let mut map = Self::new();
        map.parse(text);
        map
    }

    /// Replace the contents of this map with the fields of `text`.
    ///
    /// Segments without an `=` are dropped.
    pub fn parse(&mut self, text: &str) {
        self.0.clear();

        for segment in text.split(';') {
            if let Some((key, value)) = segment.split_once('=') {
                self.0.insert(key.trim().to_string(), value.to_string());
            }
        }
    }

    /// Look up a field value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CookieMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            write!(f, "{key}={};", value.trim())?;
        }
        Ok(())
    }
}
