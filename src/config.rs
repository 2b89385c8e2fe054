//! Configuration types for Tokenswap

use serde::{Deserialize, Serialize};

use crate::{Result, TokenSwapError};

/// Environment variable holding the shared store address
pub const REDIS_ADDR_ENV: &str = "GOR_REDIS_ADDR";

/// Cache backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Values held in-process
    #[default]
    Local,
    /// Values held in a shared Redis hash store
    Redis,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Idle time after which a cache entry is evicted
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Period of the background expiry sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Cache backend
    #[serde(default)]
    pub backend: Backend,
    /// Shared store address, e.g. `redis://127.0.0.1:6379`
    #[serde(default = "default_redis_url")]
    pub redis_url: Option<String>,
    /// Header, cookie and body locations the engine rewrites
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

/// Where authentication artifacts live in replayed traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Cookie field carrying the session token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Request header carrying the bearer token
    #[serde(default = "default_access_token_header")]
    pub access_token_header: String,
    /// JSON path of the fresh bearer token in a replayed response body
    #[serde(default = "default_access_token_path")]
    pub access_token_path: Vec<String>,
    /// JSON path of problem identifiers in a replayed response body
    #[serde(default = "default_problems_path")]
    pub problems_path: Vec<String>,
    /// Request path prefix that receives the last-seen problem id
    #[serde(default = "default_problem_endpoint")]
    pub problem_endpoint: String,
    /// Session token claim holding the lesson context
    #[serde(default = "default_lesson_claim")]
    pub lesson_claim: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            access_token_header: default_access_token_header(),
            access_token_path: default_access_token_path(),
            problems_path: default_problems_path(),
            problem_endpoint: default_problem_endpoint(),
            lesson_claim: default_lesson_claim(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            backend: Backend::default(),
            redis_url: default_redis_url(),
            rewrite: RewriteConfig::default(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_redis_url() -> Option<String> {
    std::env::var(REDIS_ADDR_ENV)
        .ok()
        .filter(|addr| !addr.is_empty())
        .map(|addr| normalize_redis_url(&addr))
}

fn default_session_cookie() -> String {
    "connect.sid".to_string()
}

fn default_access_token_header() -> String {
    "x-access-token".to_string()
}

fn default_access_token_path() -> Vec<String> {
    vec!["data".to_string(), "accessToken".to_string()]
}

fn default_problems_path() -> Vec<String> {
    vec!["data".to_string(), "problems".to_string(), "prob".to_string()]
}

fn default_problem_endpoint() -> String {
    "/api/v2/problem/main".to_string()
}

fn default_lesson_claim() -> String {
    "lessonInfo".to_string()
}

/// Accept bare `host:port` addresses as well as full `redis://` URLs
#[must_use]
pub fn normalize_redis_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TokenSwapError::ConfigError(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TokenSwapError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(TokenSwapError::ConfigError(
                "ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval_ms == 0 {
            return Err(TokenSwapError::ConfigError(
                "sweep_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.backend == Backend::Redis
            && self.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(TokenSwapError::ConfigError(format!(
                "redis backend requires redis_url or {REDIS_ADDR_ENV}"
            )));
        }

        let rewrite = &self.rewrite;
        for (name, value) in [
            ("session_cookie", &rewrite.session_cookie),
            ("access_token_header", &rewrite.access_token_header),
            ("problem_endpoint", &rewrite.problem_endpoint),
            ("lesson_claim", &rewrite.lesson_claim),
        ] {
            if value.trim().is_empty() {
                return Err(TokenSwapError::ConfigError(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        for (name, path) in [
            ("access_token_path", &rewrite.access_token_path),
            ("problems_path", &rewrite.problems_path),
        ] {
            if path.is_empty() || path.iter().any(String::is_empty) {
                return Err(TokenSwapError::ConfigError(format!(
                    "{name} must be a non-empty list of keys"
                )));
            }
        }

        Ok(())
    }

    /// Entry idle time as a duration
    #[must_use]
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period as a duration
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sweep_interval_ms)
    }
}
