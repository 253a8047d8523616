//! Cache policy and process-wide settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TieredResult};

/// Lifetime of distributed-tier entries when none is configured.
pub const DEFAULT_LIFETIME_SECS: u64 = 600;

/// Attempts made to delete a key from the distributed tier.
pub const DEFAULT_INVALIDATE_ATTEMPTS: u32 = 3;

/// Linear backoff unit between delete attempts.
pub const DEFAULT_INVALIDATE_BACKOFF_MS: u64 = 250;

/// Cache keys longer than this are truncated in log lines.
pub const DEFAULT_LOG_KEY_LIMIT: usize = 100;

// =============================================================================
// CACHE POLICY
// =============================================================================

/// Per-function tier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cache-format version. Bump it when the function's semantics change.
    pub version: u32,

    /// Cache in the request (unit of work) tier.
    pub request: bool,

    /// Cache in the distributed tier.
    pub distributed: bool,

    /// Cache in the durable tier, with this description on every entry.
    pub durable: Option<String>,

    /// Distributed-tier time to live. Zero means no expiry.
    pub lifetime: Duration,
}

impl CachePolicy {
    /// Request and distributed tiers with the default lifetime.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            request: true,
            distributed: true,
            durable: None,
            lifetime: Duration::from_secs(DEFAULT_LIFETIME_SECS),
        }
    }

    /// All three tiers; distributed entries never expire.
    pub fn durable(version: u32, description: impl Into<String>) -> Self {
        Self {
            durable: Some(description.into()),
            lifetime: Duration::ZERO,
            ..Self::new(version)
        }
    }

    pub fn with_request(mut self, enabled: bool) -> Self {
        self.request = enabled;
        self
    }

    pub fn with_distributed(mut self, enabled: bool) -> Self {
        self.distributed = enabled;
        self
    }

    pub fn with_durable(mut self, description: Option<String>) -> Self {
        self.durable = description;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Validate the policy for `function`.
    pub fn validate(&self, function: &str) -> TieredResult<()> {
        if !self.request && !self.distributed && !self.is_durable() {
            return Err(ConfigError::NoTierEnabled {
                function: function.to_string(),
            }
            .into());
        }
        if self.is_durable() && !self.lifetime.is_zero() {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "durable".to_string(),
                option_b: format!("lifetime={}s", self.lifetime.as_secs()),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// CACHE SETTINGS
// =============================================================================

/// Settings shared by every cached function in the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Delete attempts against the distributed tier during invalidation
    /// (default: 3)
    pub invalidate_attempts: u32,

    /// Delay unit between attempts; attempt `n` waits `n * backoff`
    /// (default: 250ms)
    pub invalidate_backoff: Duration,

    /// Lifetime used by [`CacheSettings::policy`] (default: 600s)
    pub default_lifetime: Duration,

    /// Maximum key length in log lines (default: 100)
    pub log_key_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            invalidate_attempts: DEFAULT_INVALIDATE_ATTEMPTS,
            invalidate_backoff: Duration::from_millis(DEFAULT_INVALIDATE_BACKOFF_MS),
            default_lifetime: Duration::from_secs(DEFAULT_LIFETIME_SECS),
            log_key_limit: DEFAULT_LOG_KEY_LIMIT,
        }
    }
}

impl CacheSettings {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TIERCACHE_INVALIDATE_ATTEMPTS`: Delete attempts (default: 3)
    /// - `TIERCACHE_INVALIDATE_BACKOFF_MS`: Backoff unit in ms (default: 250)
    /// - `TIERCACHE_DEFAULT_LIFETIME_SECS`: Default lifetime (default: 600)
    /// - `TIERCACHE_LOG_KEY_LIMIT`: Logged key length (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            invalidate_attempts: std::env::var("TIERCACHE_INVALIDATE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.invalidate_attempts),
            invalidate_backoff: std::env::var("TIERCACHE_INVALIDATE_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.invalidate_backoff),
            default_lifetime: std::env::var("TIERCACHE_DEFAULT_LIFETIME_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_lifetime),
            log_key_limit: std::env::var("TIERCACHE_LOG_KEY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_key_limit),
        }
    }

    pub fn with_invalidate_attempts(mut self, attempts: u32) -> Self {
        self.invalidate_attempts = attempts;
        self
    }

    pub fn with_invalidate_backoff(mut self, backoff: Duration) -> Self {
        self.invalidate_backoff = backoff;
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn with_log_key_limit(mut self, limit: usize) -> Self {
        self.log_key_limit = limit;
        self
    }

    /// Request and distributed policy using the configured default lifetime.
    pub fn policy(&self, version: u32) -> CachePolicy {
        CachePolicy::new(version).with_lifetime(self.default_lifetime)
    }

    pub fn validate(&self) -> TieredResult<()> {
        if self.invalidate_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "invalidate_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            }
            .into());
        }
        if self.log_key_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "log_key_limit".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
