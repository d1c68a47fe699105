//! Response cache configuration.
//!
//! Controlled by the `[cache]` section of `restfront.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

/// `life_time` value that turns the response cache off.
pub const CACHE_DISABLED: i64 = -1;

/// Upper bound for `expires_header_life_time`: ten years.
pub const MAX_EXPIRES_HEADER_LIFE_TIME: i64 = 10 * 365 * 24 * 60 * 60;

const DEFAULT_LIFE_TIME: i64 = 3600;
const DEFAULT_EXPIRES_HEADER_LIFE_TIME: i64 = 300;
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry TTL in seconds. `-1` disables caching, `0` keeps entries until
    /// they are evicted or flushed.
    pub life_time: i64,
    /// Seconds added to the lookup time for the `Expires` header.
    pub expires_header_life_time: i64,
    /// Maximum entries held by the in-memory store.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            life_time: DEFAULT_LIFE_TIME,
            expires_header_life_time: DEFAULT_EXPIRES_HEADER_LIFE_TIME,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            life_time: settings.life_time,
            expires_header_life_time: settings.expires_header_life_time,
            capacity: settings.capacity,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            life_time: CACHE_DISABLED,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.life_time != CACHE_DISABLED
    }

    /// Storage TTL; `None` means entries do not expire.
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.life_time)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.life_time, 3600);
        assert_eq!(config.expires_header_life_time, 300);
        assert_eq!(config.capacity, 1024);
    }

    #[test]
    fn minus_one_disables_caching() {
        assert!(!CacheConfig::disabled().is_enabled());
    }

    #[test]
    fn ttl_semantics() {
        let mut config = CacheConfig::default();
        assert_eq!(config.ttl(), Some(Duration::from_secs(3600)));
        config.life_time = 0;
        assert_eq!(config.ttl(), None);
        config.life_time = CACHE_DISABLED;
        assert_eq!(config.ttl(), None);
    }

    #[test]
    fn capacity_clamps_to_one() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
