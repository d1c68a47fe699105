//! Response cache
//!
//! Caches serialized read responses keyed by a request fingerprint and
//! invalidates them by tag:
//!
//! - **keys**: fingerprint (`uri_format_method`, plus the canonical query for
//!   `GET`) and the three tags of a resource
//! - **store**: the `CacheBackend` capability and an LRU + TTL memory store
//! - **response**: lookup/store/invalidate with freshness headers
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! life_time = 3600              # -1 disables, 0 never expires
//! expires_header_life_time = 300
//! capacity = 1024
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod response;
mod store;

pub use config::{CACHE_DISABLED, CacheConfig, MAX_EXPIRES_HEADER_LIFE_TIME};
pub use keys::{fingerprint, tags};
pub use response::{
    CACHED_HEADER, CachedResponse, ResponseCache, ResponseEnvelope, describe_metrics, http_date,
};
pub use store::{CacheBackend, CacheBackendError, MemoryCacheStore};
