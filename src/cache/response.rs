//! Response cache in front of the document gateway.
//!
//! Read responses are stored under the request fingerprint and tagged with
//! the request's three tags. A write request whose most specific tag is still
//! populated flushes that tag before it proceeds. Storage failures never
//! fail the request: they are logged, counted and treated as misses.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use metrics::{Unit, counter, describe_counter};
use serde::{Deserialize, Serialize};
use time::{
    Duration, OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};
use tracing::{debug, instrument, warn};

use crate::domain::request::RequestContext;

use super::{
    config::CacheConfig,
    keys::{fingerprint, tags},
    store::{CacheBackend, CacheBackendError},
};

/// Marker header set on responses served from the cache.
pub const CACHED_HEADER: &str = "x-restfront-cached";

const METRIC_HIT: &str = "restfront_cache_hit_total";
const METRIC_MISS: &str = "restfront_cache_miss_total";
const METRIC_STORE: &str = "restfront_cache_store_total";
const METRIC_FLUSH: &str = "restfront_cache_flush_total";
const METRIC_BACKEND_ERROR: &str = "restfront_cache_backend_error_total";

/// Register descriptions for the cache counters with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(METRIC_HIT, Unit::Count, "Total number of response-cache hits.");
    describe_counter!(METRIC_MISS, Unit::Count, "Total number of response-cache misses.");
    describe_counter!(
        METRIC_STORE,
        Unit::Count,
        "Total number of read responses written to the cache."
    );
    describe_counter!(
        METRIC_FLUSH,
        Unit::Count,
        "Total number of tag flushes, including write collisions."
    );
    describe_counter!(
        METRIC_BACKEND_ERROR,
        Unit::Count,
        "Total number of cache backend failures served uncached."
    );
}

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Response produced by the dispatcher, as handed to [`ResponseCache::store`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(status: StatusCode, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// A cache hit rebuilt with freshness headers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.status);

        for (name, value) in self.headers {
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                builder = builder.header(name, header_value);
            }
        }

        builder
            .body(Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Serialized form kept in the backend.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// Base64 of the response body.
    body: String,
    status: u16,
    content_type: String,
    last_modified: String,
}

#[derive(Clone)]
pub struct ResponseCache {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn applies_to(&self, request: &RequestContext) -> bool {
        self.config.is_enabled() && !request.path().is_empty()
    }

    pub async fn lookup(&self, request: &RequestContext) -> Option<CachedResponse> {
        self.lookup_at(request, OffsetDateTime::now_utc()).await
    }

    /// Look up `request` as of `now`.
    ///
    /// Read requests get the cached envelope back. A write request never gets
    /// a cached response; if entries for its resource are cached they are
    /// flushed first.
    #[instrument(skip_all, fields(path = %request.path(), method = %request.method()))]
    pub async fn lookup_at(
        &self,
        request: &RequestContext,
        now: OffsetDateTime,
    ) -> Option<CachedResponse> {
        if !self.applies_to(request) {
            return None;
        }

        if request.is_write() {
            let [first_tag, ..] = tags(request);
            match self.backend.has_tag(&first_tag).await {
                Ok(true) => {
                    debug!(cache = "response", outcome = "write_collision", tag = %first_tag);
                    self.flush(&first_tag).await;
                }
                Ok(false) => {}
                Err(err) => backend_failed("has_tag", &err),
            }
            return None;
        }

        let key = fingerprint(request);
        let raw = match self.backend.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!(METRIC_MISS).increment(1);
                debug!(cache = "response", outcome = "miss");
                return None;
            }
            Err(err) => {
                backend_failed("get", &err);
                return None;
            }
        };

        let entry = match decode(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                backend_failed("decode", &err);
                return None;
            }
        };

        counter!(METRIC_HIT).increment(1);
        debug!(cache = "response", outcome = "hit", status = entry.status);

        let mut headers = vec![
            (header::CONTENT_TYPE.to_string(), entry.content_type),
            (header::LAST_MODIFIED.to_string(), entry.last_modified),
        ];
        let expires = now.checked_add(Duration::seconds(self.config.expires_header_life_time));
        if let Some(expires) = expires.and_then(http_date) {
            headers.push((header::EXPIRES.to_string(), expires));
        }
        headers.push((CACHED_HEADER.to_string(), "true".to_string()));

        Some(CachedResponse {
            status: entry.status,
            headers,
            body: entry.body,
        })
    }

    pub async fn store(&self, request: &RequestContext, response: &ResponseEnvelope) {
        self.store_at(request, response, OffsetDateTime::now_utc())
            .await
    }

    /// Record a read response. Writes, disabled caching and requests without
    /// a path are ignored.
    #[instrument(skip_all, fields(path = %request.path()))]
    pub async fn store_at(
        &self,
        request: &RequestContext,
        response: &ResponseEnvelope,
        now: OffsetDateTime,
    ) {
        if request.is_write() || !self.applies_to(request) {
            return;
        }

        let entry = StoredEntry {
            body: BASE64.encode(&response.body),
            status: response.status.as_u16(),
            content_type: response.content_type.clone(),
            last_modified: http_date(now).unwrap_or_default(),
        };
        let value = match serde_json::to_vec(&entry) {
            Ok(value) => Bytes::from(value),
            Err(err) => {
                backend_failed("encode", &CacheBackendError::Corrupt(err.to_string()));
                return;
            }
        };

        let key = fingerprint(request);
        match self
            .backend
            .set(&key, value, &tags(request), self.config.ttl())
            .await
        {
            Ok(()) => {
                counter!(METRIC_STORE).increment(1);
                debug!(cache = "response", outcome = "store");
            }
            Err(err) => backend_failed("set", &err),
        }
    }

    /// Flush every entry carrying the request's most specific tag.
    pub async fn invalidate(&self, request: &RequestContext) -> usize {
        if !self.config.is_enabled() {
            return 0;
        }
        let [first_tag, ..] = tags(request);
        self.flush(&first_tag).await
    }

    async fn flush(&self, tag: &str) -> usize {
        match self.backend.flush_by_tag(tag).await {
            Ok(removed) => {
                counter!(METRIC_FLUSH).increment(1);
                debug!(cache = "response", outcome = "flush", tag, removed);
                removed
            }
            Err(err) => {
                backend_failed("flush_by_tag", &err);
                0
            }
        }
    }
}

struct DecodedEntry {
    body: Bytes,
    status: u16,
    content_type: String,
    last_modified: String,
}

fn decode(raw: &[u8]) -> Result<DecodedEntry, CacheBackendError> {
    let entry: StoredEntry =
        serde_json::from_slice(raw).map_err(|err| CacheBackendError::Corrupt(err.to_string()))?;
    let body = BASE64
        .decode(entry.body.as_bytes())
        .map_err(|err| CacheBackendError::Corrupt(err.to_string()))?;
    Ok(DecodedEntry {
        body: Bytes::from(body),
        status: entry.status,
        content_type: entry.content_type,
        last_modified: entry.last_modified,
    })
}

fn backend_failed(op: &'static str, err: &CacheBackendError) {
    counter!(METRIC_BACKEND_ERROR).increment(1);
    warn!(cache = "response", op, error = %err, "cache backend failed; continuing uncached");
}

/// `Wed, 21 Oct 2015 07:28:00 GMT`
pub fn http_date(at: OffsetDateTime) -> Option<String> {
    at.to_offset(UtcOffset::UTC).format(HTTP_DATE).ok()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::application::resolver::PathResolver;
    use crate::cache::store::MemoryCacheStore;
    use crate::domain::request::Method;

    fn cache_with(config: CacheConfig) -> (ResponseCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new(&config));
        (ResponseCache::new(config, store.clone()), store)
    }

    fn request(method: Method, target: &str) -> RequestContext {
        PathResolver::default().resolve(method, target)
    }

    fn envelope() -> ResponseEnvelope {
        ResponseEnvelope::new(StatusCode::OK, "application/json", r#"{"id":"1"}"#)
    }

    #[test]
    fn http_date_format() {
        assert_eq!(
            http_date(datetime!(2015-10-21 07:28:00 UTC)).as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(
            http_date(datetime!(2015-10-21 09:28:00 +02:00)).as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[tokio::test]
    async fn stored_read_is_served_with_fresh_expires() {
        let (cache, _) = cache_with(CacheConfig::default());
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        let stored_at = datetime!(2015-10-21 07:28:00 UTC);
        cache.store_at(&read, &envelope(), stored_at).await;

        let later = datetime!(2015-10-21 08:00:00 UTC);
        let hit = cache.lookup_at(&read, later).await.expect("hit");
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, Bytes::from_static(br#"{"id":"1"}"#));
        assert_eq!(hit.header("content-type"), Some("application/json"));
        assert_eq!(
            hit.header("last-modified"),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(hit.header("expires"), Some("Wed, 21 Oct 2015 08:05:00 GMT"));
        assert_eq!(hit.header(CACHED_HEADER), Some("true"));
    }

    #[tokio::test]
    async fn disabled_cache_and_empty_path_bypass() {
        let (cache, store) = cache_with(CacheConfig::disabled());
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        cache.store(&read, &envelope()).await;
        assert!(store.is_empty());
        assert!(cache.lookup(&read).await.is_none());

        let (cache, store) = cache_with(CacheConfig::default());
        let root = request(Method::Get, "/rest/");
        assert_eq!(root.path(), "");
        cache.store(&root, &envelope()).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn writes_are_never_stored() {
        let (cache, store) = cache_with(CacheConfig::default());
        cache
            .store(&request(Method::Post, "/rest/MyExt-MyModel/1"), &envelope())
            .await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn write_lookup_flushes_the_resource() {
        let (cache, store) = cache_with(CacheConfig::default());
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        let other_variant = request(Method::Get, "/rest/MyExt-MyModel/2.json?x=1");
        let unrelated = request(Method::Get, "/rest/MyExt-Other/1");
        for req in [&read, &other_variant, &unrelated] {
            cache.store(req, &envelope()).await;
        }
        assert_eq!(store.len(), 3);

        let write = request(Method::Put, "/rest/MyExt-MyModel/1");
        assert!(cache.lookup(&write).await.is_none());

        assert!(cache.lookup(&read).await.is_none());
        assert!(cache.lookup(&other_variant).await.is_none());
        assert!(cache.lookup(&unrelated).await.is_some());
    }

    #[tokio::test]
    async fn invalidate_uses_first_tag_only() {
        let (cache, _) = cache_with(CacheConfig::default());
        let vendor = request(Method::Get, "/rest/Acme-MyExt-MyModel/1");
        let plain = request(Method::Get, "/rest/MyExt-MyModel/1");
        cache.store(&vendor, &envelope()).await;
        cache.store(&plain, &envelope()).await;

        // Both share `MyExt_MyModel`, but only the first tag is flushed.
        assert_eq!(cache.invalidate(&plain).await, 1);
        assert!(cache.lookup(&plain).await.is_none());
        assert!(cache.lookup(&vendor).await.is_some());
    }

    #[tokio::test]
    async fn out_of_range_expires_is_omitted() {
        let (cache, _) = cache_with(CacheConfig {
            expires_header_life_time: 1_000_000_000_000,
            ..CacheConfig::default()
        });
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        cache.store(&read, &envelope()).await;

        let hit = cache.lookup(&read).await.expect("hit");
        assert_eq!(hit.status, 200);
        assert_eq!(hit.header("expires"), None);
        assert_eq!(hit.header(CACHED_HEADER), Some("true"));
    }

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheBackendError> {
            Err(CacheBackendError::Unavailable("down".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: Bytes,
            _tags: &[String],
            _ttl: Option<std::time::Duration>,
        ) -> Result<(), CacheBackendError> {
            Err(CacheBackendError::Unavailable("down".into()))
        }

        async fn flush_by_tag(&self, _tag: &str) -> Result<usize, CacheBackendError> {
            Err(CacheBackendError::Unavailable("down".into()))
        }

        async fn has_tag(&self, _tag: &str) -> Result<bool, CacheBackendError> {
            Err(CacheBackendError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn backend_failures_fail_open() {
        let cache = ResponseCache::new(CacheConfig::default(), Arc::new(FailingBackend));
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        cache.store(&read, &envelope()).await;
        assert!(cache.lookup(&read).await.is_none());
        assert!(
            cache
                .lookup(&request(Method::Delete, "/rest/MyExt-MyModel/1"))
                .await
                .is_none()
        );
        assert_eq!(cache.invalidate(&read).await, 0);
    }

    #[tokio::test]
    async fn corrupt_entries_are_misses() {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryCacheStore::new(&config));
        let cache = ResponseCache::new(config, store.clone());
        let read = request(Method::Get, "/rest/MyExt-MyModel/1");
        store
            .set(&fingerprint(&read), Bytes::from_static(b"not json"), &[], None)
            .await
            .expect("set");
        assert!(cache.lookup(&read).await.is_none());
    }
}
