use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use restfront::application::{
    access::{AccessDecision, AccessRule, AccessRuleMatcher},
    dispatcher::RestDispatcher,
    documents::DocumentRepository,
    resolver::PathResolver,
};
use restfront::cache::{
    CacheBackend, CacheBackendError, CacheConfig, MemoryCacheStore, ResponseCache,
};
use restfront::domain::request::Method;
use restfront::infra::db::InMemoryDocuments;

struct UnavailableBackend;

#[async_trait]
impl CacheBackend for UnavailableBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheBackendError> {
        Err(CacheBackendError::Unavailable("offline".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: Bytes,
        _tags: &[String],
        _ttl: Option<Duration>,
    ) -> Result<(), CacheBackendError> {
        Err(CacheBackendError::Unavailable("offline".into()))
    }

    async fn flush_by_tag(&self, _tag: &str) -> Result<usize, CacheBackendError> {
        Err(CacheBackendError::Unavailable("offline".into()))
    }

    async fn has_tag(&self, _tag: &str) -> Result<bool, CacheBackendError> {
        Err(CacheBackendError::Unavailable("offline".into()))
    }
}

fn dispatcher(backend: Arc<dyn CacheBackend>) -> RestDispatcher {
    let access = AccessRuleMatcher::new([
        AccessRule::new("all", Some(AccessDecision::Allow), Some(AccessDecision::Allow)),
        AccessRule::new("Secure*", Some(AccessDecision::Deny), Some(AccessDecision::Deny)),
    ])
    .expect("rules compile");
    RestDispatcher::new(
        PathResolver::default(),
        access,
        ResponseCache::new(CacheConfig::default(), backend),
        DocumentRepository::new(Arc::new(InMemoryDocuments::new())),
    )
}

#[tokio::test]
async fn pipeline_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let config = CacheConfig::default();
    let healthy = dispatcher(Arc::new(MemoryCacheStore::new(&config)));
    healthy
        .dispatch(Method::Put, "/rest/Document-metrics/1", br#"{"v":1}"#)
        .await
        .expect("stored");
    for _ in 0..2 {
        healthy
            .dispatch(Method::Get, "/rest/Document-metrics/1", b"")
            .await
            .expect("read");
    }
    healthy
        .dispatch(Method::Delete, "/rest/Document-metrics/1", b"")
        .await
        .expect("removed");
    assert!(
        healthy
            .dispatch(Method::Get, "/rest/SecureArea", b"")
            .await
            .is_err()
    );

    let degraded = dispatcher(Arc::new(UnavailableBackend));
    degraded
        .dispatch(Method::Put, "/rest/Document-metrics/2", br#"{}"#)
        .await
        .expect("writes proceed without a cache");
    let read = degraded
        .dispatch(Method::Get, "/rest/Document-metrics/2", b"")
        .await
        .expect("reads proceed without a cache");
    assert!(!read.is_cached());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "restfront_cache_hit_total",
        "restfront_cache_miss_total",
        "restfront_cache_store_total",
        "restfront_cache_flush_total",
        "restfront_cache_backend_error_total",
        "restfront_access_denied_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
