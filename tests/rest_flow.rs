use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use restfront::application::{
    access::{AccessDecision, AccessRule, AccessRuleMatcher},
    dispatcher::RestDispatcher,
    documents::DocumentRepository,
    resolver::PathResolver,
};
use restfront::cache::{CACHED_HEADER, CacheConfig, MemoryCacheStore, ResponseCache};
use restfront::domain::document::DatabaseName;
use restfront::infra::db::InMemoryDocuments;
use restfront::infra::http::{AppState, build_router};
use serde_json::Value;
use tower::ServiceExt;

fn app(config: CacheConfig) -> Router {
    let store = Arc::new(MemoryCacheStore::new(&config));
    let cache = ResponseCache::new(config, store);
    let access = AccessRuleMatcher::new([
        AccessRule::new("all", Some(AccessDecision::Allow), Some(AccessDecision::Deny)),
        AccessRule::new(
            "Document-contacts*",
            Some(AccessDecision::Allow),
            Some(AccessDecision::Allow),
        ),
        AccessRule::new("Secure*", Some(AccessDecision::Deny), Some(AccessDecision::Deny)),
    ])
    .expect("rules compile");
    let documents = DocumentRepository::with_default(
        Arc::new(InMemoryDocuments::new()),
        Some(DatabaseName::parse("contacts").expect("valid name")),
    );
    let dispatcher = RestDispatcher::new(
        PathResolver::new([("people", "Document-contacts")], Some("/site/")),
        access,
        cache,
        documents,
    );

    build_router(AppState {
        dispatcher: Arc::new(dispatcher),
        database: None,
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_is_no_content_without_database() {
    let app = app(CacheConfig::default());
    let response = send(&app, Method::GET, "/health", "").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn create_list_and_delete_documents() {
    let app = app(CacheConfig::default());

    let created = send(
        &app,
        Method::POST,
        "/site/rest/Document-contacts/ada",
        r#"{"name":"Ada","city":"London"}"#,
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(
        created.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"application/json"[..])
    );

    send(
        &app,
        Method::PUT,
        "/site/rest/people/bob",
        r#"{"name":"Bob","city":"Paris"}"#,
    )
    .await;

    let listed = json_body(send(&app, Method::GET, "/site/rest/Document-contacts", "").await).await;
    let items = listed["Document-contacts"].as_array().expect("collection");
    assert_eq!(items.len(), 2);

    let filtered =
        json_body(send(&app, Method::GET, "/site/rest/Document-contacts?city=Paris", "").await)
            .await;
    assert_eq!(filtered["Document-contacts"][0]["id"], "bob");

    let removed = send(&app, Method::DELETE, "/site/rest/Document-contacts/ada", "").await;
    assert_eq!(removed.status(), StatusCode::OK);
    assert_eq!(json_body(removed).await["data"]["name"], "Ada");

    let missing = send(&app, Method::GET, "/site/rest/Document-contacts/ada", "").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_reads_are_cached_and_writes_invalidate() {
    let app = app(CacheConfig::default());
    send(&app, Method::PUT, "/site/rest/Document-contacts/1", r#"{"v":1}"#).await;

    let first = send(&app, Method::GET, "/site/rest/Document-contacts/1", "").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.headers().get(CACHED_HEADER).is_none());

    let second = send(&app, Method::GET, "/site/rest/Document-contacts/1", "").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        second.headers().get(CACHED_HEADER).map(|v| v.as_bytes()),
        Some(&b"true"[..])
    );
    assert!(second.headers().contains_key(header::EXPIRES));
    assert!(second.headers().contains_key(header::LAST_MODIFIED));
    assert_eq!(json_body(second).await["data"]["v"], 1);

    send(&app, Method::PATCH, "/site/rest/Document-contacts/1", r#"{"v":2}"#).await;

    let third = send(&app, Method::GET, "/site/rest/Document-contacts/1", "").await;
    assert!(third.headers().get(CACHED_HEADER).is_none());
    assert_eq!(json_body(third).await["data"]["v"], 2);
}

#[tokio::test]
async fn disabled_cache_never_marks_hits() {
    let app = app(CacheConfig::disabled());
    send(&app, Method::PUT, "/site/rest/Document-contacts/1", r#"{}"#).await;
    for _ in 0..2 {
        let response = send(&app, Method::GET, "/site/rest/Document-contacts/1", "").await;
        assert!(response.headers().get(CACHED_HEADER).is_none());
    }
}

#[tokio::test]
async fn error_responses_carry_codes() {
    let app = app(CacheConfig::default());

    let denied = send(&app, Method::GET, "/site/rest/SecureStuff/1", "").await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(denied).await["error"]["code"], "forbidden");

    let write_denied = send(&app, Method::POST, "/site/rest/Other/1", "{}").await;
    assert_eq!(write_denied.status(), StatusCode::FORBIDDEN);

    let unsupported = send(&app, Method::GET, "/site/rest/MyExt-MyModel/1", "").await;
    assert_eq!(unsupported.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(unsupported).await["error"]["code"],
        "unsupported_resource"
    );

    let html = send(&app, Method::GET, "/site/rest/Document-contacts/1.html", "").await;
    assert_eq!(html.status(), StatusCode::NOT_ACCEPTABLE);

    let malformed = send(&app, Method::PUT, "/site/rest/Document-contacts/1", "{nope").await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let bad_db = send(&app, Method::GET, "/site/rest/Document-Bad_Name", "").await;
    assert_eq!(bad_db.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_db).await["error"]["code"], "invalid_database");
}
