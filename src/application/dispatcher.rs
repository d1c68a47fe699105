//! Request pipeline: resolve, authorize, consult the cache, execute against
//! the document gateway and record the outcome.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::{Unit, counter, describe_counter};
use serde_json::{Map, Value, json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::{CachedResponse, ResponseCache, ResponseEnvelope};
use crate::domain::{
    document::{DatabaseName, Document},
    error::DomainError,
    request::{Format, Method, RequestContext},
    resource_type::ResourceType,
};

use super::{
    access::{AccessDecision, AccessRuleMatcher},
    documents::DocumentRepository,
    error::AppError,
    repos::DocumentQuery,
    resolver::PathResolver,
};

pub const METRIC_ACCESS_DENIED: &str = "restfront_access_denied_total";

pub fn describe_metrics() {
    describe_counter!(
        METRIC_ACCESS_DENIED,
        Unit::Count,
        "Total number of requests rejected by access rules."
    );
}

/// Outcome of a dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum RestResponse {
    Fresh(ResponseEnvelope),
    Cached(CachedResponse),
}

impl RestResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            RestResponse::Fresh(envelope) => envelope.status,
            RestResponse::Cached(cached) => {
                StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK)
            }
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            RestResponse::Fresh(envelope) => &envelope.body,
            RestResponse::Cached(cached) => &cached.body,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, RestResponse::Cached(_))
    }
}

impl IntoResponse for RestResponse {
    fn into_response(self) -> Response {
        match self {
            RestResponse::Fresh(envelope) => envelope.into_response(),
            RestResponse::Cached(cached) => cached.into_response(),
        }
    }
}

#[derive(Clone)]
pub struct RestDispatcher {
    resolver: PathResolver,
    access: AccessRuleMatcher,
    cache: ResponseCache,
    documents: DocumentRepository,
}

impl RestDispatcher {
    pub fn new(
        resolver: PathResolver,
        access: AccessRuleMatcher,
        cache: ResponseCache,
        documents: DocumentRepository,
    ) -> Self {
        Self {
            resolver,
            access,
            cache,
            documents,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[instrument(skip(self, method, body), fields(method = %method))]
    pub async fn dispatch(
        &self,
        method: Method,
        target: &str,
        body: &[u8],
    ) -> Result<RestResponse, AppError> {
        let request = self.resolver.resolve(method, target);
        self.authorize(&request)?;
        let cached = self.cache_subject(&request);

        if let Some(hit) = self.cache.lookup(&cached).await {
            return Ok(RestResponse::Cached(hit));
        }

        if request.format() != Format::Json {
            return Err(AppError::NotAcceptable(request.format()));
        }

        let envelope = self.execute(&request, body).await?;

        if request.is_read() {
            if envelope.status == StatusCode::OK {
                self.cache.store(&cached, &envelope).await;
            }
        } else {
            self.cache.invalidate(&cached).await;
        }

        Ok(RestResponse::Fresh(envelope))
    }

    /// The request as the cache sees it. Document routes are tagged by
    /// `Document-{db}` so `Document/{id}` and `Document-{db}/{id}` share
    /// invalidation.
    fn cache_subject(&self, request: &RequestContext) -> RequestContext {
        let database = match request.resource_type().document_database() {
            Some(Some(name)) => DatabaseName::parse(name).ok(),
            Some(None) => self.documents.selected_database().cloned(),
            None => None,
        };
        match database {
            Some(database) => request.with_resource_type(ResourceType::new(format!(
                "Document-{}",
                database.as_str()
            ))),
            None => request.clone(),
        }
    }

    fn authorize(&self, request: &RequestContext) -> Result<(), AppError> {
        let access = request.access_method();
        match self.access.authorize(request.path(), access)? {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny => {
                counter!(METRIC_ACCESS_DENIED).increment(1);
                info!(path = %request.path(), access = access.as_str(), "access denied");
                Err(AppError::Forbidden {
                    path: request.path().to_string(),
                    access,
                })
            }
        }
    }

    async fn execute(
        &self,
        request: &RequestContext,
        body: &[u8],
    ) -> Result<ResponseEnvelope, AppError> {
        let Some(explicit) = request.resource_type().document_database() else {
            if request.path().is_empty() {
                return Err(AppError::NotFound);
            }
            return Err(AppError::UnsupportedResource(
                request.resource_type().to_string(),
            ));
        };

        let database = match explicit {
            Some(name) => DatabaseName::parse(name)?,
            None => self
                .documents
                .selected_database()
                .cloned()
                .ok_or(DomainError::NoDatabaseSelected)?,
        };

        match request.method() {
            Method::Get | Method::Head => match request.identifier() {
                Some(id) => self.show(&database, id).await,
                None => self.list(request, &database).await,
            },
            Method::Post | Method::Put | Method::Patch => {
                self.register(request, database, body).await
            }
            Method::Delete => self.remove(request, &database).await,
            other => Err(AppError::MethodNotAllowed(other.clone())),
        }
    }

    async fn show(&self, database: &DatabaseName, id: &str) -> Result<ResponseEnvelope, AppError> {
        let document = self
            .documents
            .find(database.as_str(), id)
            .await?
            .ok_or(AppError::NotFound)?;
        json_envelope(StatusCode::OK, &document)
    }

    async fn list(
        &self,
        request: &RequestContext,
        database: &DatabaseName,
    ) -> Result<ResponseEnvelope, AppError> {
        let documents = if request.query().is_empty() {
            self.documents.find_all(database.as_str()).await?
        } else {
            let query = request
                .query()
                .canonical()
                .into_iter()
                .fold(DocumentQuery::any(), |query, (field, value)| {
                    query.where_field(field, query_value(value))
                });
            self.documents
                .find_matching(database.as_str(), query)
                .await?
        };

        let mut root = Map::new();
        root.insert(
            request.root_object_key().to_string(),
            serde_json::to_value(&documents).map_err(|err| AppError::unexpected(err.to_string()))?,
        );
        json_envelope(StatusCode::OK, &Value::Object(root))
    }

    async fn register(
        &self,
        request: &RequestContext,
        database: DatabaseName,
        body: &[u8],
    ) -> Result<ResponseEnvelope, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::validation("request body is empty"));
        }
        let payload: Value = serde_json::from_slice(body)
            .map_err(|err| AppError::validation(format!("malformed JSON body: {err}")))?;

        let generated = (*request.method() == Method::Post && request.identifier().is_none())
            .then(|| Uuid::new_v4().to_string());
        let fallback = request.identifier().or(generated.as_deref());

        let mut document = Document::from_json(payload, fallback)?;
        if let Some(id) = request.identifier() {
            document.id = id.to_string();
        }
        document.db = Some(database);

        let stored = self.documents.register(None, document).await?;
        let status = if *request.method() == Method::Post {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        json_envelope(status, &stored)
    }

    async fn remove(
        &self,
        request: &RequestContext,
        database: &DatabaseName,
    ) -> Result<ResponseEnvelope, AppError> {
        let id = request
            .identifier()
            .ok_or_else(|| AppError::validation("DELETE requires a document id"))?;
        let document = self
            .documents
            .find(database.as_str(), id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !self.documents.remove(None, &document).await? {
            return Err(AppError::NotFound);
        }
        json_envelope(StatusCode::OK, &document)
    }
}

/// Numbers and booleans in a query string compare as JSON scalars.
fn query_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => json!(raw),
    }
}

fn json_envelope<T: serde::Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<ResponseEnvelope, AppError> {
    let body = serde_json::to_vec(value).map_err(|err| AppError::unexpected(err.to_string()))?;
    Ok(ResponseEnvelope::new(
        status,
        Format::Json.content_type(),
        body,
    ))
}
