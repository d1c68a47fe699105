use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        dispatcher::RestDispatcher,
        error::{HttpError, codes},
    },
    domain::request::Method,
    infra::db::PostgresDocuments,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

/// Largest request body handed to the dispatcher.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RestDispatcher>,
    /// Present when documents live in Postgres.
    pub database: Option<PostgresDocuments>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(dispatch)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.database.as_ref() {
        Some(database) => db_health_response(database.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let method = Method::from(&parts.method);
    let target = parts
        .uri
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return HttpError::from_error(
                "infra::http::rest::dispatch",
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::BAD_REQUEST,
                "Request body could not be read",
                &err,
            )
            .into_response();
        }
    };

    match state.dispatcher.dispatch(method, &target, &body).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}
