use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{
    error::DomainError,
    request::{AccessMethod, Format, Method},
};

use crate::infra::error::InfraError;

use super::{access::AccessError, documents::DocumentError, repos::RepoError};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub code: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn error_response(
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
) -> Response {
    let body = ErrorBody {
        error: ErrorMessage {
            code,
            message,
            hint,
        },
    };
    (status, Json(body)).into_response()
}

/// Transport-level failure that never reached the dispatcher.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            code,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status, self.code, self.public_message, None);
        self.report.attach(&mut response);
        response
    }
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNSUPPORTED_RESOURCE: &str = "unsupported_resource";
    pub const NOT_ACCEPTABLE: &str = "not_acceptable";
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const INVALID_DATABASE: &str = "invalid_database";
    pub const NO_DATABASE: &str = "no_database_selected";
    pub const INVALID_DOCUMENT: &str = "invalid_document";
    pub const CONFIGURATION: &str = "configuration_error";
    pub const REPO: &str = "repo_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{access} access to `{path}` denied")]
    Forbidden { path: String, access: AccessMethod },
    #[error("resource not found")]
    NotFound,
    #[error("resource type `{0}` is not served by this endpoint")]
    UnsupportedResource(String),
    #[error("format `{0}` cannot be rendered")]
    NotAcceptable(Format),
    #[error("method `{0}` is not supported for this resource")]
    MethodNotAllowed(Method),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<DocumentError> for AppError {
    fn from(error: DocumentError) -> Self {
        match error {
            DocumentError::Domain(err) => Self::Domain(err),
            DocumentError::Repo(err) => Self::Repo(err),
        }
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::UnsupportedResource(_) => StatusCode::NOT_FOUND,
            AppError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Repo(RepoError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            AppError::Repo(_) | AppError::Infra(InfraError::Database { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Access(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Forbidden { .. } => codes::FORBIDDEN,
            AppError::NotFound => codes::NOT_FOUND,
            AppError::UnsupportedResource(_) => codes::UNSUPPORTED_RESOURCE,
            AppError::NotAcceptable(_) => codes::NOT_ACCEPTABLE,
            AppError::MethodNotAllowed(_) => codes::METHOD_NOT_ALLOWED,
            AppError::Domain(DomainError::InvalidDatabaseName { .. }) => codes::INVALID_DATABASE,
            AppError::Domain(DomainError::NoDatabaseSelected) => codes::NO_DATABASE,
            AppError::Domain(DomainError::InvalidDocument { .. }) => codes::INVALID_DOCUMENT,
            AppError::Validation(_) | AppError::Repo(RepoError::InvalidInput { .. }) => {
                codes::BAD_REQUEST
            }
            AppError::Repo(RepoError::Timeout) => codes::DB_TIMEOUT,
            AppError::Repo(_) => codes::REPO,
            AppError::Infra(InfraError::Database { .. }) => codes::REPO,
            AppError::Infra(_) => codes::INTERNAL,
            AppError::Access(_) => codes::CONFIGURATION,
            AppError::Unexpected(_) => codes::INTERNAL,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Forbidden { .. } => "Access denied",
            AppError::NotFound => "Resource not found",
            AppError::UnsupportedResource(_) => "Unknown resource type",
            AppError::NotAcceptable(_) => "Requested format is not available",
            AppError::MethodNotAllowed(_) => "Method not allowed",
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Repo(RepoError::InvalidInput { .. }) => "Request could not be processed",
            AppError::Repo(_) | AppError::Infra(InfraError::Database { .. }) => {
                "Service temporarily unavailable"
            }
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Access(_) => "Service misconfigured",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }

    /// Caller-facing detail; server-side faults stay in the report only.
    fn hint(&self) -> Option<String> {
        if self.status_code().is_client_error() {
            Some(self.to_string())
        } else {
            None
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = error_response(status, self.code(), self.presentation_message(), self.hint());
        report.attach(&mut response);
        response
    }
}
