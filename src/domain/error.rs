use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid database name `{name}`: {reason}")]
    InvalidDatabaseName { name: String, reason: &'static str },
    #[error("neither the document nor the repository has a database selected")]
    NoDatabaseSelected,
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

impl DomainError {
    pub fn invalid_database_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidDatabaseName {
            name: name.into(),
            reason,
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}
