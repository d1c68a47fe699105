//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::document::{DatabaseName, Document};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Field a query predicate can address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentField {
    Db,
    Id,
    Pid,
    /// A top-level key inside the document's `data`.
    Data(String),
}

impl DocumentField {
    pub fn parse(name: &str) -> Self {
        match name {
            "db" => Self::Db,
            "id" => Self::Id,
            "pid" => Self::Pid,
            other => Self::Data(other.to_string()),
        }
    }
}

/// Equality predicate `field == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: DocumentField,
    pub value: Value,
}

impl Predicate {
    pub fn matches(&self, document: &Document) -> bool {
        match &self.field {
            DocumentField::Db => document
                .db
                .as_ref()
                .is_some_and(|db| self.value.as_str() == Some(db.as_str())),
            DocumentField::Id => match &self.value {
                Value::String(id) => *id == document.id,
                Value::Number(id) => id.to_string() == document.id,
                _ => false,
            },
            DocumentField::Pid => document
                .pid
                .is_some_and(|pid| self.value.as_i64() == Some(pid)),
            DocumentField::Data(key) => document.data.get(key) == Some(&self.value),
        }
    }
}

/// Closed query builder: conjunction of equality predicates plus an optional
/// limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    predicates: Vec<Predicate>,
    limit: Option<usize>,
}

impl DocumentQuery {
    /// Every document regardless of database.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn in_database(database: &DatabaseName) -> Self {
        Self::default().where_eq(DocumentField::Db, Value::from(database.as_str()))
    }

    pub fn where_eq(mut self, field: DocumentField, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            field,
            value: value.into(),
        });
        self
    }

    /// Shorthand for `where_eq(DocumentField::parse(name), value)`.
    pub fn where_field(self, name: &str, value: impl Into<Value>) -> Self {
        self.where_eq(DocumentField::parse(name), value)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.matches(document))
    }
}

/// Persistence capability behind the document gateway.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Documents satisfying `query`, ordered by `(db, id)`.
    async fn fetch(&self, query: &DocumentQuery) -> Result<Vec<Document>, RepoError>;

    async fn count(&self, query: &DocumentQuery) -> Result<u64, RepoError>;

    /// Insert or replace the document stored under `(db, id)` and return the
    /// stored version. The document's `db` is always set by the caller.
    async fn upsert(&self, document: &Document) -> Result<Document, RepoError>;

    /// Returns whether a document was removed.
    async fn delete(&self, database: &DatabaseName, id: &str) -> Result<bool, RepoError>;

    async fn delete_matching(&self, query: &DocumentQuery) -> Result<u64, RepoError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document() -> Document {
        Document::new("7")
            .in_database(DatabaseName::parse("contacts").expect("valid"))
            .with_value("name", json!("Ada"))
    }

    #[test]
    fn field_names_map_to_columns_or_data() {
        assert_eq!(DocumentField::parse("id"), DocumentField::Id);
        assert_eq!(
            DocumentField::parse("name"),
            DocumentField::Data("name".into())
        );
    }

    #[test]
    fn predicates_are_conjunctive() {
        let db = DatabaseName::parse("contacts").expect("valid");
        let query = DocumentQuery::in_database(&db).where_field("name", "Ada");
        assert!(query.matches(&document()));

        let query = query.where_field("id", "8");
        assert!(!query.matches(&document()));
    }

    #[test]
    fn numeric_id_predicate_matches_string_id() {
        let query = DocumentQuery::any().where_field("id", 7);
        assert!(query.matches(&document()));
    }
}
