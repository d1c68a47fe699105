//! Document store gateway scoped by database name.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::{
    document::{DatabaseName, Document},
    error::DomainError,
};

use super::repos::{DocumentBackend, DocumentQuery, RepoError};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Database-scoped access to a [`DocumentBackend`].
///
/// A repository is cheap to build; handlers create one per request and may
/// select a default database that mutating calls fall back to.
#[derive(Clone)]
pub struct DocumentRepository {
    backend: Arc<dyn DocumentBackend>,
    database: Option<DatabaseName>,
}

impl DocumentRepository {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            database: None,
        }
    }

    pub fn with_default(backend: Arc<dyn DocumentBackend>, database: Option<DatabaseName>) -> Self {
        Self { backend, database }
    }

    pub fn select_database(&mut self, database: &str) -> Result<(), DomainError> {
        self.database = Some(DatabaseName::parse(database)?);
        Ok(())
    }

    pub fn selected_database(&self) -> Option<&DatabaseName> {
        self.database.as_ref()
    }

    pub async fn find(&self, database: &str, id: &str) -> Result<Option<Document>, DocumentError> {
        let database = DatabaseName::parse(database)?;
        self.find_in(&database, id).await
    }

    /// Look up `{db}-{id}`.
    pub async fn find_by_guid(&self, guid: &str) -> Result<Option<Document>, DocumentError> {
        let (database, id) = guid
            .split_once('-')
            .ok_or_else(|| DomainError::invalid_document(format!("malformed guid `{guid}`")))?;
        self.find(database, id).await
    }

    pub async fn find_all(&self, database: &str) -> Result<Vec<Document>, DocumentError> {
        let database = DatabaseName::parse(database)?;
        Ok(self
            .backend
            .fetch(&DocumentQuery::in_database(&database))
            .await?)
    }

    /// Documents of the selected database; fails without a selection.
    pub async fn find_all_selected(&self) -> Result<Vec<Document>, DocumentError> {
        let database = self
            .database
            .as_ref()
            .ok_or(DomainError::NoDatabaseSelected)?;
        Ok(self
            .backend
            .fetch(&DocumentQuery::in_database(database))
            .await?)
    }

    pub async fn find_all_ignore_database(&self) -> Result<Vec<Document>, DocumentError> {
        Ok(self.backend.fetch(&DocumentQuery::any()).await?)
    }

    /// Documents of `database` that also satisfy `query`.
    pub async fn find_matching(
        &self,
        database: &str,
        query: DocumentQuery,
    ) -> Result<Vec<Document>, DocumentError> {
        let database = DatabaseName::parse(database)?;
        let scoped = query.predicates().iter().fold(
            DocumentQuery::in_database(&database),
            |scoped, predicate| scoped.where_eq(predicate.field.clone(), predicate.value.clone()),
        );
        let scoped = match query.max_results() {
            Some(limit) => scoped.limit(limit),
            None => scoped,
        };
        Ok(self.backend.fetch(&scoped).await?)
    }

    pub async fn count(&self, database: &str) -> Result<u64, DocumentError> {
        let database = DatabaseName::parse(database)?;
        Ok(self
            .backend
            .count(&DocumentQuery::in_database(&database))
            .await?)
    }

    /// Upsert a document.
    ///
    /// The database comes from the document itself, then `database`, then the
    /// selected default. A new document whose `(db, id)` already exists is
    /// merged into the stored one instead of creating a duplicate.
    #[instrument(skip_all, fields(id = %document.id))]
    pub async fn register(
        &self,
        database: Option<&str>,
        mut document: Document,
    ) -> Result<Document, DocumentError> {
        if document.id.is_empty() {
            return Err(DomainError::invalid_document("missing document id").into());
        }

        let database = self.resolve_database(document.db.as_ref(), database)?;
        document.db = Some(database.clone());

        let document = if document.is_new() {
            match self.find_in(&database, &document.id).await? {
                Some(existing) => {
                    debug!(guid = ?existing.guid(), "merging into existing document");
                    existing.merge_from(document)
                }
                None => document,
            }
        } else {
            document
        };

        Ok(self.backend.upsert(&document).await?)
    }

    /// Remove a document; returns whether it existed.
    #[instrument(skip_all, fields(id = %document.id))]
    pub async fn remove(
        &self,
        database: Option<&str>,
        document: &Document,
    ) -> Result<bool, DocumentError> {
        let database = self.resolve_database(document.db.as_ref(), database)?;
        Ok(self.backend.delete(&database, &document.id).await?)
    }

    pub async fn remove_all(&self, database: Option<&str>) -> Result<u64, DocumentError> {
        let database = self.resolve_database(None, database)?;
        Ok(self
            .backend
            .delete_matching(&DocumentQuery::in_database(&database))
            .await?)
    }

    async fn find_in(
        &self,
        database: &DatabaseName,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        let query = DocumentQuery::in_database(database)
            .where_field("id", id)
            .limit(1);
        Ok(self.backend.fetch(&query).await?.into_iter().next())
    }

    fn resolve_database(
        &self,
        own: Option<&DatabaseName>,
        requested: Option<&str>,
    ) -> Result<DatabaseName, DomainError> {
        if let Some(own) = own {
            return Ok(own.clone());
        }
        if let Some(requested) = requested {
            return DatabaseName::parse(requested);
        }
        self.database
            .clone()
            .ok_or(DomainError::NoDatabaseSelected)
    }
}
