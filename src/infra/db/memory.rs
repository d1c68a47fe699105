//! Process-local document backend used when no database URL is configured
//! and in tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::{DocumentBackend, DocumentQuery, RepoError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::document::{DatabaseName, Document};

const SOURCE: &str = "infra::db::memory";

#[derive(Default)]
struct Inner {
    documents: BTreeMap<(String, String), Document>,
    last_uid: i64,
}

#[derive(Default)]
pub struct InMemoryDocuments {
    inner: RwLock<Inner>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }
}

fn storage_key(document: &Document) -> Result<(String, String), RepoError> {
    let db = document.db.as_ref().ok_or_else(|| RepoError::InvalidInput {
        message: format!("document `{}` has no database", document.id),
    })?;
    Ok((db.as_str().to_string(), document.id.clone()))
}

#[async_trait]
impl DocumentBackend for InMemoryDocuments {
    async fn fetch(&self, query: &DocumentQuery) -> Result<Vec<Document>, RepoError> {
        let inner = rw_read(&self.inner, SOURCE, "fetch");
        let matching = inner
            .documents
            .values()
            .filter(|document| query.matches(document))
            .cloned();
        Ok(match query.max_results() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64, RepoError> {
        let inner = rw_read(&self.inner, SOURCE, "count");
        let count = inner
            .documents
            .values()
            .filter(|document| query.matches(document))
            .count();
        Ok(count as u64)
    }

    async fn upsert(&self, document: &Document) -> Result<Document, RepoError> {
        let key = storage_key(document)?;
        let mut inner = rw_write(&self.inner, SOURCE, "upsert");

        let uid = match inner.documents.get(&key).and_then(|existing| existing.uid) {
            Some(uid) => uid,
            None => {
                inner.last_uid += 1;
                inner.last_uid
            }
        };

        let mut stored = document.clone();
        stored.uid = Some(uid);
        inner.documents.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, database: &DatabaseName, id: &str) -> Result<bool, RepoError> {
        let mut inner = rw_write(&self.inner, SOURCE, "delete");
        Ok(inner
            .documents
            .remove(&(database.as_str().to_string(), id.to_string()))
            .is_some())
    }

    async fn delete_matching(&self, query: &DocumentQuery) -> Result<u64, RepoError> {
        let mut inner = rw_write(&self.inner, SOURCE, "delete_matching");
        let before = inner.documents.len();
        inner
            .documents
            .retain(|_, document| !query.matches(document));
        Ok((before - inner.documents.len()) as u64)
    }
}
