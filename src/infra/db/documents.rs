use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder, types::Json};

use crate::application::repos::{
    DocumentBackend, DocumentField, DocumentQuery, Predicate, RepoError,
};
use crate::domain::document::{DatabaseName, Document};

use super::{PostgresDocuments, map_sqlx_error};

const DOCUMENT_COLUMNS: &str = "uid, pid, db, id, data";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    uid: i64,
    pid: Option<i64>,
    db: String,
    id: String,
    data: Json<Map<String, Value>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepoError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let db = DatabaseName::parse(&row.db).map_err(|err| RepoError::InvalidInput {
            message: err.to_string(),
        })?;
        Ok(Document {
            uid: Some(row.uid),
            pid: row.pid,
            id: row.id,
            db: Some(db),
            data: row.data.0,
        })
    }
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    match &predicate.field {
        DocumentField::Db => {
            qb.push(" AND db = ");
            qb.push_bind(scalar_text(&predicate.value));
        }
        DocumentField::Id => {
            qb.push(" AND id = ");
            qb.push_bind(scalar_text(&predicate.value));
        }
        DocumentField::Pid => match predicate.value.as_i64() {
            Some(pid) => {
                qb.push(" AND pid = ");
                qb.push_bind(pid);
            }
            None => {
                qb.push(" AND FALSE");
            }
        },
        DocumentField::Data(key) => {
            qb.push(" AND data -> ");
            qb.push_bind(key.clone());
            qb.push(" = ");
            qb.push_bind(Json(predicate.value.clone()));
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &DocumentQuery) {
    qb.push(" WHERE TRUE");
    for predicate in query.predicates() {
        push_predicate(qb, predicate);
    }
}

/// Text form used for `db` and `id` comparisons; numbers compare by their
/// decimal rendering.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn convert_count(value: i64) -> Result<u64, RepoError> {
    value
        .try_into()
        .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
}

#[async_trait]
impl DocumentBackend for PostgresDocuments {
    async fn fetch(&self, query: &DocumentQuery) -> Result<Vec<Document>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(DOCUMENT_COLUMNS);
        qb.push(" FROM documents");
        push_filters(&mut qb, query);
        qb.push(" ORDER BY db, id");
        if let Some(limit) = query.max_results() {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_filters(&mut qb, query);

        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_count(total)
    }

    async fn upsert(&self, document: &Document) -> Result<Document, RepoError> {
        let db = document.db.as_ref().ok_or_else(|| RepoError::InvalidInput {
            message: format!("document `{}` has no database", document.id),
        })?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (db, id, pid, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (db, id) DO UPDATE
            SET pid = EXCLUDED.pid,
                data = EXCLUDED.data,
                updated_at = now()
            RETURNING uid, pid, db, id, data
            "#,
        )
        .bind(db.as_str())
        .bind(&document.id)
        .bind(document.pid)
        .bind(Json(&document.data))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Document::try_from(row)
    }

    async fn delete(&self, database: &DatabaseName, id: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM documents WHERE db = $1 AND id = $2")
            .bind(database.as_str())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_matching(&self, query: &DocumentQuery) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM documents");
        push_filters(&mut qb, query);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
