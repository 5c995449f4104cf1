use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use super::{
    CollectionPath, Document, DocumentPath, DocumentStore, Fields, Query, ReadVersion,
    StoreError, Write, WriteBatch,
};
use crate::core::time::now_utc;

const COLUMNS: &str = "path, data, version, created_at, updated_at";

#[derive(Debug, FromRow)]
struct DocumentRow {
    path: String,
    data: Json<Fields>,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: DocumentPath::parse(&row.path)?,
            data: row.data.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Documents stored one row per path in the `documents` table.
#[derive(Clone)]
pub(crate) struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn child_prefixes(&self, prefix: &str, depth: usize) -> Result<Vec<String>, StoreError> {
        let depth = i32::try_from(depth).map_err(|_| StoreError::InvalidPath(prefix.to_string()))?;
        let prefixes = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT array_to_string((string_to_array(path, '/'))[1:$2], '/') AS child \
             FROM documents \
             WHERE starts_with(path, $1 || '/') \
             ORDER BY child",
        )
        .bind(prefix)
        .bind(depth)
        .fetch_all(&self.pool)
        .await?;
        Ok(prefixes)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {COLUMNS} FROM documents WHERE path = $1"
        ))
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Document::try_from).transpose()
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM documents WHERE collection_path = "
        ));
        builder.push_bind(collection.as_str());

        if !query.filters().is_empty() {
            builder.push(" AND data @> ");
            builder.push_bind(Json(query.filters().clone()));
        }

        builder.push(" ORDER BY path");

        if let Some(limit) = query.max_results() {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build_query_as::<DocumentRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn list_document_paths(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<DocumentPath>, StoreError> {
        self.child_prefixes(collection.as_str(), collection.depth() + 1)
            .await?
            .iter()
            .map(|path| DocumentPath::parse(path))
            .collect()
    }

    async fn list_collections(
        &self,
        document: &DocumentPath,
    ) -> Result<Vec<CollectionPath>, StoreError> {
        self.child_prefixes(document.as_str(), document.depth() + 1)
            .await?
            .iter()
            .map(|path| CollectionPath::parse(path))
            .collect()
    }

    async fn commit_checked(
        &self,
        reads: &[ReadVersion],
        batch: WriteBatch,
    ) -> Result<(), StoreError> {
        batch.check_size()?;
        let mut tx = self.pool.begin().await?;

        for read in reads {
            let current = sqlx::query_scalar::<_, i64>(
                "SELECT version FROM documents WHERE path = $1 FOR UPDATE",
            )
            .bind(read.path.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            if current != read.version {
                return Err(StoreError::Conflict(read.path.to_string()));
            }
        }

        let version = sqlx::query_scalar::<_, i64>("SELECT nextval('document_versions')")
            .fetch_one(&mut *tx)
            .await?;
        let now = now_utc();

        for write in batch.into_writes() {
            match write {
                Write::Set { path, data, merge } => {
                    let conflict_data = if merge {
                        "documents.data || EXCLUDED.data"
                    } else {
                        "EXCLUDED.data"
                    };
                    sqlx::query(&format!(
                        "INSERT INTO documents \
                         (path, collection_path, doc_id, data, version, created_at, updated_at) \
                         VALUES ($1, $2, $3, $4, $5, $6, $6) \
                         ON CONFLICT (path) DO UPDATE SET data = {conflict_data}, \
                         version = EXCLUDED.version, updated_at = EXCLUDED.updated_at"
                    ))
                    .bind(path.as_str())
                    .bind(path.parent().as_str())
                    .bind(path.id())
                    .bind(Json(data))
                    .bind(version)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                Write::Update { path, data } => {
                    let result = sqlx::query(
                        "UPDATE documents SET data = data || $2, version = $3, updated_at = $4 \
                         WHERE path = $1",
                    )
                    .bind(path.as_str())
                    .bind(Json(data))
                    .bind(version)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(StoreError::NotFound(path.to_string()));
                    }
                }
                Write::Delete { path } => {
                    sqlx::query("DELETE FROM documents WHERE path = $1")
                        .bind(path.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
