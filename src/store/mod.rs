//! Hierarchical document storage.
//!
//! Documents live at slash-separated paths (`collection/doc/collection/doc`) and carry a JSON
//! object body plus a monotonically increasing version. Writes are grouped into batches that
//! apply atomically; transactions add optimistic read-version checks on top of a batch.

pub(crate) mod memory;
mod path;
pub(crate) mod postgres;
mod transaction;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

pub(crate) use path::{CollectionPath, DocumentPath};
pub(crate) use transaction::{run_transaction, Transaction};

/// Upper bound on the number of writes a single batch may carry.
pub(crate) const MAX_BATCH_WRITES: usize = 500;

pub(crate) type Fields = Map<String, Value>;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("invalid document path: {0}")]
    InvalidPath(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document changed concurrently: {0}")]
    Conflict(String),
    #[error("batch of {size} writes exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("document body must be a JSON object")]
    NotAnObject,
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode document {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub(crate) path: DocumentPath,
    pub(crate) data: Fields,
    pub(crate) version: i64,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl Document {
    pub(crate) fn id(&self) -> &str {
        self.path.id()
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|source| StoreError::Decode { path: self.path.to_string(), source })
    }

    /// Decodes the body with the document id injected as an `id` field.
    pub(crate) fn decode_with_id<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id().to_string()));
        serde_json::from_value(Value::Object(data))
            .map_err(|source| StoreError::Decode { path: self.path.to_string(), source })
    }
}

/// Serializes a model into document fields. The `id` field, if any, is dropped because it is
/// carried by the document path.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value).map_err(StoreError::Encode)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        _ => Err(StoreError::NotAnObject),
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Write {
    /// Creates or replaces the document. With `merge`, top-level fields are merged into an
    /// existing body instead.
    Set { path: DocumentPath, data: Fields, merge: bool },
    /// Merges top-level fields into an existing document; fails the batch when it is missing.
    Update { path: DocumentPath, data: Fields },
    /// Removes the document if present. Subcollections are left alone.
    Delete { path: DocumentPath },
}

impl Write {
    pub(crate) fn path(&self) -> &DocumentPath {
        match self {
            Self::Set { path, .. } | Self::Update { path, .. } | Self::Delete { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, path: DocumentPath, data: Fields) -> &mut Self {
        self.writes.push(Write::Set { path, data, merge: false });
        self
    }

    pub(crate) fn merge(&mut self, path: DocumentPath, data: Fields) -> &mut Self {
        self.writes.push(Write::Set { path, data, merge: true });
        self
    }

    pub(crate) fn update(&mut self, path: DocumentPath, data: Fields) -> &mut Self {
        self.writes.push(Write::Update { path, data });
        self
    }

    pub(crate) fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.writes.push(Write::Delete { path });
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub(crate) fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub(crate) fn check_size(&self) -> Result<(), StoreError> {
        if self.writes.len() > MAX_BATCH_WRITES {
            return Err(StoreError::BatchTooLarge {
                size: self.writes.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        Ok(())
    }
}

/// Equality filters on top-level fields, optionally limited. Results come back ordered by path.
#[derive(Debug, Clone, Default)]
pub(crate) struct Query {
    filters: Fields,
    limit: Option<usize>,
}

impl Query {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(field.to_string(), value.into());
        self
    }

    pub(crate) fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn filters(&self) -> &Fields {
        &self.filters
    }

    pub(crate) fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub(crate) fn matches(&self, data: &Fields) -> bool {
        self.filters.iter().all(|(field, expected)| data.get(field) == Some(expected))
    }
}

/// Version observed by a transactional read; `None` means the document did not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReadVersion {
    pub(crate) path: DocumentPath,
    pub(crate) version: Option<i64>,
}

#[async_trait]
pub(crate) trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError>;

    /// Ids of every document in the collection, including ids that only exist as the parent of
    /// a subcollection.
    async fn list_document_paths(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<DocumentPath>, StoreError>;

    async fn list_collections(
        &self,
        document: &DocumentPath,
    ) -> Result<Vec<CollectionPath>, StoreError>;

    /// Applies the batch atomically after checking that every read still holds its observed
    /// version. A mismatch returns [`StoreError::Conflict`] and applies nothing.
    async fn commit_checked(
        &self,
        reads: &[ReadVersion],
        batch: WriteBatch,
    ) -> Result<(), StoreError>;

    async fn health(&self) -> Result<(), StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.commit_checked(&[], batch).await
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        self.query(collection, &Query::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        id: String,
        name: String,
    }

    #[test]
    fn encode_drops_id_and_decode_restores_it() {
        let sample = Sample { id: "abc".to_string(), name: "Room".to_string() };
        let fields = encode(&sample).unwrap();
        assert_eq!(Value::Object(fields.clone()), json!({ "name": "Room" }));

        let path = CollectionPath::root("samples").unwrap().doc("abc").unwrap();
        let now = OffsetDateTime::now_utc();
        let document =
            Document { path, data: fields, version: 1, created_at: now, updated_at: now };
        assert_eq!(document.decode_with_id::<Sample>().unwrap(), sample);
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert!(matches!(encode(&5), Err(StoreError::NotAnObject)));
    }

    #[test]
    fn batch_size_is_checked() {
        let users = CollectionPath::root("users").unwrap();
        let mut batch = WriteBatch::new();
        for index in 0..=MAX_BATCH_WRITES {
            batch.delete(users.doc(&format!("u{index}")).unwrap());
        }
        assert!(matches!(batch.check_size(), Err(StoreError::BatchTooLarge { size: 501, .. })));
    }

    #[test]
    fn query_matches_top_level_equality() {
        let query = Query::new().where_eq("status", "Upcoming").where_eq("session", 2);
        let hit = json!({ "status": "Upcoming", "session": 2, "subject": "Math" });
        let miss = json!({ "status": "Finished", "session": 2 });
        assert!(query.matches(hit.as_object().unwrap()));
        assert!(!query.matches(miss.as_object().unwrap()));
    }
}
