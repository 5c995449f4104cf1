use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{
    CollectionPath, Document, DocumentPath, DocumentStore, Fields, Query, ReadVersion,
    StoreError, Write, WriteBatch,
};
use crate::core::time::now_utc;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: Fields,
    version: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

/// Process-local store used by tests and `STORE_BACKEND=memory` deployments.
#[derive(Default)]
pub(crate) struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, StoredDocument>>,
    sequence: AtomicI64,
    commits: AtomicUsize,
}

impl MemoryDocumentStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of batches applied so far, empty ones included.
    #[cfg(test)]
    pub(crate) fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    fn to_document(path: &str, stored: &StoredDocument) -> Result<Document, StoreError> {
        Ok(Document {
            path: DocumentPath::parse(path)?,
            data: stored.data.clone(),
            version: stored.version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    /// Distinct `depth`-segment prefixes of every stored path under `prefix/`.
    async fn child_prefixes(&self, prefix: &str, depth: usize) -> Vec<String> {
        let documents = self.documents.read().await;
        let lower = format!("{prefix}/");
        let mut found = BTreeSet::new();
        for key in documents.range(lower.clone()..).map(|(key, _)| key) {
            if !key.starts_with(&lower) {
                break;
            }
            let truncated: Vec<&str> = key.split('/').take(depth).collect();
            if truncated.len() == depth {
                found.insert(truncated.join("/"));
            }
        }
        found.into_iter().collect()
    }
}

fn apply_write(
    current: Option<StoredDocument>,
    write: Write,
    version: i64,
    now: OffsetDateTime,
) -> Result<Option<StoredDocument>, StoreError> {
    match write {
        Write::Set { data, merge, .. } => {
            let created_at = current.as_ref().map(|doc| doc.created_at).unwrap_or(now);
            let data = match (merge, current) {
                (true, Some(mut existing)) => {
                    existing.data.extend(data);
                    existing.data
                }
                _ => data,
            };
            Ok(Some(StoredDocument { data, version, created_at, updated_at: now }))
        }
        Write::Update { path, data } => {
            let Some(mut existing) = current else {
                return Err(StoreError::NotFound(path.to_string()));
            };
            existing.data.extend(data);
            existing.version = version;
            existing.updated_at = now;
            Ok(Some(existing))
        }
        Write::Delete { .. } => Ok(None),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(path.as_str())
            .map(|stored| Self::to_document(path.as_str(), stored))
            .transpose()
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        let prefix = format!("{}/", collection.as_str());
        let depth = collection.depth() + 1;
        let limit = query.max_results().unwrap_or(usize::MAX);

        let mut results = Vec::new();
        for (key, stored) in documents.range(prefix.clone()..) {
            if results.len() >= limit || !key.starts_with(&prefix) {
                break;
            }
            if key.split('/').count() == depth && query.matches(&stored.data) {
                results.push(Self::to_document(key, stored)?);
            }
        }
        Ok(results)
    }

    async fn list_document_paths(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<DocumentPath>, StoreError> {
        self.child_prefixes(collection.as_str(), collection.depth() + 1)
            .await
            .iter()
            .map(|path| DocumentPath::parse(path))
            .collect()
    }

    async fn list_collections(
        &self,
        document: &DocumentPath,
    ) -> Result<Vec<CollectionPath>, StoreError> {
        self.child_prefixes(document.as_str(), document.depth() + 1)
            .await
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
        let mut documents = self.documents.write().await;

        for read in reads {
            let current = documents.get(read.path.as_str()).map(|doc| doc.version);
            if current != read.version {
                return Err(StoreError::Conflict(read.path.to_string()));
            }
        }

        let version = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let now = now_utc();

        // Stage every write first so a failing update leaves the store untouched.
        let mut staged: BTreeMap<String, Option<StoredDocument>> = BTreeMap::new();
        for write in batch.into_writes() {
            let key = write.path().as_str().to_string();
            let current = match staged.get(&key) {
                Some(entry) => entry.clone(),
                None => documents.get(&key).cloned(),
            };
            let next = apply_write(current, write, version, now)?;
            staged.insert(key, next);
        }

        for (key, entry) in staged {
            match entry {
                Some(document) => {
                    documents.insert(key, document);
                }
                None => {
                    documents.remove(&key);
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn classroom(id: &str) -> DocumentPath {
        CollectionPath::root("classrooms").unwrap().doc(id).unwrap()
    }

    #[tokio::test]
    async fn set_merge_update_and_delete() {
        let store = MemoryDocumentStore::new();
        let path = classroom("c1");

        let mut batch = WriteBatch::new();
        batch.set(path.clone(), fields(json!({ "a": 1, "b": 2 })));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.merge(path.clone(), fields(json!({ "b": 3, "c": 4 })));
        store.commit(batch).await.unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(Value::Object(doc.data), json!({ "a": 1, "b": 3, "c": 4 }));

        let mut batch = WriteBatch::new();
        batch.set(path.clone(), fields(json!({ "z": true })));
        store.commit(batch).await.unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(Value::Object(doc.data), json!({ "z": true }));

        let mut batch = WriteBatch::new();
        batch.delete(path.clone());
        batch.delete(classroom("never-existed"));
        store.commit(batch).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_none());
        assert_eq!(store.commit_count(), 4);
    }

    #[tokio::test]
    async fn update_of_missing_document_fails_whole_batch() {
        let store = MemoryDocumentStore::new();

        let mut batch = WriteBatch::new();
        batch.set(classroom("c1"), fields(json!({ "a": 1 })));
        batch.update(classroom("missing"), fields(json!({ "a": 2 })));
        let err = store.commit(batch).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.get(&classroom("c1")).await.unwrap().is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn stale_read_is_rejected() {
        let store = MemoryDocumentStore::new();
        let path = classroom("c1");

        let mut batch = WriteBatch::new();
        batch.set(path.clone(), fields(json!({ "a": 1 })));
        store.commit(batch).await.unwrap();
        let observed = store.get(&path).await.unwrap().unwrap().version;

        let mut batch = WriteBatch::new();
        batch.update(path.clone(), fields(json!({ "a": 2 })));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.update(path.clone(), fields(json!({ "a": 3 })));
        let reads = [ReadVersion { path: path.clone(), version: Some(observed) }];
        let err = store.commit_checked(&reads, batch).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["a"], json!(2));
    }

    #[tokio::test]
    async fn query_stays_within_one_collection_level() {
        let store = MemoryDocumentStore::new();
        let schedules = classroom("c1").collection("schedules").unwrap();

        let mut batch = WriteBatch::new();
        batch.set(classroom("c1"), fields(json!({ "activeScheduleId": "v1" })));
        batch.set(schedules.doc("v1").unwrap(), fields(json!({ "uploadedBy": "t1" })));
        batch.set(schedules.doc("v2").unwrap(), fields(json!({ "uploadedBy": "t2" })));
        batch.set(classroom("c10"), fields(json!({})));
        store.commit(batch).await.unwrap();

        let classrooms = CollectionPath::root("classrooms").unwrap();
        let top = store.list(&classrooms).await.unwrap();
        assert_eq!(top.iter().map(|doc| doc.id()).collect::<Vec<_>>(), vec!["c1", "c10"]);

        let filtered =
            store.query(&schedules, &Query::new().where_eq("uploadedBy", "t2")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id(), "v2");

        let limited = store.query(&schedules, &Query::new().limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn lists_parent_only_documents_and_subcollections() {
        let store = MemoryDocumentStore::new();
        let invitations = CollectionPath::root("users")
            .unwrap()
            .doc("ghost")
            .unwrap()
            .collection("invitations")
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.set(invitations.doc("i1").unwrap(), fields(json!({})));
        store.commit(batch).await.unwrap();

        let users = CollectionPath::root("users").unwrap();
        assert!(store.list(&users).await.unwrap().is_empty());

        let ids = store.list_document_paths(&users).await.unwrap();
        assert_eq!(ids, vec![users.doc("ghost").unwrap()]);

        let collections = store.list_collections(&users.doc("ghost").unwrap()).await.unwrap();
        assert_eq!(collections, vec![invitations]);
    }
}
