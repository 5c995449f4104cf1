use std::future::Future;

use super::{Document, DocumentPath, DocumentStore, Fields, ReadVersion, StoreError, WriteBatch};

/// Read-then-write unit of work. Reads record the version they observed; the buffered writes
/// only apply if none of those documents changed in the meantime.
pub(crate) struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    reads: Vec<ReadVersion>,
    batch: WriteBatch,
}

impl<'a> Transaction<'a> {
    fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store, reads: Vec::new(), batch: WriteBatch::new() }
    }

    pub(crate) async fn get(
        &mut self,
        path: &DocumentPath,
    ) -> Result<Option<Document>, StoreError> {
        let document = self.store.get(path).await?;
        let version = document.as_ref().map(|document| document.version);
        self.reads.retain(|read| &read.path != path);
        self.reads.push(ReadVersion { path: path.clone(), version });
        Ok(document)
    }

    pub(crate) fn set(&mut self, path: DocumentPath, data: Fields) {
        self.batch.set(path, data);
    }

    pub(crate) fn update(&mut self, path: DocumentPath, data: Fields) {
        self.batch.update(path, data);
    }

    pub(crate) fn merge(&mut self, path: DocumentPath, data: Fields) {
        self.batch.merge(path, data);
    }

    pub(crate) fn delete(&mut self, path: DocumentPath) {
        self.batch.delete(path);
    }
}

/// Runs `body` inside an optimistic transaction, retrying on [`StoreError::Conflict`] up to
/// `max_attempts` times. `body` hands the transaction back together with its result.
pub(crate) async fn run_transaction<'a, T, F, Fut>(
    store: &'a dyn DocumentStore,
    max_attempts: u32,
    mut body: F,
) -> Result<T, StoreError>
where
    F: FnMut(Transaction<'a>) -> Fut,
    Fut: Future<Output = Result<(Transaction<'a>, T), StoreError>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let (transaction, value) = body(Transaction::new(store)).await?;
        let Transaction { reads, batch, .. } = transaction;

        if batch.is_empty() {
            return Ok(value);
        }

        match store.commit_checked(&reads, batch).await {
            Ok(()) => return Ok(value),
            Err(StoreError::Conflict(path)) if attempt < attempts => {
                metrics::counter!("store_transaction_retries_total").increment(1);
                tracing::debug!(attempt, path = %path, "Transaction conflicted; retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use crate::store::CollectionPath;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn counter_path() -> DocumentPath {
        CollectionPath::root("counters").unwrap().doc("visits").unwrap()
    }

    async fn seeded_store() -> Arc<dyn DocumentStore> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let mut batch = WriteBatch::new();
        batch.set(counter_path(), fields(json!({ "count": 1 })));
        store.commit(batch).await.unwrap();
        store
    }

    async fn increment(
        mut tx: Transaction<'_>,
        interfere: Option<Arc<dyn DocumentStore>>,
    ) -> Result<(Transaction, i64), StoreError> {
        let path = counter_path();
        let current = tx.get(&path).await?.and_then(|doc| doc.data["count"].as_i64()).unwrap_or(0);

        if let Some(store) = interfere {
            let mut batch = WriteBatch::new();
            batch.update(path.clone(), fields(json!({ "count": 100 })));
            store.commit(batch).await?;
        }

        tx.update(path, fields(json!({ "count": current + 1 })));
        Ok((tx, current + 1))
    }

    #[tokio::test]
    async fn retries_after_concurrent_write() {
        let store = seeded_store().await;
        let calls = Arc::new(AtomicU32::new(0));

        let result = run_transaction(store.as_ref(), 5, |tx| {
            let calls = calls.clone();
            let store = store.clone();
            async move {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                increment(tx, first.then_some(store)).await
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result, 101);
        let stored = store.get(&counter_path()).await.unwrap().unwrap();
        assert_eq!(stored.data["count"], json!(101));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = seeded_store().await;

        let result = run_transaction(store.as_ref(), 2, |tx| {
            let store = store.clone();
            async move { increment(tx, Some(store)).await }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn read_only_transaction_does_not_commit() {
        let store = MemoryDocumentStore::new();

        let found = run_transaction(&store, 1, |mut tx| async move {
            let found = tx.get(&counter_path()).await?.is_some();
            Ok((tx, found))
        })
        .await
        .unwrap();

        assert!(!found);
    }
}
