use crate::db::models::Explanation;
use crate::db::types::{CompletionStatus, ExplanationStatus};
use crate::repositories::paths;
use crate::store::{encode, DocumentStore, Query, StoreError, WriteBatch};

pub(crate) async fn find(
    store: &dyn DocumentStore,
    classroom_id: &str,
    explanation_id: &str,
) -> Result<Option<Explanation>, StoreError> {
    match store.get(&paths::explanation(classroom_id, explanation_id)?).await? {
        Some(document) => document.decode_with_id().map(Some),
        None => Ok(None),
    }
}

pub(crate) async fn list(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> Result<Vec<Explanation>, StoreError> {
    store
        .list(&paths::explanations(classroom_id)?)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect()
}

pub(crate) async fn list_with_status(
    store: &dyn DocumentStore,
    classroom_id: &str,
    status: ExplanationStatus,
) -> Result<Vec<Explanation>, StoreError> {
    let query = Query::new().where_eq("status", status.as_str());
    store
        .query(&paths::explanations(classroom_id)?, &query)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect()
}

pub(crate) async fn list_with_completion(
    store: &dyn DocumentStore,
    classroom_id: &str,
    completion: CompletionStatus,
) -> Result<Vec<Explanation>, StoreError> {
    let query = Query::new().where_eq("completionStatus", completion.as_str());
    store
        .query(&paths::explanations(classroom_id)?, &query)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect()
}

pub(crate) fn put(
    batch: &mut WriteBatch,
    classroom_id: &str,
    explanation: &Explanation,
) -> Result<(), StoreError> {
    batch.set(paths::explanation(classroom_id, &explanation.id)?, encode(explanation)?);
    Ok(())
}
