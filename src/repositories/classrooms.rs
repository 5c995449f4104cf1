use serde_json::{Map, Value};

use crate::db::models::Classroom;
use crate::repositories::paths;
use crate::store::{DocumentStore, Fields, StoreError, WriteBatch};

pub(crate) async fn find(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> Result<Option<Classroom>, StoreError> {
    match store.get(&paths::classroom(classroom_id)?).await? {
        Some(document) => document.decode().map(Some),
        None => Ok(None),
    }
}

/// Ids of every classroom, including ones that only exist as parents of subcollections.
pub(crate) async fn list_ids(store: &dyn DocumentStore) -> Result<Vec<String>, StoreError> {
    let documents = store.list_document_paths(&paths::classrooms()?).await?;
    Ok(documents.iter().map(|path| path.id().to_string()).collect())
}

/// Fields to merge into the classroom record to point it at `version_id`.
pub(crate) fn pointer_fields(version_id: &str) -> Fields {
    let mut fields = Map::new();
    fields.insert("activeScheduleId".to_string(), Value::String(version_id.to_string()));
    fields
}

/// Merges the active pointer into the classroom record, creating it when missing.
pub(crate) fn point_active(
    batch: &mut WriteBatch,
    classroom_id: &str,
    version_id: &str,
) -> Result<(), StoreError> {
    batch.merge(paths::classroom(classroom_id)?, pointer_fields(version_id));
    Ok(())
}
