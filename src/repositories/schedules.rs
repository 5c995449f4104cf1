use crate::db::models::ClassroomSchedule;
use crate::repositories::paths;
use crate::store::{encode, DocumentStore, StoreError, WriteBatch};

pub(crate) async fn find(
    store: &dyn DocumentStore,
    classroom_id: &str,
    version_id: &str,
) -> Result<Option<ClassroomSchedule>, StoreError> {
    match store.get(&paths::schedule(classroom_id, version_id)?).await? {
        Some(document) => document.decode_with_id().map(Some),
        None => Ok(None),
    }
}

pub(crate) async fn list(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> Result<Vec<ClassroomSchedule>, StoreError> {
    store
        .list(&paths::schedules(classroom_id)?)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect()
}

pub(crate) fn put(
    batch: &mut WriteBatch,
    classroom_id: &str,
    version: &ClassroomSchedule,
) -> Result<(), StoreError> {
    batch.set(paths::schedule(classroom_id, &version.id)?, encode(version)?);
    Ok(())
}
