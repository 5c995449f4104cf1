use crate::db::models::TeacherNotification;
use crate::repositories::paths;
use crate::store::{encode, DocumentStore, StoreError, WriteBatch};

pub(crate) async fn list(
    store: &dyn DocumentStore,
    uid: &str,
) -> Result<Vec<TeacherNotification>, StoreError> {
    let mut notifications: Vec<TeacherNotification> = store
        .list(&paths::notifications(uid)?)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect::<Result<_, _>>()?;
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(notifications)
}

pub(crate) async fn exists(
    store: &dyn DocumentStore,
    uid: &str,
    notification_id: &str,
) -> Result<bool, StoreError> {
    Ok(store.get(&paths::notification(uid, notification_id)?).await?.is_some())
}

pub(crate) fn put(
    batch: &mut WriteBatch,
    teacher_uid: &str,
    notification: &TeacherNotification,
) -> Result<(), StoreError> {
    batch.set(paths::notification(teacher_uid, &notification.id)?, encode(notification)?);
    Ok(())
}

pub(crate) async fn delete(
    store: &dyn DocumentStore,
    uid: &str,
    notification_id: &str,
) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    batch.delete(paths::notification(uid, notification_id)?);
    store.commit(batch).await
}
