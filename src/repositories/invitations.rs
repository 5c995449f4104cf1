use crate::db::models::Invitation;
use crate::repositories::paths;
use crate::store::{encode, DocumentStore, StoreError, WriteBatch};

pub(crate) async fn find(
    store: &dyn DocumentStore,
    uid: &str,
    invitation_id: &str,
) -> Result<Option<Invitation>, StoreError> {
    match store.get(&paths::invitation(uid, invitation_id)?).await? {
        Some(document) => document.decode_with_id().map(Some),
        None => Ok(None),
    }
}

pub(crate) async fn list(
    store: &dyn DocumentStore,
    uid: &str,
) -> Result<Vec<Invitation>, StoreError> {
    store
        .list(&paths::invitations(uid)?)
        .await?
        .iter()
        .map(|document| document.decode_with_id())
        .collect()
}

pub(crate) fn put(
    batch: &mut WriteBatch,
    recipient_uid: &str,
    invitation: &Invitation,
) -> Result<(), StoreError> {
    batch.set(paths::invitation(recipient_uid, &invitation.id)?, encode(invitation)?);
    Ok(())
}

pub(crate) async fn delete(
    store: &dyn DocumentStore,
    uid: &str,
    invitation_id: &str,
) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    batch.delete(paths::invitation(uid, invitation_id)?);
    store.commit(batch).await
}
