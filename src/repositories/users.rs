use crate::db::models::UserProfile;
use crate::db::types::UserRole;
use crate::repositories::paths;
use crate::store::{encode, DocumentStore, Query, StoreError, WriteBatch};

pub(crate) async fn find(
    store: &dyn DocumentStore,
    uid: &str,
) -> Result<Option<UserProfile>, StoreError> {
    match store.get(&paths::user(uid)?).await? {
        Some(document) => document.decode().map(Some),
        None => Ok(None),
    }
}

pub(crate) async fn list(
    store: &dyn DocumentStore,
    query: &Query,
) -> Result<Vec<UserProfile>, StoreError> {
    store.query(&paths::users()?, query).await?.iter().map(|document| document.decode()).collect()
}

pub(crate) async fn list_by_role(
    store: &dyn DocumentStore,
    role: UserRole,
) -> Result<Vec<UserProfile>, StoreError> {
    list(store, &Query::new().where_eq("role", role.as_str())).await
}

/// Teachers with at least one assignment in the classroom.
pub(crate) async fn teachers_of(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> Result<Vec<UserProfile>, StoreError> {
    let teachers = list_by_role(store, UserRole::Teacher).await?;
    Ok(teachers.into_iter().filter(|teacher| teacher.teaches(classroom_id)).collect())
}

/// Students whose school, grade and class resolve to the classroom.
pub(crate) async fn students_of(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> Result<Vec<UserProfile>, StoreError> {
    let students = list_by_role(store, UserRole::Student).await?;
    Ok(students
        .into_iter()
        .filter(|student| student.classroom_id().as_deref() == Some(classroom_id))
        .collect())
}

pub(crate) fn put(batch: &mut WriteBatch, profile: &UserProfile) -> Result<(), StoreError> {
    batch.set(paths::user(&profile.uid)?, encode(profile)?);
    Ok(())
}

pub(crate) async fn save(
    store: &dyn DocumentStore,
    profile: &UserProfile,
) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    put(&mut batch, profile)?;
    store.commit(batch).await
}
