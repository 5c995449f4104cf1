//! Versioned classroom schedules with a single active pointer.
//!
//! Every classroom keeps its uploaded schedules under `classrooms/{id}/schedules` and points at
//! one of them through `activeScheduleId`. The pointer is either empty or names a version that
//! exists; every write path below keeps it that way.

use serde::Serialize;
use serde_json::Map;

use crate::core::time::now_utc;
use crate::db::models::{Classroom, ClassroomSchedule, ScheduleRow};
use crate::repositories::{self, classrooms, paths, schedules};
use crate::services::{ServiceError, ServiceResult};
use crate::store::{run_transaction, DocumentStore, StoreError, WriteBatch};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActiveSchedule {
    pub(crate) classroom_id: String,
    pub(crate) active_schedule_id: String,
    pub(crate) schedule: Option<ClassroomSchedule>,
}

fn require_rows(rows: &[ScheduleRow]) -> ServiceResult<()> {
    if rows.is_empty() {
        return Err(ServiceError::Validation("A schedule needs at least one row.".to_string()));
    }
    Ok(())
}

fn version_not_found(version_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("Schedule version {version_id} not found"))
}

/// Appends a version and makes it active. Both writes go out in one batch.
pub(crate) async fn upload_new_version(
    store: &dyn DocumentStore,
    classroom_id: &str,
    rows: Vec<ScheduleRow>,
    uploader_name: &str,
) -> ServiceResult<ClassroomSchedule> {
    require_rows(&rows)?;

    let version = ClassroomSchedule {
        id: repositories::new_id(),
        schedule: rows,
        uploaded_by: uploader_name.to_string(),
        uploaded_at: now_utc(),
    };

    let mut batch = WriteBatch::new();
    schedules::put(&mut batch, classroom_id, &version)?;
    classrooms::point_active(&mut batch, classroom_id, &version.id)?;
    store.commit(batch).await?;

    tracing::info!(
        classroom_id,
        version_id = %version.id,
        rows = version.schedule.len(),
        "Uploaded schedule version"
    );
    Ok(version)
}

/// Repoints the classroom at an existing version, creating the classroom record if needed.
/// The version is read inside the transaction, so a concurrent delete of it aborts the repoint.
pub(crate) async fn set_active_version(
    store: &dyn DocumentStore,
    max_attempts: u32,
    classroom_id: &str,
    version_id: &str,
) -> ServiceResult<()> {
    let classroom_path = paths::classroom(classroom_id)?;
    let version_path = paths::schedule(classroom_id, version_id)?;

    let found = run_transaction(store, max_attempts, |mut tx| {
        let classroom_path = classroom_path.clone();
        let version_path = version_path.clone();
        async move {
            if tx.get(&version_path).await?.is_none() {
                return Ok((tx, false));
            }
            tx.merge(classroom_path, classrooms::pointer_fields(version_id));
            Ok((tx, true))
        }
    })
    .await?;
    if !found {
        return Err(version_not_found(version_id));
    }

    tracing::info!(classroom_id, version_id, "Active schedule version changed");
    Ok(())
}

/// Most recently uploaded version other than `excluded`. Equal timestamps fall back to the
/// greater id so the choice is deterministic.
pub(crate) fn pick_replacement<'a>(
    history: &'a [ClassroomSchedule],
    excluded: &str,
) -> Option<&'a ClassroomSchedule> {
    history
        .iter()
        .filter(|version| version.id != excluded)
        .max_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)))
}

/// Deletes a version. When it is the active one, the replacement is chosen before anything is
/// written and the delete plus repoint commit together. Returns the resulting active id.
///
/// Runs as a transaction over the deleted version, the classroom pointer and the replacement,
/// so concurrent deletes or uploads force a retry instead of leaving a dangling pointer.
pub(crate) async fn delete_version(
    store: &dyn DocumentStore,
    max_attempts: u32,
    classroom_id: &str,
    version_id: &str,
) -> ServiceResult<String> {
    let classroom_path = paths::classroom(classroom_id)?;
    let version_path = paths::schedule(classroom_id, version_id)?;

    let outcome = run_transaction(store, max_attempts, |mut tx| {
        let classroom_path = classroom_path.clone();
        let version_path = version_path.clone();
        async move {
            if tx.get(&version_path).await?.is_none() {
                return Ok((tx, None));
            }
            let mut active_id = match tx.get(&classroom_path).await? {
                Some(document) => document.decode::<Classroom>()?.active_schedule_id,
                None => String::new(),
            };
            tx.delete(version_path);

            if active_id == version_id {
                // The replacement is re-read through the transaction; one that vanished since
                // the listing is skipped.
                let mut history = schedules::list(store, classroom_id).await?;
                active_id = loop {
                    let Some(candidate) =
                        pick_replacement(&history, version_id).map(|version| version.id.clone())
                    else {
                        break String::new();
                    };
                    if tx.get(&paths::schedule(classroom_id, &candidate)?).await?.is_some() {
                        break candidate;
                    }
                    history.retain(|version| version.id != candidate);
                };
                tx.merge(classroom_path, classrooms::pointer_fields(&active_id));
            }
            Ok((tx, Some(active_id)))
        }
    })
    .await?;
    let active_id = outcome.ok_or_else(|| version_not_found(version_id))?;

    tracing::info!(classroom_id, version_id, active_id = %active_id, "Deleted schedule version");
    Ok(active_id)
}

/// Overwrites the rows of the active version in place; id and upload time are kept.
pub(crate) async fn save_active_edits(
    store: &dyn DocumentStore,
    classroom_id: &str,
    rows: Vec<ScheduleRow>,
) -> ServiceResult<ClassroomSchedule> {
    require_rows(&rows)?;

    let classroom = classrooms::find(store, classroom_id).await?.unwrap_or_default();
    if classroom.active_schedule_id.is_empty() {
        return Err(ServiceError::Conflict("This classroom has no active schedule.".to_string()));
    }

    let mut version = schedules::find(store, classroom_id, &classroom.active_schedule_id)
        .await?
        .ok_or_else(|| version_not_found(&classroom.active_schedule_id))?;
    version.schedule = rows;

    let mut fields = Map::new();
    fields.insert(
        "schedule".to_string(),
        serde_json::to_value(&version.schedule).map_err(StoreError::Encode)?,
    );
    let mut batch = WriteBatch::new();
    batch.update(paths::schedule(classroom_id, &version.id)?, fields);
    store.commit(batch).await?;

    tracing::info!(classroom_id, version_id = %version.id, "Saved edits to active schedule");
    Ok(version)
}

/// All versions, newest first.
pub(crate) async fn history(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> ServiceResult<Vec<ClassroomSchedule>> {
    let mut versions = schedules::list(store, classroom_id).await?;
    versions.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then_with(|| b.id.cmp(&a.id)));
    Ok(versions)
}

pub(crate) async fn active_schedule(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> ServiceResult<ActiveSchedule> {
    let classroom = classrooms::find(store, classroom_id).await?.unwrap_or_default();
    let schedule = if classroom.active_schedule_id.is_empty() {
        None
    } else {
        schedules::find(store, classroom_id, &classroom.active_schedule_id).await?
    };

    Ok(ActiveSchedule {
        classroom_id: classroom_id.to_string(),
        active_schedule_id: classroom.active_schedule_id,
        schedule,
    })
}

/// Convenience for callers that only need the active rows.
pub(crate) async fn active_rows(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> ServiceResult<Option<Vec<ScheduleRow>>> {
    Ok(active_schedule(store, classroom_id).await?.schedule.map(|version| version.schedule))
}
