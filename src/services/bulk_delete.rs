//! Cascading deletes and the admin purge.
//!
//! The store never deletes subcollections on its own, so every helper here empties children
//! before removing their parent.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::core::config::AdminSettings;
use crate::core::security;
use crate::db::types::PurgeTarget;
use crate::identity::{IdentityError, IdentityStore, MAX_BULK_DELETE};
use crate::repositories::{classrooms, paths};
use crate::services::ServiceResult;
use crate::store::{CollectionPath, DocumentPath, DocumentStore, Query, StoreError, WriteBatch};
use crate::store::MAX_BATCH_WRITES;

/// Documents fetched and deleted per commit when callers have no preference.
pub(crate) const DEFAULT_BATCH_SIZE: usize = 100;
/// Accounts requested per identity listing page.
pub(crate) const ACCOUNT_PAGE_SIZE: usize = 1000;

pub(crate) const INCORRECT_SECRET: &str = "Incorrect admin secret.";

type DeleteFuture<'a> = Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + 'a>>;

/// Deletes every document of `collection`, `batch_size` at a time, including each document's
/// own subcollections. Returns the number of documents removed. Safe to re-run.
pub(crate) async fn delete_collection(
    store: &dyn DocumentStore,
    collection: &CollectionPath,
    batch_size: usize,
) -> Result<usize, StoreError> {
    let batch_size = batch_size.clamp(1, MAX_BATCH_WRITES);
    let page = Query::new().limit(batch_size);
    let mut deleted = 0;

    loop {
        let documents = store.query(collection, &page).await?;
        if documents.is_empty() {
            break;
        }

        let mut batch = WriteBatch::new();
        for document in &documents {
            deleted += empty_subcollections(store, &document.path).await?;
            batch.delete(document.path.clone());
        }
        store.commit(batch).await?;
        deleted += documents.len();
    }

    // Ids that only exist as parents of subcollections are invisible to queries.
    for path in store.list_document_paths(collection).await? {
        deleted += empty_subcollections(store, &path).await?;
    }

    tracing::debug!(collection = %collection, deleted, "Collection emptied");
    Ok(deleted)
}

/// Empties every subcollection below `document` without touching the document itself.
pub(crate) fn empty_subcollections<'a>(
    store: &'a dyn DocumentStore,
    document: &'a DocumentPath,
) -> DeleteFuture<'a> {
    Box::pin(async move {
        let mut deleted = 0;
        for collection in store.list_collections(document).await? {
            deleted += delete_collection(store, &collection, DEFAULT_BATCH_SIZE).await?;
        }
        Ok(deleted)
    })
}

/// Deletes the document after all of its descendants.
pub(crate) async fn delete_document_subtree(
    store: &dyn DocumentStore,
    document: &DocumentPath,
) -> Result<usize, StoreError> {
    let deleted = empty_subcollections(store, document).await?;
    let mut batch = WriteBatch::new();
    batch.delete(document.clone());
    store.commit(batch).await?;
    Ok(deleted + 1)
}

/// Account spared by [`purge_all_users`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Exclusion<'a> {
    Uid(&'a str),
    Email(&'a str),
    Nobody,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UserPurgeReport {
    pub(crate) accounts_deleted: usize,
    pub(crate) documents_deleted: usize,
}

async fn resolve_exclusion(
    identity: &dyn IdentityStore,
    exclusion: Exclusion<'_>,
) -> Result<Option<String>, IdentityError> {
    match exclusion {
        Exclusion::Uid(uid) => Ok(Some(uid.to_string())),
        Exclusion::Nobody => Ok(None),
        Exclusion::Email(email) => match identity.find_by_email(email).await {
            Ok(Some(account)) => Ok(Some(account.uid)),
            Ok(None) | Err(IdentityError::NotFound(_)) => {
                tracing::warn!(email, "Excluded admin account not found; purging everyone");
                Ok(None)
            }
            Err(err) => Err(err),
        },
    }
}

/// Deletes every account except the excluded one, then the matching profile documents with
/// their mailboxes.
pub(crate) async fn purge_all_users(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    exclusion: Exclusion<'_>,
) -> ServiceResult<UserPurgeReport> {
    let excluded = resolve_exclusion(identity, exclusion).await?;

    let mut targets = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = identity.list_accounts(ACCOUNT_PAGE_SIZE, page_token.as_deref()).await?;
        targets.extend(
            page.accounts
                .into_iter()
                .map(|account| account.uid)
                .filter(|uid| Some(uid) != excluded.as_ref()),
        );
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let mut report = UserPurgeReport::default();
    for chunk in targets.chunks(MAX_BULK_DELETE) {
        report.accounts_deleted += identity.delete_accounts(chunk).await?;
    }

    let mut profiles = Vec::with_capacity(targets.len());
    for uid in &targets {
        let profile = paths::user(uid)?;
        report.documents_deleted += empty_subcollections(store, &profile).await?;
        profiles.push(profile);
    }
    for chunk in profiles.chunks(MAX_BATCH_WRITES) {
        let mut batch = WriteBatch::new();
        for profile in chunk {
            batch.delete(profile.clone());
        }
        store.commit(batch).await?;
        report.documents_deleted += chunk.len();
    }

    tracing::info!(
        accounts = report.accounts_deleted,
        documents = report.documents_deleted,
        excluded = excluded.as_deref().unwrap_or("-"),
        "Purged users"
    );
    Ok(report)
}

/// Deletes every classroom subtree: schedules, explanations and the classroom records.
pub(crate) async fn purge_all_classroom_data(store: &dyn DocumentStore) -> ServiceResult<usize> {
    let mut deleted = 0;
    for classroom_id in classrooms::list_ids(store).await? {
        deleted += delete_document_subtree(store, &paths::classroom(&classroom_id)?).await?;
    }
    tracing::info!(documents = deleted, "Purged classroom data");
    Ok(deleted)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PurgeOutcome {
    pub(crate) success: bool,
    pub(crate) message: String,
}

impl PurgeOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }

    /// True when nothing ran because the admin secret did not match.
    pub(crate) fn secret_rejected(&self) -> bool {
        !self.success && self.message == INCORRECT_SECRET
    }
}

fn record_run(target: PurgeTarget, outcome: &'static str) {
    metrics::counter!("admin_purge_runs_total", "target" => target.as_str(), "outcome" => outcome)
        .increment(1);
}

/// Bulk purge behind the shared admin secret. Never fails: problems come back as an
/// unsuccessful outcome, and steps that already ran are not rolled back.
pub(crate) async fn purge(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    admin: &AdminSettings,
    target: PurgeTarget,
    admin_secret: &str,
    exclusion: Exclusion<'_>,
) -> PurgeOutcome {
    if !security::secret_matches(admin_secret, &admin.purge_secret) {
        record_run(target, "denied");
        tracing::warn!(target = target.as_str(), "Purge rejected: incorrect admin secret");
        return PurgeOutcome::failure(INCORRECT_SECRET);
    }

    let result = async {
        if matches!(target, PurgeTarget::Users | PurgeTarget::All) {
            purge_all_users(store, identity, exclusion).await?;
        }
        if matches!(target, PurgeTarget::Schedules | PurgeTarget::All) {
            purge_all_classroom_data(store).await?;
        }
        ServiceResult::Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            record_run(target, "success");
            PurgeOutcome {
                success: true,
                message: format!("Successfully deleted all {}.", target.as_str()),
            }
        }
        Err(err) => {
            record_run(target, "error");
            tracing::error!(target = target.as_str(), error = %err, "Purge failed part-way");
            PurgeOutcome::failure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::db::models::UserProfile;
    use crate::db::types::UserRole;
    use crate::identity::memory::MemoryIdentityStore;
    use crate::identity::NewAccount;
    use crate::repositories;
    use crate::store::memory::MemoryDocumentStore;
    use crate::store::Fields;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn admin_settings(secret: &str) -> AdminSettings {
        AdminSettings {
            purge_secret: secret.to_string(),
            first_admin_email: "admin@school.org".to_string(),
            first_admin_password: String::new(),
            first_admin_name: "Admin".to_string(),
        }
    }

    async fn seed_flat(store: &MemoryDocumentStore, collection: &CollectionPath, count: usize) {
        let mut batch = WriteBatch::new();
        for index in 0..count {
            let path = collection.doc(&format!("d{index:03}")).unwrap();
            batch.set(path, fields(json!({ "n": index })));
        }
        store.commit(batch).await.unwrap();
    }

    async fn seed_user(store: &MemoryDocumentStore, identity: &MemoryIdentityStore, uid: &str) {
        identity
            .create_account(NewAccount {
                uid: uid.to_string(),
                email: format!("{uid}@school.org"),
                display_name: uid.to_string(),
                hashed_password: "hash".to_string(),
            })
            .await
            .unwrap();
        let profile = UserProfile {
            uid: uid.to_string(),
            name: uid.to_string(),
            email: format!("{uid}@school.org"),
            role: UserRole::Student,
            school: "schoolA".to_string(),
            grade: Some("11".to_string()),
            class: Some("c".to_string()),
            assignments: Vec::new(),
        };
        repositories::users::save(store, &profile).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.set(paths::invitation(uid, "i1").unwrap(), fields(json!({ "subject": "Math" })));
        store.commit(batch).await.unwrap();
    }

    async fn seed_classroom(store: &MemoryDocumentStore, classroom_id: &str) {
        let mut batch = WriteBatch::new();
        let classroom = paths::classroom(classroom_id).unwrap();
        batch.set(classroom, fields(json!({ "activeScheduleId": "v1" })));
        batch.set(paths::schedule(classroom_id, "v1").unwrap(), fields(json!({ "schedule": [] })));
        let explanation = paths::explanation(classroom_id, "e1").unwrap();
        batch.set(explanation, fields(json!({ "subject": "Math" })));
        store.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn deletes_flat_collection_in_ceil_n_over_b_commits() {
        let cases = [(10, 3, 4), (9, 3, 3), (1, 500, 1), (0, 5, 0)];
        for (count, batch_size, expected_commits) in cases {
            let store = MemoryDocumentStore::new();
            let collection = CollectionPath::root("items").unwrap();
            seed_flat(&store, &collection, count).await;
            let before = store.commit_count();

            let deleted = delete_collection(&store, &collection, batch_size).await.unwrap();

            assert_eq!(deleted, count);
            assert_eq!(store.commit_count() - before, expected_commits, "N={count} B={batch_size}");
            assert!(store.list(&collection).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn delete_collection_is_idempotent_and_clamps_batch_size() {
        let store = MemoryDocumentStore::new();
        let collection = CollectionPath::root("items").unwrap();
        seed_flat(&store, &collection, 3).await;

        assert_eq!(delete_collection(&store, &collection, 0).await.unwrap(), 3);
        let before = store.commit_count();
        assert_eq!(delete_collection(&store, &collection, 10).await.unwrap(), 0);
        assert_eq!(store.commit_count(), before);
    }

    #[tokio::test]
    async fn subtree_removes_children_and_parent() {
        let store = MemoryDocumentStore::new();
        seed_classroom(&store, "schoolA-11-c").await;
        seed_classroom(&store, "schoolA-11-d").await;

        let classroom = paths::classroom("schoolA-11-c").unwrap();
        let deleted = delete_document_subtree(&store, &classroom).await.unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(store.len().await, 3);
        assert_eq!(classrooms::list_ids(&store).await.unwrap(), vec!["schoolA-11-d"]);
    }

    #[tokio::test]
    async fn purge_users_spares_excluded_admin() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        for uid in ["admin", "u1", "u2"] {
            seed_user(&store, &identity, uid).await;
        }

        let report = purge_all_users(&store, &identity, Exclusion::Uid("admin")).await.unwrap();

        assert_eq!(report.accounts_deleted, 2);
        assert!(identity.get_account("admin").await.unwrap().is_some());
        assert!(identity.get_account("u1").await.unwrap().is_none());
        assert!(identity.get_account("u2").await.unwrap().is_none());

        let remaining = repositories::users::list(&store, &Query::new()).await.unwrap();
        assert_eq!(remaining.iter().map(|p| p.uid.as_str()).collect::<Vec<_>>(), vec!["admin"]);
        assert!(store.get(&paths::invitation("u1", "i1").unwrap()).await.unwrap().is_none());
        assert!(store.get(&paths::invitation("admin", "i1").unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_users_tolerates_missing_admin_email() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        seed_user(&store, &identity, "u1").await;

        let exclusion = Exclusion::Email("nobody@school.org");
        let report = purge_all_users(&store, &identity, exclusion).await.unwrap();

        assert_eq!(report.accounts_deleted, 1);
        assert_eq!(identity.len().await, 0);
    }

    #[tokio::test]
    async fn purge_with_wrong_secret_writes_nothing() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        seed_user(&store, &identity, "u1").await;
        seed_classroom(&store, "schoolA-11-c").await;
        let commits = store.commit_count();
        let documents = store.len().await;

        for target in [PurgeTarget::All, PurgeTarget::Users, PurgeTarget::Schedules] {
            let outcome = purge(
                &store,
                &identity,
                &admin_settings("open sesame"),
                target,
                "wrong",
                Exclusion::Nobody,
            )
            .await;
            assert_eq!(outcome, PurgeOutcome::failure(INCORRECT_SECRET));
        }

        assert_eq!(store.commit_count(), commits);
        assert_eq!(store.len().await, documents);
        assert_eq!(identity.len().await, 1);
    }

    #[tokio::test]
    async fn purge_with_unconfigured_secret_is_denied() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        let outcome =
            purge(&store, &identity, &admin_settings(""), PurgeTarget::All, "", Exclusion::Nobody)
                .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn purge_schedules_keeps_users() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        seed_user(&store, &identity, "u1").await;
        seed_classroom(&store, "schoolA-11-c").await;

        let outcome = purge(
            &store,
            &identity,
            &admin_settings("open sesame"),
            PurgeTarget::Schedules,
            "open sesame",
            Exclusion::Nobody,
        )
        .await;

        assert_eq!(outcome.message, "Successfully deleted all schedules.");
        assert!(outcome.success);
        assert!(classrooms::list_ids(&store).await.unwrap().is_empty());
        assert!(repositories::users::find(&store, "u1").await.unwrap().is_some());
        assert_eq!(identity.len().await, 1);
    }

    #[tokio::test]
    async fn purge_all_removes_classrooms_that_only_hold_subcollections() {
        let store = MemoryDocumentStore::new();
        let identity = MemoryIdentityStore::new();
        seed_user(&store, &identity, "admin").await;
        seed_user(&store, &identity, "u1").await;
        let mut batch = WriteBatch::new();
        batch.set(paths::schedule("orphan-1-a", "v1").unwrap(), fields(json!({})));
        store.commit(batch).await.unwrap();

        let outcome = purge(
            &store,
            &identity,
            &admin_settings("open sesame"),
            PurgeTarget::All,
            "open sesame",
            Exclusion::Uid("admin"),
        )
        .await;

        assert!(outcome.success, "{}", outcome.message);
        assert!(classrooms::list_ids(&store).await.unwrap().is_empty());
        assert_eq!(identity.len().await, 1);
    }
}
