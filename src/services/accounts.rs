use serde_json::{Map, Value};

use crate::core::config::AdminSettings;
use crate::core::security;
use crate::db::models::{TeachingAssignment, UserProfile};
use crate::db::types::UserRole;
use crate::identity::{normalize_email, Account, IdentityError, IdentityStore, NewAccount};
use crate::repositories::{new_id, paths, users};
use crate::services::bulk_delete::empty_subcollections;
use crate::services::{ServiceError, ServiceResult};
use crate::store::{DocumentPath, DocumentStore, Fields, Query, WriteBatch};

/// School recorded on administrator profiles.
pub(crate) const ADMIN_SCHOOL: &str = "all";

#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) role: UserRole,
    pub(crate) school: String,
    pub(crate) grade: Option<String>,
    pub(crate) class: Option<String>,
    pub(crate) assignments: Vec<TeachingAssignment>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ProfileChanges {
    pub(crate) name: Option<String>,
    pub(crate) school: Option<String>,
    pub(crate) grade: Option<String>,
    pub(crate) class: Option<String>,
    pub(crate) assignments: Option<Vec<TeachingAssignment>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ProfileFilter {
    pub(crate) role: Option<UserRole>,
    /// Case-insensitive substring matched against name and email.
    pub(crate) search: Option<String>,
}

/// Custom claims mirrored onto the identity account from the profile.
pub(crate) fn claims_for(profile: &UserProfile) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert("role".to_string(), Value::from(profile.role.as_str()));
    claims.insert("school".to_string(), Value::from(profile.school.as_str()));
    if let Some(grade) = &profile.grade {
        claims.insert("grade".to_string(), Value::from(grade.as_str()));
    }
    if let Some(class) = &profile.class {
        claims.insert("class".to_string(), Value::from(class.as_str()));
    }
    if !profile.assignments.is_empty() {
        claims.insert(
            "assignments".to_string(),
            serde_json::to_value(&profile.assignments).unwrap_or(Value::Null),
        );
    }
    claims
}

fn check_role_fields(profile: &UserProfile) -> ServiceResult<()> {
    match profile.role {
        UserRole::Student if profile.classroom_id().is_none() => Err(ServiceError::Validation(
            "Students need a school, grade and class".to_string(),
        )),
        UserRole::Teacher if profile.assignments.is_empty() => Err(ServiceError::Validation(
            "Teachers need at least one teaching assignment".to_string(),
        )),
        _ => Ok(()),
    }
}

fn email_conflict(err: IdentityError) -> ServiceError {
    match err {
        IdentityError::EmailExists => {
            ServiceError::Conflict("This email is already registered".to_string())
        }
        other => other.into(),
    }
}

/// Creates the identity account and its profile. A profile that cannot be written takes the
/// fresh account down with it.
pub(crate) async fn create_with_profile(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    registration: Registration,
) -> ServiceResult<UserProfile> {
    let hashed_password = security::hash_password(&registration.password)?;
    let profile = UserProfile {
        uid: new_id(),
        name: registration.name.trim().to_string(),
        email: normalize_email(&registration.email),
        role: registration.role,
        school: registration.school,
        grade: registration.grade,
        class: registration.class,
        assignments: registration.assignments,
    };
    check_role_fields(&profile)?;

    identity
        .create_account(NewAccount {
            uid: profile.uid.clone(),
            email: profile.email.clone(),
            display_name: profile.name.clone(),
            hashed_password,
        })
        .await
        .map_err(email_conflict)?;

    let written = async {
        identity.set_custom_claims(&profile.uid, claims_for(&profile)).await?;
        users::save(store, &profile).await?;
        ServiceResult::Ok(())
    }
    .await;

    if let Err(err) = written {
        if let Err(cleanup) = identity.delete_account(&profile.uid).await {
            tracing::error!(
                uid = %profile.uid,
                error = %cleanup,
                "Failed to remove orphaned account"
            );
        }
        return Err(err);
    }

    tracing::info!(uid = %profile.uid, role = profile.role.as_str(), "Account registered");
    Ok(profile)
}

/// Self-service sign-up for students and teachers.
pub(crate) async fn register(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    registration: Registration,
) -> ServiceResult<UserProfile> {
    if registration.role == UserRole::Admin {
        return Err(ServiceError::Forbidden(
            "Administrator accounts need the admin sign-up".to_string(),
        ));
    }
    create_with_profile(store, identity, registration).await
}

/// Administrator sign-up gated by the shared admin secret.
pub(crate) async fn register_admin(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    admin: &AdminSettings,
    admin_secret: &str,
    name: String,
    email: String,
    password: String,
) -> ServiceResult<UserProfile> {
    if !security::secret_matches(admin_secret, &admin.purge_secret) {
        return Err(ServiceError::Forbidden("Incorrect admin secret. Access denied.".to_string()));
    }
    let registration = Registration {
        name,
        email,
        password,
        role: UserRole::Admin,
        school: ADMIN_SCHOOL.to_string(),
        grade: None,
        class: None,
        assignments: Vec::new(),
    };
    create_with_profile(store, identity, registration).await
}

/// Checks credentials. `None` covers unknown emails, wrong passwords and disabled accounts.
pub(crate) async fn authenticate(
    identity: &dyn IdentityStore,
    email: &str,
    password: &str,
) -> ServiceResult<Option<Account>> {
    let Some(account) = identity.find_by_email(email).await? else {
        return Ok(None);
    };
    if account.disabled {
        return Ok(None);
    }
    let verified = security::verify_password(password, &account.hashed_password).unwrap_or(false);
    Ok(verified.then_some(account))
}

pub(crate) async fn update_profile(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    uid: &str,
    changes: ProfileChanges,
) -> ServiceResult<UserProfile> {
    let mut profile = users::find(store, uid)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Profile not found".to_string()))?;

    if let Some(name) = changes.name {
        let name = name.trim().to_string();
        if name.chars().count() < 2 {
            return Err(ServiceError::Validation(
                "Name must be at least 2 characters".to_string(),
            ));
        }
        profile.name = name;
    }
    if let Some(school) = changes.school {
        profile.school = school;
    }
    if changes.grade.is_some() {
        profile.grade = changes.grade;
    }
    if changes.class.is_some() {
        profile.class = changes.class;
    }
    if let Some(assignments) = changes.assignments {
        profile.assignments = assignments;
    }
    check_role_fields(&profile)?;

    users::save(store, &profile).await?;
    match identity.set_custom_claims(uid, claims_for(&profile)).await {
        Ok(()) | Err(IdentityError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }
    Ok(profile)
}

pub(crate) async fn get_profile(
    store: &dyn DocumentStore,
    uid: &str,
) -> ServiceResult<UserProfile> {
    users::find(store, uid)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("User {uid} not found")))
}

pub(crate) async fn list_profiles(
    store: &dyn DocumentStore,
    filter: &ProfileFilter,
) -> ServiceResult<Vec<UserProfile>> {
    let mut profiles = match filter.role {
        Some(role) => users::list_by_role(store, role).await?,
        None => users::list(store, &Query::new()).await?,
    };
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        profiles.retain(|profile| {
            profile.name.to_lowercase().contains(&needle)
                || profile.email.to_lowercase().contains(&needle)
        });
    }
    profiles.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(profiles)
}

/// Removes a profile document while remembering its body so the removal can be undone.
struct ProfileRemoval {
    path: DocumentPath,
    snapshot: Option<Fields>,
}

impl ProfileRemoval {
    async fn apply(store: &dyn DocumentStore, uid: &str) -> ServiceResult<Self> {
        let path = paths::user(uid)?;
        let snapshot = store.get(&path).await?.map(|document| document.data);
        if snapshot.is_some() {
            let mut batch = WriteBatch::new();
            batch.delete(path.clone());
            store.commit(batch).await?;
        }
        Ok(Self { path, snapshot })
    }

    async fn rollback(self, store: &dyn DocumentStore) {
        let Some(data) = self.snapshot else {
            return;
        };
        let mut batch = WriteBatch::new();
        batch.set(self.path.clone(), data);
        if let Err(err) = store.commit(batch).await {
            tracing::error!(path = %self.path, error = %err, "Failed to restore profile");
        }
    }
}

/// Deletes the profile, then the identity account, then the profile's mailboxes. An account
/// that is already gone is fine; any other identity failure puts the profile back.
pub(crate) async fn delete_user(
    store: &dyn DocumentStore,
    identity: &dyn IdentityStore,
    uid: &str,
) -> ServiceResult<()> {
    let removal = ProfileRemoval::apply(store, uid).await?;

    match identity.delete_account(uid).await {
        Ok(()) => {}
        Err(IdentityError::NotFound(_)) => {
            tracing::info!(uid, "Account already gone; profile cleaned up");
        }
        Err(err) => {
            tracing::warn!(uid, error = %err, "Account delete failed; restoring profile");
            removal.rollback(store).await;
            return Err(err.into());
        }
    }

    let mailboxes = empty_subcollections(store, &removal.path).await?;
    tracing::info!(uid, mailboxes, "User deleted");
    Ok(())
}

/// Replaces the custom claims of `uid`. Admins may target anyone; everyone else only
/// themselves and never with the admin role.
pub(crate) async fn set_custom_claims(
    identity: &dyn IdentityStore,
    caller: &UserProfile,
    uid: &str,
    claims: Map<String, Value>,
) -> ServiceResult<()> {
    if uid.trim().is_empty() {
        return Err(ServiceError::Validation("uid is required".to_string()));
    }
    if let Some(role) = claims.get("role") {
        let role: UserRole = serde_json::from_value(role.clone())
            .map_err(|_| ServiceError::Validation("Unknown role claim".to_string()))?;
        if role == UserRole::Admin && caller.role != UserRole::Admin {
            return Err(ServiceError::Forbidden("Only admins can grant the admin role".to_string()));
        }
    }
    if caller.role != UserRole::Admin && caller.uid != uid {
        return Err(ServiceError::Forbidden("You can only change your own claims".to_string()));
    }

    identity.set_custom_claims(uid, claims).await.map_err(|err| match err {
        IdentityError::NotFound(uid) => ServiceError::NotFound(format!("User {uid} not found")),
        other => other.into(),
    })?;
    tracing::info!(uid, caller = %caller.uid, "Custom claims updated");
    Ok(())
}
