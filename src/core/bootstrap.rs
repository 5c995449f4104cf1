use crate::core::security;
use crate::core::state::AppState;
use crate::db::models::UserProfile;
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::accounts::{self, ADMIN_SCHOOL};

/// Makes sure the configured first administrator exists: creates the account and profile when
/// missing and restores the admin profile when it drifted.
pub(crate) async fn ensure_first_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_admin_password.is_empty() || admin.first_admin_email.is_empty() {
        tracing::warn!("FIRST_ADMIN_EMAIL or FIRST_ADMIN_PASSWORD not configured; skipping");
        return Ok(());
    }

    let store = state.store().as_ref();
    let identity = state.identity().as_ref();

    let Some(account) = identity.find_by_email(&admin.first_admin_email).await? else {
        let registration = accounts::Registration {
            name: admin.first_admin_name.clone(),
            email: admin.first_admin_email.clone(),
            password: admin.first_admin_password.clone(),
            role: UserRole::Admin,
            school: ADMIN_SCHOOL.to_string(),
            grade: None,
            class: None,
            assignments: Vec::new(),
        };
        let profile = accounts::create_with_profile(store, identity, registration).await?;
        tracing::info!(uid = %profile.uid, "Created first admin account");
        return Ok(());
    };

    let verified =
        security::verify_password(&admin.first_admin_password, &account.hashed_password)
            .unwrap_or(false);
    if !verified {
        tracing::warn!(uid = %account.uid, "First admin password differs from configuration");
    }

    let profile = repositories::users::find(store, &account.uid).await?;
    let needs_update = profile.as_ref().map_or(true, |profile| profile.role != UserRole::Admin);
    if needs_update {
        let profile = UserProfile {
            uid: account.uid.clone(),
            name: profile
                .map(|profile| profile.name)
                .unwrap_or_else(|| admin.first_admin_name.clone()),
            email: account.email.clone(),
            role: UserRole::Admin,
            school: ADMIN_SCHOOL.to_string(),
            grade: None,
            class: None,
            assignments: Vec::new(),
        };
        repositories::users::save(store, &profile).await?;
        identity.set_custom_claims(&account.uid, accounts::claims_for(&profile)).await?;
        tracing::info!(uid = %account.uid, "Repaired first admin profile");
    } else {
        tracing::info!("First admin already up to date");
    }

    Ok(())
}
