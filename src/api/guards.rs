use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::UserProfile;
use crate::db::types::UserRole;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) UserProfile);
pub(crate) struct CurrentAdmin(pub(crate) UserProfile);

/// How a caller relates to a classroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassroomAccess {
    Member,
    Teacher,
    Admin,
}

impl ClassroomAccess {
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let account = app_state
            .identity()
            .get_account(&claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load account"))?;

        match account {
            Some(account) if !account.disabled => {}
            _ => return Err(ApiError::Unauthorized("Invalid authentication credentials")),
        }

        let profile = repositories::users::find(app_state.store().as_ref(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load profile"))?;

        let Some(profile) = profile else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        Ok(CurrentUser(profile))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Admin {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }
}

/// Students of the classroom, teachers assigned to it and admins may use a classroom.
pub(crate) fn require_classroom_access(
    user: &UserProfile,
    classroom_id: &str,
) -> Result<ClassroomAccess, ApiError> {
    match user.role {
        UserRole::Admin => Ok(ClassroomAccess::Admin),
        UserRole::Teacher if user.teaches(classroom_id) => Ok(ClassroomAccess::Teacher),
        UserRole::Student if user.classroom_id().as_deref() == Some(classroom_id) => {
            Ok(ClassroomAccess::Member)
        }
        _ => Err(ApiError::forbidden("You do not belong to this classroom")),
    }
}

pub(crate) fn require_classroom_staff(
    user: &UserProfile,
    classroom_id: &str,
) -> Result<ClassroomAccess, ApiError> {
    let access = require_classroom_access(user, classroom_id)?;
    if access.is_staff() {
        Ok(access)
    } else {
        Err(ApiError::forbidden("Teacher or admin access required for this classroom"))
    }
}
