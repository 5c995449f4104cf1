use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_classroom_access, CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::user::{ProfileUpdate, UserListQuery, UserResponse};
use crate::schemas::ActionResponse;
use crate::services::accounts::{self, ProfileFilter};
use crate::services::explanations::{self, ExplanationStats};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/", get(list_users))
        .route("/:user_id", get(get_user).delete(delete_user))
        .route("/:user_id/stats", get(user_stats))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_profile(user))
}

async fn update_me(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let profile = accounts::update_profile(
        state.store().as_ref(),
        state.identity().as_ref(),
        &user.uid,
        payload.into(),
    )
    .await?;

    Ok(Json(UserResponse::from_profile(profile)))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let filter = ProfileFilter { role: params.role, search: params.search };
    let profiles = accounts::list_profiles(state.store().as_ref(), &filter).await?;
    Ok(Json(profiles.into_iter().map(UserResponse::from_profile).collect()))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let profile = accounts::get_profile(state.store().as_ref(), &user_id).await?;
    Ok(Json(UserResponse::from_profile(profile)))
}

/// Explanation statistics shown on a student's profile. Visible to the student and to anyone
/// who may use the student's classroom.
async fn user_stats(
    Path(user_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExplanationStats>, ApiError> {
    let profile = if user.uid == user_id {
        user
    } else {
        let profile = accounts::get_profile(state.store().as_ref(), &user_id).await?;
        let classroom_id = profile
            .classroom_id()
            .ok_or_else(|| ApiError::forbidden("This profile has no explanation statistics"))?;
        require_classroom_access(&user, &classroom_id)?;
        profile
    };

    let stats = explanations::explanation_stats(state.store().as_ref(), &profile).await?;
    Ok(Json(stats))
}

/// Failures are reported in the body so the dashboard can show the raw message.
async fn delete_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, ApiError> {
    if admin.uid == user_id {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    let result =
        accounts::delete_user(state.store().as_ref(), state.identity().as_ref(), &user_id).await;

    Ok(Json(match result {
        Ok(()) => {
            tracing::info!(uid = %user_id, admin = %admin.uid, "User deleted by admin");
            ActionResponse::ok("User deleted successfully.")
        }
        Err(err) => {
            tracing::error!(uid = %user_id, error = %err, "Failed to delete user");
            ActionResponse::failed(format!("Failed to delete user: {err}"))
        }
    }))
}
