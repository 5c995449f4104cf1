use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::{Invitation, TeacherNotification};
use crate::schemas::classroom::InvitationAnswer;
use crate::services::invitations;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invitations))
        .route("/:invitation_id/accept", post(accept))
        .route("/:invitation_id/decline", post(decline))
}

pub(crate) fn notifications_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:notification_id", delete(dismiss_notification))
}

async fn list_invitations(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    let items = invitations::list_invitations(state.store().as_ref(), &user.uid).await?;
    Ok(Json(items))
}

async fn answer(
    state: &AppState,
    uid: &str,
    invitation_id: &str,
    accept: bool,
) -> Result<Json<InvitationAnswer>, ApiError> {
    let response = invitations::respond(
        state.store(),
        state.transaction_attempts(),
        uid,
        invitation_id,
        accept,
    )
    .await?;

    Ok(Json(InvitationAnswer {
        invitation_id: response.invitation.id,
        explanation_id: response.invitation.explanation_id,
        status: response.status,
        invitation_removed: response.invitation_removed,
    }))
}

async fn accept(
    Path(invitation_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<InvitationAnswer>, ApiError> {
    answer(&state, &user.uid, &invitation_id, true).await
}

async fn decline(
    Path(invitation_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<InvitationAnswer>, ApiError> {
    answer(&state, &user.uid, &invitation_id, false).await
}

async fn list_notifications(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TeacherNotification>>, ApiError> {
    let items = invitations::list_notifications(state.store().as_ref(), &user.uid).await?;
    Ok(Json(items))
}

async fn dismiss_notification(
    Path(notification_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    invitations::dismiss_notification(state.store().as_ref(), &user.uid, &notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
