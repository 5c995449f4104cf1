use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_classroom_access, require_classroom_staff, CurrentUser};
use crate::api::validation::validate_image_payload;
use crate::core::config::Settings;
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::db::models::{ClassroomSchedule, Explanation};
use crate::repositories::users;
use crate::schemas::classroom::{
    ActivePointerResponse, CompletionRequest, DeletedResponse, ExplanationCreate,
    ExplanationCreated, ImageUploadResponse, MemberResponse, RolloverResponse,
    ScheduleImageUpload, ScheduleUpload, SetActiveRequest,
};
use crate::services::schedule_versions::{self, ActiveSchedule};
use crate::services::{explanations, status_rollover};

/// Room for the JSON envelope and a `data:` prefix around the encoded image.
const IMAGE_BODY_OVERHEAD: usize = 64 * 1024;

/// Request body cap for image uploads: the base64 expansion of the configured upload size plus
/// the envelope. The upload size itself is enforced on the decoded image.
pub(crate) fn image_body_limit(max_upload_bytes: u64) -> usize {
    let encoded = max_upload_bytes.div_ceil(3).saturating_mul(4);
    usize::try_from(encoded).unwrap_or(usize::MAX).saturating_add(IMAGE_BODY_OVERHEAD)
}

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    let image_limit = image_body_limit(settings.uploads().max_upload_bytes());
    Router::new()
        .route("/:classroom_id/schedules", get(list_versions).post(upload_rows))
        .route(
            "/:classroom_id/schedules/analyze",
            post(upload_image).layer(DefaultBodyLimit::max(image_limit)),
        )
        .route("/:classroom_id/schedules/:version_id", delete(delete_version))
        .route("/:classroom_id/schedule", get(active_schedule).put(save_edits))
        .route("/:classroom_id/schedule/active", put(set_active))
        .route("/:classroom_id/rollover", post(rollover))
        .route(
            "/:classroom_id/explanations",
            get(list_explanations).post(create_explanation).delete(clear_explanations),
        )
        .route("/:classroom_id/explanations/:explanation_id/completion", put(mark_completion))
        .route("/:classroom_id/members", get(list_members))
}

/// Students of the classroom, for choosing invitees.
async fn list_members(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let mut students = users::students_of(state.store().as_ref(), &classroom_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list classroom members"))?;
    students.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(students.into_iter().map(MemberResponse::from).collect()))
}

async fn list_versions(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ClassroomSchedule>>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let versions = schedule_versions::history(state.store().as_ref(), &classroom_id).await?;
    Ok(Json(versions))
}

async fn upload_rows(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ScheduleUpload>,
) -> Result<(StatusCode, Json<ClassroomSchedule>), ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let version = schedule_versions::upload_new_version(
        state.store().as_ref(),
        &classroom_id,
        payload.schedule,
        &user.name,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(version)))
}

/// Runs the image through the analyzer and stores the extracted rows as the new active version.
/// An empty extraction stores nothing and answers 422 with the analyzer's explanation.
async fn upload_image(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ScheduleImageUpload>,
) -> Result<(StatusCode, Json<ImageUploadResponse>), ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let uploads = state.settings().uploads();
    let image = validate_image_payload(
        &payload.image_base64,
        &payload.mime_type,
        &uploads.allowed_image_types,
        uploads.max_upload_bytes(),
    )?;

    let analysis = state.analyzer().analyze(image.base64, &image.mime_type).await;
    if analysis.schedule.is_empty() {
        let detail = analysis
            .errors
            .unwrap_or_else(|| "No schedule could be extracted from the image.".to_string());
        tracing::warn!(classroom_id = %classroom_id, detail = %detail, "Schedule image rejected");
        return Err(ApiError::UnprocessableEntity(detail));
    }

    let version = schedule_versions::upload_new_version(
        state.store().as_ref(),
        &classroom_id,
        analysis.schedule,
        &user.name,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ImageUploadResponse { version, errors: analysis.errors })))
}

async fn delete_version(
    Path((classroom_id, version_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ActivePointerResponse>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let active_schedule_id = schedule_versions::delete_version(
        state.store().as_ref(),
        state.transaction_attempts(),
        &classroom_id,
        &version_id,
    )
    .await?;
    Ok(Json(ActivePointerResponse { classroom_id, active_schedule_id }))
}

async fn active_schedule(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ActiveSchedule>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let active = schedule_versions::active_schedule(state.store().as_ref(), &classroom_id).await?;
    Ok(Json(active))
}

async fn save_edits(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ScheduleUpload>,
) -> Result<Json<ClassroomSchedule>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let store = state.store().as_ref();
    let version =
        schedule_versions::save_active_edits(store, &classroom_id, payload.schedule).await?;
    Ok(Json(version))
}

async fn set_active(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<ActivePointerResponse>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    schedule_versions::set_active_version(
        state.store().as_ref(),
        state.transaction_attempts(),
        &classroom_id,
        &payload.version_id,
    )
    .await?;
    Ok(Json(ActivePointerResponse { classroom_id, active_schedule_id: payload.version_id }))
}

async fn rollover(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<RolloverResponse>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let finished = status_rollover::finish_elapsed(
        state.store().as_ref(),
        &classroom_id,
        state.settings().school().utc_offset,
        now_utc(),
    )
    .await?;
    Ok(Json(RolloverResponse { finished }))
}

async fn list_explanations(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Explanation>>, ApiError> {
    require_classroom_access(&user, &classroom_id)?;
    let items = explanations::list(state.store().as_ref(), &classroom_id).await?;
    Ok(Json(items))
}

async fn create_explanation(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExplanationCreate>,
) -> Result<(StatusCode, Json<ExplanationCreated>), ApiError> {
    if require_classroom_access(&user, &classroom_id)?.is_staff() {
        return Err(ApiError::forbidden("Only students of this classroom can commit"));
    }
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let committed = explanations::commit_explanation(
        state.store().as_ref(),
        &classroom_id,
        &user,
        payload.into(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ExplanationCreated {
            explanation: committed.explanation,
            invitations_sent: committed.invitations_sent,
            teachers_notified: committed.teachers_notified,
        }),
    ))
}

async fn mark_completion(
    Path((classroom_id, explanation_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CompletionRequest>,
) -> Result<Json<Explanation>, ApiError> {
    require_classroom_staff(&user, &classroom_id)?;
    let explanation = explanations::set_completion_status(
        state.store().as_ref(),
        &classroom_id,
        &explanation_id,
        payload.completion_status,
    )
    .await?;
    Ok(Json(explanation))
}

async fn clear_explanations(
    Path(classroom_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    require_classroom_staff(&user, &classroom_id)?;
    let deleted =
        explanations::delete_all_explanations(state.store().as_ref(), &classroom_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

#[cfg(test)]
mod tests;
