use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::db::models::{ClassroomSchedule, Explanation, ScheduleRow, UserProfile};
use crate::db::types::{CompletionStatus, ContributorStatus};
use crate::services::explanations::NewExplanation;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScheduleUpload {
    #[validate(length(min = 1, message = "A schedule needs at least one row."))]
    pub(crate) schedule: Vec<ScheduleRow>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScheduleImageUpload {
    #[serde(alias = "imageBase64")]
    #[validate(length(min = 1, message = "image_base64 must not be empty"))]
    pub(crate) image_base64: String,
    #[serde(alias = "mimeType")]
    #[validate(length(min = 1, message = "mime_type must not be empty"))]
    pub(crate) mime_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SetActiveRequest {
    #[serde(alias = "versionId")]
    #[validate(length(min = 1, message = "version_id must not be empty"))]
    pub(crate) version_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageUploadResponse {
    pub(crate) version: ClassroomSchedule,
    /// Warnings the analyzer reported alongside a usable schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errors: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActivePointerResponse {
    pub(crate) classroom_id: String,
    pub(crate) active_schedule_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RolloverResponse {
    pub(crate) finished: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeletedResponse {
    pub(crate) deleted: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExplanationCreate {
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: String,
    #[validate(length(min = 1, message = "session must not be empty"))]
    pub(crate) session: String,
    #[validate(length(min = 1, message = "day must not be empty"))]
    pub(crate) day: String,
    #[serde(default, alias = "learningOutcome")]
    pub(crate) learning_outcome: String,
    #[serde(default)]
    pub(crate) concepts: String,
    #[serde(alias = "explanationDate", with = "time::serde::rfc3339")]
    pub(crate) explanation_date: OffsetDateTime,
    #[serde(default)]
    #[validate(length(max = 50, message = "Too many invitees"))]
    pub(crate) invitees: Vec<String>,
}

impl From<ExplanationCreate> for NewExplanation {
    fn from(payload: ExplanationCreate) -> Self {
        Self {
            subject: payload.subject.trim().to_string(),
            session: payload.session.trim().to_string(),
            day: payload.day.trim().to_lowercase(),
            learning_outcome: payload.learning_outcome,
            concepts: payload.concepts,
            explanation_date: payload.explanation_date,
            invitees: payload.invitees,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExplanationCreated {
    pub(crate) explanation: Explanation,
    pub(crate) invitations_sent: usize,
    pub(crate) teachers_notified: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvitationAnswer {
    pub(crate) invitation_id: String,
    pub(crate) explanation_id: String,
    /// Status written for the caller; absent when they were no longer a contributor.
    pub(crate) status: Option<ContributorStatus>,
    pub(crate) invitation_removed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionRequest {
    #[serde(alias = "completionStatus")]
    pub(crate) completion_status: CompletionStatus,
}

/// Classmate entry for the invitee picker.
#[derive(Debug, Serialize)]
pub(crate) struct MemberResponse {
    pub(crate) uid: String,
    pub(crate) name: String,
}

impl From<UserProfile> for MemberResponse {
    fn from(profile: UserProfile) -> Self {
        Self { uid: profile.uid, name: profile.name }
    }
}
