use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::types::{CompletionStatus, ContributorStatus, ExplanationStatus, UserRole};

/// Classroom document id for a school, grade and class.
pub(crate) fn classroom_id(school: &str, grade: &str, class: &str) -> String {
    format!("{school}-{grade}-{class}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeachingAssignment {
    pub(crate) school: String,
    pub(crate) grade: String,
    pub(crate) class: String,
    pub(crate) subject: String,
}

impl TeachingAssignment {
    pub(crate) fn classroom_id(&self) -> String {
        classroom_id(&self.school, &self.grade, &self.class)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserProfile {
    pub(crate) uid: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) role: UserRole,
    #[serde(default)]
    pub(crate) school: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) class: Option<String>,
    #[serde(default)]
    pub(crate) assignments: Vec<TeachingAssignment>,
}

impl UserProfile {
    /// Classroom a student belongs to; `None` for profiles without grade and class.
    pub(crate) fn classroom_id(&self) -> Option<String> {
        match (&self.grade, &self.class) {
            (Some(grade), Some(class)) if !self.school.is_empty() => {
                Some(classroom_id(&self.school, grade, class))
            }
            _ => None,
        }
    }

    pub(crate) fn teaches(&self, classroom: &str) -> bool {
        self.role == UserRole::Teacher
            && self.assignments.iter().any(|assignment| assignment.classroom_id() == classroom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleRow {
    pub(crate) session: String,
    pub(crate) time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sunday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) monday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) tuesday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) wednesday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thursday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) friday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) saturday: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClassroomSchedule {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) schedule: Vec<ScheduleRow>,
    pub(crate) uploaded_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) uploaded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Classroom {
    /// Empty when the classroom has no active schedule version.
    #[serde(default)]
    pub(crate) active_schedule_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Contributor {
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) status: ContributorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Explanation {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) subject: String,
    pub(crate) session: String,
    pub(crate) day: String,
    #[serde(default)]
    pub(crate) learning_outcome: String,
    #[serde(default)]
    pub(crate) concepts: String,
    pub(crate) contributors: Vec<Contributor>,
    #[serde(default)]
    pub(crate) completion_status: CompletionStatus,
    pub(crate) status: ExplanationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) explanation_date: OffsetDateTime,
    pub(crate) created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Invitation {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) explanation_id: String,
    pub(crate) subject: String,
    pub(crate) session: String,
    pub(crate) inviter_id: String,
    pub(crate) inviter_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeacherNotification {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) classroom_id: String,
    pub(crate) explanation_id: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) subject: String,
    pub(crate) session: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}
