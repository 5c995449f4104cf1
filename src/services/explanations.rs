use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::core::time::now_utc;
use crate::db::models::{Contributor, Explanation, Invitation, TeacherNotification, UserProfile};
use crate::db::types::{CompletionStatus, ContributorStatus, ExplanationStatus, UserRole};
use crate::repositories::{explanations, invitations, new_id, notifications, paths, users};
use crate::services::bulk_delete::{delete_collection, DEFAULT_BATCH_SIZE};
use crate::services::{ServiceError, ServiceResult};
use crate::store::{DocumentStore, WriteBatch};

#[derive(Debug, Clone)]
pub(crate) struct NewExplanation {
    pub(crate) subject: String,
    pub(crate) session: String,
    pub(crate) day: String,
    pub(crate) learning_outcome: String,
    pub(crate) concepts: String,
    pub(crate) explanation_date: OffsetDateTime,
    pub(crate) invitees: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CommittedExplanation {
    pub(crate) explanation: Explanation,
    pub(crate) invitations_sent: usize,
    pub(crate) teachers_notified: usize,
}

/// Resolves the invitee uids. Only students of the same classroom can be invited.
async fn load_invitees(
    store: &dyn DocumentStore,
    classroom_id: &str,
    author: &UserProfile,
    invitees: &[String],
) -> ServiceResult<Vec<UserProfile>> {
    let mut seen = HashSet::new();
    let mut profiles = Vec::with_capacity(invitees.len());
    for uid in invitees {
        if uid == &author.uid {
            return Err(ServiceError::Validation("You cannot invite yourself".to_string()));
        }
        if !seen.insert(uid.as_str()) {
            return Err(ServiceError::Validation(format!("User {uid} is invited twice")));
        }
        let profile = users::find(store, uid)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invited user {uid} not found")))?;
        let classmate = profile.role == UserRole::Student
            && profile.classroom_id().as_deref() == Some(classroom_id);
        if !classmate {
            return Err(ServiceError::Validation(format!(
                "User {uid} is not a student of this classroom"
            )));
        }
        profiles.push(profile);
    }
    Ok(profiles)
}

/// Records a commitment to explain a topic. The explanation, one invitation per invitee and one
/// notification per teacher of the classroom are written in a single batch.
pub(crate) async fn commit_explanation(
    store: &dyn DocumentStore,
    classroom_id: &str,
    author: &UserProfile,
    payload: NewExplanation,
) -> ServiceResult<CommittedExplanation> {
    if payload.subject.trim().is_empty() || payload.session.trim().is_empty() {
        return Err(ServiceError::Validation("Subject and session are required".to_string()));
    }

    let invitees = load_invitees(store, classroom_id, author, &payload.invitees).await?;
    let teachers = users::teachers_of(store, classroom_id).await?;
    let now = now_utc();

    let mut contributors = vec![Contributor {
        user_id: author.uid.clone(),
        user_name: author.name.clone(),
        status: ContributorStatus::Accepted,
    }];
    contributors.extend(invitees.iter().map(|invitee| Contributor {
        user_id: invitee.uid.clone(),
        user_name: invitee.name.clone(),
        status: ContributorStatus::Pending,
    }));

    let explanation = Explanation {
        id: new_id(),
        subject: payload.subject,
        session: payload.session,
        day: payload.day,
        learning_outcome: payload.learning_outcome,
        concepts: payload.concepts,
        contributors,
        completion_status: CompletionStatus::Unmarked,
        status: ExplanationStatus::Upcoming,
        explanation_date: payload.explanation_date,
        created_by: author.uid.clone(),
        created_at: now,
    };

    let mut batch = WriteBatch::new();
    explanations::put(&mut batch, classroom_id, &explanation)?;
    for invitee in &invitees {
        let invitation = Invitation {
            id: new_id(),
            classroom_id: classroom_id.to_string(),
            explanation_id: explanation.id.clone(),
            subject: explanation.subject.clone(),
            session: explanation.session.clone(),
            inviter_id: author.uid.clone(),
            inviter_name: author.name.clone(),
            created_at: now,
        };
        invitations::put(&mut batch, &invitee.uid, &invitation)?;
    }
    for teacher in &teachers {
        let notification = TeacherNotification {
            id: new_id(),
            classroom_id: classroom_id.to_string(),
            explanation_id: explanation.id.clone(),
            student_id: author.uid.clone(),
            student_name: author.name.clone(),
            subject: explanation.subject.clone(),
            session: explanation.session.clone(),
            created_at: now,
        };
        notifications::put(&mut batch, &teacher.uid, &notification)?;
    }
    store.commit(batch).await?;

    tracing::info!(
        classroom_id,
        explanation_id = %explanation.id,
        invitees = invitees.len(),
        teachers = teachers.len(),
        "Explanation committed"
    );
    Ok(CommittedExplanation {
        explanation,
        invitations_sent: invitees.len(),
        teachers_notified: teachers.len(),
    })
}

/// Explanations of a classroom, soonest first.
pub(crate) async fn list(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> ServiceResult<Vec<Explanation>> {
    let mut items = explanations::list(store, classroom_id).await?;
    items.sort_by(|a, b| {
        a.explanation_date.cmp(&b.explanation_date).then_with(|| a.session.cmp(&b.session))
    });
    Ok(items)
}

/// Records whether the explanation took place. Returns the updated explanation.
pub(crate) async fn set_completion_status(
    store: &dyn DocumentStore,
    classroom_id: &str,
    explanation_id: &str,
    completion: CompletionStatus,
) -> ServiceResult<Explanation> {
    let mut explanation = explanations::find(store, classroom_id, explanation_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Explanation not found".to_string()))?;

    let mut fields = Map::new();
    fields.insert("completionStatus".to_string(), Value::String(completion.as_str().to_string()));
    let mut batch = WriteBatch::new();
    batch.update(paths::explanation(classroom_id, explanation_id)?, fields);
    store.commit(batch).await?;

    explanation.completion_status = completion;
    tracing::info!(
        classroom_id,
        explanation_id,
        completion = completion.as_str(),
        "Explanation completion marked"
    );
    Ok(explanation)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectCount {
    pub(crate) subject: String,
    pub(crate) count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExplanationStats {
    pub(crate) total: usize,
    /// Most explained subject first.
    pub(crate) by_subject: Vec<SubjectCount>,
}

/// Explanations in the student's classroom that they took part in and that were marked as
/// explained. Profiles without a classroom have no statistics.
pub(crate) async fn explanation_stats(
    store: &dyn DocumentStore,
    profile: &UserProfile,
) -> ServiceResult<ExplanationStats> {
    let Some(classroom_id) = profile.classroom_id() else {
        return Ok(ExplanationStats::default());
    };

    let explained =
        explanations::list_with_completion(store, &classroom_id, CompletionStatus::Explained)
            .await?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for explanation in explained {
        let took_part = explanation.contributors.iter().any(|contributor| {
            contributor.user_id == profile.uid && contributor.status == ContributorStatus::Accepted
        });
        if took_part {
            *counts.entry(explanation.subject).or_default() += 1;
        }
    }

    let mut by_subject: Vec<SubjectCount> =
        counts.into_iter().map(|(subject, count)| SubjectCount { subject, count }).collect();
    by_subject.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.subject.cmp(&b.subject)));
    Ok(ExplanationStats { total: by_subject.iter().map(|entry| entry.count).sum(), by_subject })
}

pub(crate) async fn delete_all_explanations(
    store: &dyn DocumentStore,
    classroom_id: &str,
) -> ServiceResult<usize> {
    let deleted =
        delete_collection(store, &paths::explanations(classroom_id)?, DEFAULT_BATCH_SIZE).await?;
    tracing::info!(classroom_id, deleted, "Explanations cleared");
    Ok(deleted)
}
