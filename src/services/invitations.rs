use std::sync::Arc;

use serde_json::Map;

use crate::db::models::{Explanation, Invitation, TeacherNotification};
use crate::db::types::ContributorStatus;
use crate::repositories::{invitations, notifications, paths};
use crate::services::{ServiceError, ServiceResult};
use crate::store::{run_transaction, DocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InvitationResponse {
    pub(crate) invitation: Invitation,
    /// Status written for the responding user, `None` when they were no longer listed.
    pub(crate) status: Option<ContributorStatus>,
    pub(crate) invitation_removed: bool,
}

/// Applies `status` to the contributor entry of `uid`. Returns false when the user is not a
/// contributor.
fn set_contributor_status(
    explanation: &mut Explanation,
    uid: &str,
    status: ContributorStatus,
) -> bool {
    match explanation.contributors.iter_mut().find(|contributor| contributor.user_id == uid) {
        Some(contributor) => {
            contributor.status = status;
            true
        }
        None => false,
    }
}

/// Accepts or declines an invitation. The contributor status is written in an optimistic
/// transaction on the explanation; the invitation is removed afterwards on a best-effort basis.
pub(crate) async fn respond(
    store: &Arc<dyn DocumentStore>,
    max_attempts: u32,
    uid: &str,
    invitation_id: &str,
    accept: bool,
) -> ServiceResult<InvitationResponse> {
    let invitation = invitations::find(store.as_ref(), uid, invitation_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;

    let explanation_path =
        paths::explanation(&invitation.classroom_id, &invitation.explanation_id)?;
    let status = if accept { ContributorStatus::Accepted } else { ContributorStatus::Declined };

    let outcome = run_transaction(store.as_ref(), max_attempts, |mut tx| {
        let explanation_path = explanation_path.clone();
        async move {
            let Some(document) = tx.get(&explanation_path).await? else {
                return Ok((tx, None));
            };
            let mut explanation: Explanation = document.decode_with_id()?;
            if !set_contributor_status(&mut explanation, uid, status) {
                return Ok((tx, Some(None)));
            }

            let contributors =
                serde_json::to_value(&explanation.contributors).map_err(StoreError::Encode)?;
            let mut fields = Map::new();
            fields.insert("contributors".to_string(), contributors);
            tx.update(explanation_path, fields);
            Ok((tx, Some(Some(status))))
        }
    })
    .await?;

    let Some(status) = outcome else {
        tracing::warn!(
            classroom_id = %invitation.classroom_id,
            explanation_id = %invitation.explanation_id,
            "Invitation points at a missing explanation"
        );
        return Err(ServiceError::NotFound("Explanation not found".to_string()));
    };

    let invitation_removed = match invitations::delete(store.as_ref(), uid, invitation_id).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(invitation_id, error = %err, "Failed to remove answered invitation");
            false
        }
    };

    tracing::info!(
        classroom_id = %invitation.classroom_id,
        explanation_id = %invitation.explanation_id,
        accepted = accept,
        "Invitation answered"
    );
    Ok(InvitationResponse { invitation, status, invitation_removed })
}

pub(crate) async fn list_invitations(
    store: &dyn DocumentStore,
    uid: &str,
) -> ServiceResult<Vec<Invitation>> {
    let mut items = invitations::list(store, uid).await?;
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(items)
}

pub(crate) async fn list_notifications(
    store: &dyn DocumentStore,
    uid: &str,
) -> ServiceResult<Vec<TeacherNotification>> {
    Ok(notifications::list(store, uid).await?)
}

pub(crate) async fn dismiss_notification(
    store: &dyn DocumentStore,
    uid: &str,
    notification_id: &str,
) -> ServiceResult<()> {
    if !notifications::exists(store, uid, notification_id).await? {
        return Err(ServiceError::NotFound("Notification not found".to_string()));
    }
    notifications::delete(store, uid, notification_id).await?;
    Ok(())
}
