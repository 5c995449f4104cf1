use crate::store::{CollectionPath, DocumentPath, StoreError};

pub(crate) const USERS: &str = "users";
pub(crate) const CLASSROOMS: &str = "classrooms";
pub(crate) const SCHEDULES: &str = "schedules";
pub(crate) const EXPLANATIONS: &str = "explanations";
pub(crate) const INVITATIONS: &str = "invitations";
pub(crate) const NOTIFICATIONS: &str = "notifications";

pub(crate) fn users() -> Result<CollectionPath, StoreError> {
    CollectionPath::root(USERS)
}

pub(crate) fn user(uid: &str) -> Result<DocumentPath, StoreError> {
    users()?.doc(uid)
}

pub(crate) fn invitations(uid: &str) -> Result<CollectionPath, StoreError> {
    user(uid)?.collection(INVITATIONS)
}

pub(crate) fn invitation(uid: &str, invitation_id: &str) -> Result<DocumentPath, StoreError> {
    invitations(uid)?.doc(invitation_id)
}

pub(crate) fn notifications(uid: &str) -> Result<CollectionPath, StoreError> {
    user(uid)?.collection(NOTIFICATIONS)
}

pub(crate) fn notification(uid: &str, notification_id: &str) -> Result<DocumentPath, StoreError> {
    notifications(uid)?.doc(notification_id)
}

pub(crate) fn classrooms() -> Result<CollectionPath, StoreError> {
    CollectionPath::root(CLASSROOMS)
}

pub(crate) fn classroom(classroom_id: &str) -> Result<DocumentPath, StoreError> {
    classrooms()?.doc(classroom_id)
}

pub(crate) fn schedules(classroom_id: &str) -> Result<CollectionPath, StoreError> {
    classroom(classroom_id)?.collection(SCHEDULES)
}

pub(crate) fn schedule(classroom_id: &str, version_id: &str) -> Result<DocumentPath, StoreError> {
    schedules(classroom_id)?.doc(version_id)
}

pub(crate) fn explanations(classroom_id: &str) -> Result<CollectionPath, StoreError> {
    classroom(classroom_id)?.collection(EXPLANATIONS)
}

pub(crate) fn explanation(
    classroom_id: &str,
    explanation_id: &str,
) -> Result<DocumentPath, StoreError> {
    explanations(classroom_id)?.doc(explanation_id)
}
