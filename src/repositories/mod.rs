pub(crate) mod classrooms;
pub(crate) mod explanations;
pub(crate) mod health;
pub(crate) mod invitations;
pub(crate) mod notifications;
pub(crate) mod paths;
pub(crate) mod schedules;
pub(crate) mod users;

use uuid::Uuid;

/// Fresh document id for store-assigned keys.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
