pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod classrooms;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod invitations;
pub(crate) mod router;
pub(crate) mod users;
pub(crate) mod validation;
