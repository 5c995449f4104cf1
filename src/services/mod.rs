pub(crate) mod accounts;
pub(crate) mod bulk_delete;
pub(crate) mod explanations;
pub(crate) mod invitations;
pub(crate) mod schedule_analysis;
pub(crate) mod schedule_versions;
pub(crate) mod status_rollover;

use thiserror::Error;

use crate::core::security::SecurityError;
use crate::identity::IdentityError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Security(#[from] SecurityError),
}

pub(crate) type ServiceResult<T> = Result<T, ServiceError>;
