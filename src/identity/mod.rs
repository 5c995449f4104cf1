//! Authentication accounts, kept apart from profile documents.

pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

/// Upper bound on the number of uids a single bulk delete may carry.
pub(crate) const MAX_BULK_DELETE: usize = 500;

#[derive(Debug, Error)]
pub(crate) enum IdentityError {
    #[error("an account with this email already exists")]
    EmailExists,
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("bulk delete of {size} accounts exceeds the limit of {limit}")]
    TooManyAccounts { size: usize, limit: usize },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Account {
    pub(crate) uid: String,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) hashed_password: String,
    pub(crate) custom_claims: Map<String, Value>,
    pub(crate) disabled: bool,
    pub(crate) created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAccount {
    pub(crate) uid: String,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) hashed_password: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AccountPage {
    pub(crate) accounts: Vec<Account>,
    /// Pass back to `list_accounts` to continue; `None` once the listing is exhausted.
    pub(crate) next_page_token: Option<String>,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_bulk_size(uids: &[String]) -> Result<(), IdentityError> {
    if uids.len() > MAX_BULK_DELETE {
        return Err(IdentityError::TooManyAccounts { size: uids.len(), limit: MAX_BULK_DELETE });
    }
    Ok(())
}

#[async_trait]
pub(crate) trait IdentityStore: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError>;

    async fn get_account(&self, uid: &str) -> Result<Option<Account>, IdentityError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError>;

    /// Accounts ordered by uid, starting after `page_token`.
    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, IdentityError>;

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError>;

    /// Deletes up to [`MAX_BULK_DELETE`] accounts; unknown uids are skipped. Returns how many
    /// accounts were removed.
    async fn delete_accounts(&self, uids: &[String]) -> Result<usize, IdentityError>;

    async fn set_custom_claims(
        &self,
        uid: &str,
        claims: Map<String, Value>,
    ) -> Result<(), IdentityError>;

    async fn health(&self) -> Result<(), IdentityError>;
}
