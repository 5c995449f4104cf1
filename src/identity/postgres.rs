use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{
    check_bulk_size, normalize_email, Account, AccountPage, IdentityError, IdentityStore,
    NewAccount,
};
use crate::core::time::now_utc;

const COLUMNS: &str =
    "uid, email, display_name, hashed_password, custom_claims, disabled, created_at";

#[derive(Debug, FromRow)]
struct AccountRow {
    uid: String,
    email: String,
    display_name: String,
    hashed_password: String,
    custom_claims: Json<Map<String, Value>>,
    disabled: bool,
    created_at: OffsetDateTime,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            uid: row.uid,
            email: row.email,
            display_name: row.display_name,
            hashed_password: row.hashed_password,
            custom_claims: row.custom_claims.0,
            disabled: row.disabled,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub(crate) struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError> {
        sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO accounts (uid, email, display_name, hashed_password, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        ))
        .bind(&account.uid)
        .bind(normalize_email(&account.email))
        .bind(&account.display_name)
        .bind(&account.hashed_password)
        .bind(now_utc())
        .fetch_one(&self.pool)
        .await
        .map(Account::from)
        .map_err(|err| {
            if is_unique_violation(&err) {
                IdentityError::EmailExists
            } else {
                IdentityError::Database(err)
            }
        })
    }

    async fn get_account(&self, uid: &str) -> Result<Option<Account>, IdentityError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE uid = $1"
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, IdentityError> {
        let page_size = page_size.max(1);
        // One extra row tells whether another page exists.
        let fetch = i64::try_from(page_size).unwrap_or(i64::MAX).saturating_add(1);
        let mut rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {COLUMNS} FROM accounts
             WHERE ($1::text IS NULL OR uid > $1)
             ORDER BY uid
             LIMIT $2"
        ))
        .bind(page_token)
        .bind(fetch)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        let accounts: Vec<Account> = rows.into_iter().map(Account::from).collect();
        let next_page_token =
            if has_more { accounts.last().map(|account| account.uid.clone()) } else { None };

        Ok(AccountPage { accounts, next_page_token })
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        let result =
            sqlx::query("DELETE FROM accounts WHERE uid = $1").bind(uid).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound(uid.to_string()));
        }
        Ok(())
    }

    async fn delete_accounts(&self, uids: &[String]) -> Result<usize, IdentityError> {
        check_bulk_size(uids)?;
        if uids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM accounts WHERE uid = ANY($1)")
            .bind(uids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn set_custom_claims(
        &self,
        uid: &str,
        claims: Map<String, Value>,
    ) -> Result<(), IdentityError> {
        let result = sqlx::query("UPDATE accounts SET custom_claims = $2 WHERE uid = $1")
            .bind(uid)
            .bind(Json(claims))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound(uid.to_string()));
        }
        Ok(())
    }

    async fn health(&self) -> Result<(), IdentityError> {
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
