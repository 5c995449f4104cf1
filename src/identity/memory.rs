use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{
    check_bulk_size, normalize_email, Account, AccountPage, IdentityError, IdentityStore,
    NewAccount,
};
use crate::core::time::now_utc;

#[derive(Default)]
pub(crate) struct MemoryIdentityStore {
    accounts: RwLock<BTreeMap<String, Account>>,
    fail_deletes: AtomicBool,
}

impl MemoryIdentityStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent single-account delete fail with a backend error.
    #[cfg(test)]
    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError> {
        let mut accounts = self.accounts.write().await;
        let email = normalize_email(&account.email);
        if accounts.values().any(|existing| existing.email == email) {
            return Err(IdentityError::EmailExists);
        }

        let created = Account {
            uid: account.uid,
            email,
            display_name: account.display_name,
            hashed_password: account.hashed_password,
            custom_claims: Map::new(),
            disabled: false,
            created_at: now_utc(),
        };
        accounts.insert(created.uid.clone(), created.clone());
        Ok(created)
    }

    async fn get_account(&self, uid: &str) -> Result<Option<Account>, IdentityError> {
        Ok(self.accounts.read().await.get(uid).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, IdentityError> {
        let email = normalize_email(email);
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|account| account.email == email).cloned())
    }

    async fn list_accounts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<AccountPage, IdentityError> {
        let accounts = self.accounts.read().await;
        let page_size = page_size.max(1);
        let mut remaining = accounts
            .iter()
            .filter(|(uid, _)| page_token.map_or(true, |token| uid.as_str() > token))
            .map(|(_, account)| account.clone());

        let page: Vec<Account> = remaining.by_ref().take(page_size).collect();
        let next_page_token = match remaining.next() {
            Some(_) => page.last().map(|account| account.uid.clone()),
            None => None,
        };
        Ok(AccountPage { accounts: page, next_page_token })
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(IdentityError::Database(sqlx::Error::PoolTimedOut));
        }
        match self.accounts.write().await.remove(uid) {
            Some(_) => Ok(()),
            None => Err(IdentityError::NotFound(uid.to_string())),
        }
    }

    async fn delete_accounts(&self, uids: &[String]) -> Result<usize, IdentityError> {
        check_bulk_size(uids)?;
        let targets: HashSet<&str> = uids.iter().map(String::as_str).collect();
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|uid, _| !targets.contains(uid.as_str()));
        Ok(before - accounts.len())
    }

    async fn set_custom_claims(
        &self,
        uid: &str,
        claims: Map<String, Value>,
    ) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.write().await;
        let account =
            accounts.get_mut(uid).ok_or_else(|| IdentityError::NotFound(uid.to_string()))?;
        account.custom_claims = claims;
        Ok(())
    }

    async fn health(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::identity::MAX_BULK_DELETE;

    fn new_account(uid: &str, email: &str) -> NewAccount {
        NewAccount {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: uid.to_string(),
            hashed_password: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_email_case_insensitively() {
        let store = MemoryIdentityStore::new();
        store.create_account(new_account("u1", "Ada@School.org")).await.unwrap();

        let err = store.create_account(new_account("u2", "ada@school.org ")).await.unwrap_err();
        assert!(matches!(err, IdentityError::EmailExists));

        let found = store.find_by_email("ADA@school.org").await.unwrap().unwrap();
        assert_eq!(found.uid, "u1");
    }

    #[tokio::test]
    async fn pages_through_accounts_in_uid_order() {
        let store = MemoryIdentityStore::new();
        for uid in ["u3", "u1", "u2"] {
            store.create_account(new_account(uid, &format!("{uid}@x.org"))).await.unwrap();
        }

        let first = store.list_accounts(2, None).await.unwrap();
        let uids: Vec<_> = first.accounts.iter().map(|a| a.uid.as_str()).collect();
        assert_eq!(uids, vec!["u1", "u2"]);
        assert_eq!(first.next_page_token.as_deref(), Some("u2"));

        let second = store.list_accounts(2, first.next_page_token.as_deref()).await.unwrap();
        assert_eq!(second.accounts.len(), 1);
        assert_eq!(second.accounts[0].uid, "u3");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn bulk_delete_skips_unknown_and_enforces_limit() {
        let store = MemoryIdentityStore::new();
        store.create_account(new_account("u1", "u1@x.org")).await.unwrap();
        store.create_account(new_account("u2", "u2@x.org")).await.unwrap();

        let deleted =
            store.delete_accounts(&["u1".to_string(), "ghost".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.len().await, 1);

        let too_many: Vec<String> = (0..=MAX_BULK_DELETE).map(|i| format!("u{i}")).collect();
        assert!(matches!(
            store.delete_accounts(&too_many).await,
            Err(IdentityError::TooManyAccounts { .. })
        ));
    }

    #[tokio::test]
    async fn custom_claims_replace_previous_set() {
        let store = MemoryIdentityStore::new();
        store.create_account(new_account("u1", "u1@x.org")).await.unwrap();

        let claims = json!({ "role": "teacher" }).as_object().cloned().unwrap();
        store.set_custom_claims("u1", claims.clone()).await.unwrap();
        assert_eq!(store.get_account("u1").await.unwrap().unwrap().custom_claims, claims);

        assert!(matches!(
            store.set_custom_claims("ghost", Map::new()).await,
            Err(IdentityError::NotFound(_))
        ));
    }
}
