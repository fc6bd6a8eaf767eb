use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::accounts::repo::{AccountStore, ConflictField, StoreError};
use crate::accounts::repo_types::{
    Account, Correlation, NewAccount, PaymentRefUpdate, Plan, ProfileUpdate, Role,
};

/// In-process `AccountStore` for tests. A single mutex gives every operation
/// the same atomicity the Postgres statements have.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
    fail: Mutex<bool>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail.lock().unwrap() = unavailable;
    }

    pub fn insert(&self, account: Account) {
        self.accounts.lock().unwrap().push(account);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Account> {
        self.accounts.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    /// Mutate a stored account directly, e.g. to age it.
    pub fn with_account(&self, id: Uuid, f: impl FnOnce(&mut Account)) {
        if let Some(a) = self.accounts.lock().unwrap().iter_mut().find(|a| a.id == id) {
            f(a);
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if *self.fail.lock().unwrap() {
            return Err(StoreError::Backend(anyhow::anyhow!("store unavailable")));
        }
        Ok(())
    }

    fn find(&self, pred: impl Fn(&Account) -> bool) -> Result<Account, StoreError> {
        self.check()?;
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| pred(a))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|a| a.email == new.email) {
            return Err(StoreError::Conflict(ConflictField::Email));
        }
        if accounts.iter().any(|a| a.username == new.username) {
            return Err(StoreError::Conflict(ConflictField::Username));
        }
        let now = OffsetDateTime::now_utc();
        let account = Account {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            email_verified: false,
            verification_token: Some(new.verification_token),
            token_issued_at: Some(new.token_issued_at),
            plan: Plan::Free,
            role: Role::User,
            payment_customer_ref: None,
            created_at: now,
            updated_at: now,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        self.find(|a| a.id == id)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.find(|a| a.email == email)
    }

    async fn get_by_verification_token(&self, token: &str) -> Result<Account, StoreError> {
        self.find(|a| a.verification_token.as_deref() == Some(token))
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Account, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if update.first_name.is_some() {
            account.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            account.last_name = update.last_name;
        }
        account.updated_at = OffsetDateTime::now_utc();
        Ok(account.clone())
    }

    async fn update_payment_ref(
        &self,
        key: &Correlation,
        customer_ref: &str,
    ) -> Result<PaymentRefUpdate, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts
            .iter()
            .any(|a| a.payment_customer_ref.as_deref() == Some(customer_ref) && !key.matches(a))
        {
            return Err(StoreError::Conflict(ConflictField::PaymentRef));
        }
        let account = accounts
            .iter_mut()
            .find(|a| key.matches(a))
            .ok_or(StoreError::NotFound)?;
        match account.payment_customer_ref.as_deref() {
            None => {
                account.payment_customer_ref = Some(customer_ref.to_string());
                account.updated_at = OffsetDateTime::now_utc();
                Ok(PaymentRefUpdate::Linked)
            }
            Some(existing) if existing == customer_ref => Ok(PaymentRefUpdate::Unchanged),
            Some(_) => Ok(PaymentRefUpdate::AlreadyLinked),
        }
    }

    async fn set_plan(&self, key: &Correlation, plan: Plan) -> Result<Plan, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|a| key.matches(a))
            .ok_or(StoreError::NotFound)?;
        let previous = account.plan;
        account.plan = plan;
        account.updated_at = OffsetDateTime::now_utc();
        Ok(previous)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if account.email_verified {
            return Ok(false);
        }
        account.email_verified = true;
        account.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn delete_expired_unverified(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        self.check()?;
        let mut accounts = self.accounts.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|a| a.email_verified || a.created_at >= cutoff);
        Ok((before - accounts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            password_hash: "hash".into(),
            verification_token: format!("token-{username}"),
            token_issued_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_field_conflict() {
        let store = MemoryAccountStore::new();
        let first = store.create_account(new_account("ana", "ana@example.com")).await.unwrap();
        let err = store
            .create_account(new_account("other", "ana@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Email)));
        let err = store
            .create_account(new_account("ana", "ana2@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ConflictField::Username)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot(first.id).unwrap().email, "ana@example.com");
    }

    #[tokio::test]
    async fn payment_ref_first_write_wins() {
        let store = MemoryAccountStore::new();
        store.create_account(new_account("ana", "ana@example.com")).await.unwrap();
        let key = Correlation::by_email("ana@example.com");
        assert_eq!(store.update_payment_ref(&key, "cus_1").await.unwrap(), PaymentRefUpdate::Linked);
        assert_eq!(store.update_payment_ref(&key, "cus_1").await.unwrap(), PaymentRefUpdate::Unchanged);
        assert_eq!(
            store.update_payment_ref(&key, "cus_2").await.unwrap(),
            PaymentRefUpdate::AlreadyLinked
        );
    }

    #[tokio::test]
    async fn delete_keeps_verified_and_recent() {
        let store = MemoryAccountStore::new();
        let old = store.create_account(new_account("old", "old@example.com")).await.unwrap();
        let verified = store.create_account(new_account("ver", "ver@example.com")).await.unwrap();
        let fresh = store.create_account(new_account("new", "new@example.com")).await.unwrap();
        let past = OffsetDateTime::now_utc() - time::Duration::days(3);
        store.with_account(old.id, |a| a.created_at = past);
        store.with_account(verified.id, |a| {
            a.created_at = past;
            a.email_verified = true;
        });

        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(1);
        assert_eq!(store.delete_expired_unverified(cutoff).await.unwrap(), 1);
        assert!(store.snapshot(old.id).is_none());
        assert!(store.snapshot(verified.id).is_some());
        assert!(store.snapshot(fresh.id).is_some());
    }
}
