use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::accounts::repo_types::{
    Account, AccountRow, Correlation, NewAccount, PaymentRefUpdate, Plan, ProfileUpdate, Role,
};

/// Which unique column a write collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
    PaymentRef,
}

impl ConflictField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictField::Email => "email",
            ConflictField::Username => "username",
            ConflictField::PaymentRef => "payment_customer_ref",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,
    #[error("{0} already taken")]
    Conflict(ConflictField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence contract for accounts.
///
/// Every read-modify-write is a single atomic operation on the implementation
/// side; callers never hold locks.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError>;
    async fn get_by_verification_token(&self, token: &str) -> Result<Account, StoreError>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Account, StoreError>;
    async fn update_payment_ref(
        &self,
        key: &Correlation,
        customer_ref: &str,
    ) -> Result<PaymentRefUpdate, StoreError>;
    /// Sets the plan and returns the plan the account had before.
    async fn set_plan(&self, key: &Correlation, plan: Plan) -> Result<Plan, StoreError>;
    /// Returns `false` when the account was already verified.
    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Deletes unverified accounts created before `cutoff`, returning the count.
    async fn delete_expired_unverified(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}

fn map_sqlx(e: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::RowNotFound = e {
        return StoreError::NotFound;
    }
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("username") => ConflictField::Username,
                Some(c) if c.contains("stripe_customer_id") => ConflictField::PaymentRef,
                _ => ConflictField::Email,
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context(what))
}

fn into_account(row: AccountRow) -> Result<Account, StoreError> {
    Account::try_from(row).map_err(StoreError::Backend)
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, sql: &str, key: &str, what: &'static str) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(sql)
            .bind(key)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_sqlx(e, what))?;
        into_account(row)
    }

    async fn find_by_key(&self, key: &Correlation) -> Result<Account, StoreError> {
        match key {
            Correlation::ByEmail(email) => self.get_by_email(email).await,
            Correlation::ByProviderRef(r) => {
                self.find_one(
                    r#"
                    SELECT id, username, email, first_name, last_name, password_hash,
                           email_verified, verification_token, token_issued_at,
                           plan, role, stripe_customer_id, created_at, updated_at
                    FROM users
                    WHERE stripe_customer_id = $1
                    "#,
                    r,
                    "find user by customer id",
                )
                .await
            }
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO users (username, email, first_name, last_name, password_hash,
                               verification_token, token_issued_at, plan, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, username, email, first_name, last_name, password_hash,
                      email_verified, verification_token, token_issued_at,
                      plan, role, stripe_customer_id, created_at, updated_at
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .bind(&new.verification_token)
        .bind(new.token_issued_at)
        .bind(Plan::Free.as_str())
        .bind(Role::User.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "insert user"))?;
        into_account(row)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, username, email, first_name, last_name, password_hash,
                   email_verified, verification_token, token_issued_at,
                   plan, role, stripe_customer_id, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "find user by id"))?;
        into_account(row)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.find_one(
            r#"
            SELECT id, username, email, first_name, last_name, password_hash,
                   email_verified, verification_token, token_issued_at,
                   plan, role, stripe_customer_id, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
            email,
            "find user by email",
        )
        .await
    }

    async fn get_by_verification_token(&self, token: &str) -> Result<Account, StoreError> {
        self.find_one(
            r#"
            SELECT id, username, email, first_name, last_name, password_hash,
                   email_verified, verification_token, token_issued_at,
                   plan, role, stripe_customer_id, created_at, updated_at
            FROM users
            WHERE verification_token = $1
            "#,
            token,
            "find user by verification token",
        )
        .await
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE users
               SET first_name = COALESCE($2, first_name),
                   last_name = COALESCE($3, last_name),
                   updated_at = now()
             WHERE id = $1
            RETURNING id, username, email, first_name, last_name, password_hash,
                      email_verified, verification_token, token_issued_at,
                      plan, role, stripe_customer_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.first_name)
        .bind(update.last_name)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "update profile"))?;
        into_account(row)
    }

    async fn update_payment_ref(
        &self,
        key: &Correlation,
        customer_ref: &str,
    ) -> Result<PaymentRefUpdate, StoreError> {
        let updated = match key {
            Correlation::ByEmail(email) => sqlx::query_scalar::<_, Uuid>(
                r#"
                UPDATE users
                   SET stripe_customer_id = $2, updated_at = now()
                 WHERE email = $1 AND stripe_customer_id IS NULL
                RETURNING id
                "#,
            )
            .bind(email)
            .bind(customer_ref)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_sqlx(e, "link customer id by email"))?,
            // Already keyed by the reference; nothing left to link.
            Correlation::ByProviderRef(_) => None,
        };
        if updated.is_some() {
            return Ok(PaymentRefUpdate::Linked);
        }

        let account = self.find_by_key(key).await?;
        match account.payment_customer_ref.as_deref() {
            Some(existing) if existing == customer_ref => Ok(PaymentRefUpdate::Unchanged),
            Some(_) => Ok(PaymentRefUpdate::AlreadyLinked),
            // Row changed between the update and the read.
            None => Err(StoreError::NotFound),
        }
    }

    async fn set_plan(&self, key: &Correlation, plan: Plan) -> Result<Plan, StoreError> {
        let (sql, value) = match key {
            Correlation::ByEmail(email) => (
                r#"
                UPDATE users u
                   SET plan = $2, updated_at = now()
                  FROM (SELECT id, plan AS previous FROM users WHERE email = $1 FOR UPDATE) p
                 WHERE u.id = p.id
                RETURNING p.previous
                "#,
                email,
            ),
            Correlation::ByProviderRef(r) => (
                r#"
                UPDATE users u
                   SET plan = $2, updated_at = now()
                  FROM (SELECT id, plan AS previous FROM users WHERE stripe_customer_id = $1 FOR UPDATE) p
                 WHERE u.id = p.id
                RETURNING p.previous
                "#,
                r,
            ),
        };
        let previous = sqlx::query_scalar::<_, String>(sql)
            .bind(value)
            .bind(plan.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_sqlx(e, "set plan"))?;
        previous.parse().map_err(StoreError::Backend)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError> {
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
               SET email_verified = true, updated_at = now()
             WHERE id = $1 AND email_verified = false
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx(e, "mark user verified"))?;
        if updated.is_some() {
            return Ok(true);
        }
        // Distinguish "already verified" from "gone".
        self.get_by_id(id).await.map(|_| false)
    }

    async fn delete_expired_unverified(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM users
             WHERE email_verified = false
               AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await
        .context("delete expired unverified users")?;
        Ok(res.rows_affected())
    }
}
