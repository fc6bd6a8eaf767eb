use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription tier gating feature access.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            other => anyhow::bail!("unknown plan {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Account record as used by the rest of the crate.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub token_issued_at: Option<OffsetDateTime>,
    pub plan: Plan,
    pub role: Role,
    #[serde(skip_serializing)]
    pub payment_customer_ref: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Raw `users` row; plan and role are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub token_issued_at: Option<OffsetDateTime>,
    pub plan: String,
    pub role: String,
    pub stripe_customer_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(r: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            password_hash: r.password_hash,
            email_verified: r.email_verified,
            verification_token: r.verification_token,
            token_issued_at: r.token_issued_at,
            plan: r.plan.parse()?,
            role: r.role.parse()?,
            payment_customer_ref: r.stripe_customer_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Input for `AccountStore::create_account`. Fields are already normalized.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    pub verification_token: String,
    pub token_issued_at: OffsetDateTime,
}

/// Editable profile fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// How a payment-provider event is matched to an account.
///
/// Checkout and invoice events arrive before the account is linked to a
/// provider customer, so they correlate by email. Later events correlate by
/// the stored provider reference, which survives email changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    ByEmail(String),
    ByProviderRef(String),
}

impl Correlation {
    pub fn by_email(email: &str) -> Self {
        Correlation::ByEmail(email.trim().to_lowercase())
    }

    pub fn by_provider_ref(customer_ref: &str) -> Self {
        Correlation::ByProviderRef(customer_ref.trim().to_string())
    }

    pub fn matches(&self, account: &Account) -> bool {
        match self {
            Correlation::ByEmail(email) => account.email == *email,
            Correlation::ByProviderRef(r) => account.payment_customer_ref.as_deref() == Some(r),
        }
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::ByEmail(email) => write!(f, "email:{email}"),
            Correlation::ByProviderRef(r) => write!(f, "customer:{r}"),
        }
    }
}

/// Result of linking a provider customer reference to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRefUpdate {
    Linked,
    /// Same reference already stored; re-delivery.
    Unchanged,
    /// A different reference is already stored; first write wins.
    AlreadyLinked,
}
