use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Account, Plan, Role};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub plan: Plan,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Account> for ProfileResponse {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            username: a.username,
            email: a.email,
            first_name: a.first_name,
            last_name: a.last_name,
            email_verified: a.email_verified,
            plan: a.plan,
            role: a.role,
            created_at: a.created_at,
        }
    }
}

/// Logged-in or logged-out view of the landing page.
#[derive(Debug, Serialize)]
pub struct HomeView {
    pub logged_in: bool,
    pub user: Option<ProfileResponse>,
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub plan: Plan,
    pub linked_to_billing: bool,
}

/// Pricing page; `current_plan` is only set for a signed-in visitor.
#[derive(Debug, Serialize)]
pub struct PlansView {
    pub logged_in: bool,
    pub current_plan: Option<Plan>,
    pub plans: [Plan; 2],
}
