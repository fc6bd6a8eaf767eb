use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::accounts::repo_types::Account;
use crate::error::ApiError;

/// The authenticated account, placed in request extensions by the session
/// middleware. Rejects with 401 when the request is anonymous.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentAccount>()
            .cloned()
            .ok_or(ApiError::Authentication("Unauthorized"))
    }
}

/// Optional identity for soft-mode routes.
#[derive(Debug, Clone)]
pub struct MaybeAccount(pub Option<Account>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAccount
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAccount(
            parts.extensions.get::<CurrentAccount>().map(|c| c.0.clone()),
        ))
    }
}
