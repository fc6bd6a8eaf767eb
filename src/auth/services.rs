use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::dto::{LoginRequest, SignupRequest};
use super::password::{hash_password, verify_password_or_dummy};
use super::verification::{generate_verification_token, is_token_stale};
use crate::accounts::repo::StoreError;
use crate::accounts::repo_types::{Account, NewAccount};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// Creates an unverified free account and mails its verification link.
///
/// A mail failure fails the request, but the account stays behind unverified
/// and is reclaimed by the sweeper.
pub async fn signup(state: &AppState, req: SignupRequest) -> ApiResult<Account> {
    let username = normalize(&req.username);
    let email = normalize(&req.email);

    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Missing required fields"));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password too short"));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("join hash task")??;

    let verification_token = generate_verification_token();
    let new = NewAccount {
        username,
        email,
        first_name: non_empty(req.first_name),
        last_name: non_empty(req.last_name),
        password_hash,
        verification_token: verification_token.clone(),
        token_issued_at: OffsetDateTime::now_utc(),
    };

    let account = state.store.create_account(new).await.map_err(|e| {
        match &e {
            StoreError::Conflict(field) => warn!(%field, "signup conflict"),
            _ => error!(error = %e, "create account failed"),
        }
        ApiError::from(e)
    })?;

    let link = state.config.verification_link(&verification_token);
    let name = account
        .first_name
        .clone()
        .unwrap_or_else(|| account.username.clone());
    state
        .mailer
        .send_verification(&account.email, &name, &link)
        .await
        .map_err(|e| {
            error!(error = %e, account_id = %account.id, "verification email failed");
            ApiError::Dependency(e.context("send verification email"))
        })?;

    info!(account_id = %account.id, email = %account.email, "account created");
    Ok(account)
}

pub async fn verify_email(state: &AppState, token: Option<&str>) -> ApiResult<VerifyOutcome> {
    let token = token.map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Err(ApiError::validation("Missing verification token"));
    }

    let account = match state.store.get_by_verification_token(token).await {
        Ok(a) => a,
        Err(StoreError::NotFound) => {
            warn!("unknown verification token");
            return Err(ApiError::validation("Invalid verification token"));
        }
        Err(e) => return Err(e.into()),
    };

    if account.email_verified {
        return Ok(VerifyOutcome::AlreadyVerified);
    }
    if is_token_stale(account.token_issued_at, OffsetDateTime::now_utc()) {
        warn!(account_id = %account.id, "stale verification token");
        return Err(ApiError::validation("Verification link expired"));
    }

    match state.store.mark_verified(account.id).await {
        Ok(true) => {
            info!(account_id = %account.id, "email verified");
            Ok(VerifyOutcome::Verified)
        }
        Ok(false) => Ok(VerifyOutcome::AlreadyVerified),
        Err(StoreError::NotFound) => Err(ApiError::validation("Invalid verification token")),
        Err(e) => Err(e.into()),
    }
}

/// Checks credentials. Unknown email and wrong password give the same error
/// after the same amount of hashing work.
pub async fn authenticate(state: &AppState, req: LoginRequest) -> ApiResult<Account> {
    let email = normalize(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Missing required fields"));
    }

    let account = match state.store.get_by_email(&email).await {
        Ok(a) => Some(a),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let hash = account.as_ref().map(|a| a.password_hash.clone());
    let password = req.password;
    let ok = tokio::task::spawn_blocking(move || verify_password_or_dummy(&password, hash.as_deref()))
        .await
        .context("join verify task")??;

    match account {
        Some(account) if ok => Ok(account),
        _ => {
            warn!(%email, "login rejected");
            Err(ApiError::Authentication("Invalid credentials"))
        }
    }
}
