//! Cookie session gate.
//!
//! Each request walks `extract -> validate -> resolve -> attach`. Any failed
//! step leaves the request `Anonymous`; what happens next depends on the mode
//! of the route group:
//!
//! - `Soft`: the request continues without identity.
//! - `Api`: JSON 401, the handler never runs.
//! - `Browser`: 303 to `/login`, the handler never runs.
//!
//! Tokens are never refreshed and cookies never rewritten on this path.

use axum::{
    extract::{FromRef, Request, State},
    http::{header::InvalidHeaderValue, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, error};

use super::extractors::CurrentAccount;
use super::jwt::JwtKeys;
use crate::accounts::repo::StoreError;
use crate::accounts::repo_types::{Account, Plan};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "auth_token";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone)]
pub enum SessionState {
    Anonymous,
    Authenticated(Account),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Soft,
    Api,
    Browser,
}

pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else { continue };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else { continue };
            if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> SessionState {
    let Some(token) = extract_session_token(headers) else {
        return SessionState::Anonymous;
    };

    let account_id = match JwtKeys::from_ref(state).verify(&token) {
        Ok(id) => id,
        Err(e) => {
            debug!(reason = %e, "session token rejected");
            return SessionState::Anonymous;
        }
    };

    match state.store.get_by_id(account_id).await {
        Ok(account) => SessionState::Authenticated(account),
        Err(StoreError::NotFound) => {
            debug!(%account_id, "session for missing account");
            SessionState::Anonymous
        }
        Err(e) => {
            error!(error = %e, %account_id, "session account lookup failed");
            SessionState::Anonymous
        }
    }
}

async fn gate(mode: SessionMode, state: AppState, mut request: Request, next: Next) -> Response {
    let session = resolve_session(&state, request.headers()).await;
    match session {
        SessionState::Authenticated(account) => {
            request.extensions_mut().insert(CurrentAccount(account));
            next.run(request).await
        }
        SessionState::Anonymous => match mode {
            SessionMode::Soft => next.run(request).await,
            SessionMode::Api => ApiError::Authentication("Unauthorized").into_response(),
            SessionMode::Browser => Redirect::to(LOGIN_PATH).into_response(),
        },
    }
}

pub async fn soft_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(SessionMode::Soft, state, request, next).await
}

pub async fn api_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(SessionMode::Api, state, request, next).await
}

pub async fn browser_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    gate(SessionMode::Browser, state, request, next).await
}

/// Plan gate; layer it inside a hard-mode session layer.
pub async fn require_plan(State(plan): State<Plan>, request: Request, next: Next) -> Response {
    let rejection = match request.extensions().get::<CurrentAccount>() {
        None => Some(ApiError::Authentication("Unauthorized")),
        Some(CurrentAccount(account)) if account.plan != plan => {
            debug!(account_id = %account.id, have = %account.plan, need = %plan, "plan gate");
            Some(ApiError::PaymentRequired)
        }
        Some(_) => None,
    };
    match rejection {
        Some(e) => e.into_response(),
        None => next.run(request).await,
    }
}

fn cookie_attributes(config: &AppConfig) -> &'static str {
    if config.production {
        "Path=/; HttpOnly; SameSite=None; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Strict"
    }
}

pub fn session_cookie(config: &AppConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.session_ttl().as_secs();
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; {}; Max-Age={max_age}",
        cookie_attributes(config)
    ))
}

pub fn clear_session_cookie(config: &AppConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}=; {}; Max-Age=0",
        cookie_attributes(config)
    ))
}
