use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRef, Query, State,
    },
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{LoginRequest, MessageResponse, PublicAccount, SignupRequest, VerifyEmailQuery},
    jwt::JwtKeys,
    services::{self, VerifyOutcome},
    session::{clear_session_cookie, session_cookie},
};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/create-account", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/verify-email", get(verify_email))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublicAccount>)> {
    let Json(payload) = payload?;
    let account = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(PublicAccount::from(&account))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<PublicAccount>)> {
    let Json(payload) = payload?;
    let account = services::authenticate(&state, payload).await?;

    let token = JwtKeys::from_ref(&state)
        .issue(account.id)
        .map_err(|e| ApiError::Dependency(anyhow::anyhow!(e)))?;
    let cookie = session_cookie(&state.config, &token)
        .map_err(|e| ApiError::Dependency(anyhow::anyhow!(e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    info!(account_id = %account.id, "logged in");
    Ok((headers, Json(PublicAccount::from(&account))))
}

/// Clears the session cookie and sends the browser home.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&state.config) {
        headers.insert(SET_COOKIE, cookie);
    }
    (headers, Redirect::to("/"))
}

#[instrument(skip(state, query))]
pub async fn verify_email(
    State(state): State<AppState>,
    query: Result<Query<VerifyEmailQuery>, QueryRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Query(query) = query?;
    let message = match services::verify_email(&state, query.token.as_deref()).await? {
        VerifyOutcome::Verified => "Email verified",
        VerifyOutcome::AlreadyVerified => "Email already verified",
    };
    Ok(Json(MessageResponse { message }))
}
