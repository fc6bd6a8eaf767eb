use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::ContactResponse,
    repo_types::{ContactUpdate, NewContact},
};
use crate::{
    auth::{extractors::CurrentAccount, session::browser_session},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Contact routes. All of them need a browser session; anonymous requests are
/// redirected to the login page before any lookup happens.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/contacts", get(list_contacts))
        .route("/contacts/new", post(create_contact))
        .route(
            "/contacts/:id",
            get(get_contact).patch(update_contact).delete(delete_contact),
        )
        .layer(from_fn_with_state(state.clone(), browser_session))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ApiResult<Json<Vec<ContactResponse>>> {
    let contacts = state.contacts.list_for_owner(account.id).await?;
    Ok(Json(contacts.into_iter().map(ContactResponse::from).collect()))
}

#[instrument(skip_all)]
pub async fn create_contact(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    payload: Result<Json<NewContact>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ContactResponse>)> {
    let Json(payload) = payload?;
    let new = NewContact {
        name: payload.name.trim().to_string(),
        email: blank_to_none(payload.email),
        phone: blank_to_none(payload.phone),
        company: blank_to_none(payload.company),
        position: blank_to_none(payload.position),
        notes: blank_to_none(payload.notes),
    };
    if new.name.is_empty() {
        return Err(ApiError::validation("Contact name is required"));
    }
    let contact = state.contacts.create(account.id, new).await?;
    info!(account_id = %account.id, contact_id = contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact.into())))
}

pub async fn get_contact(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let contact = state.contacts.get_for_owner(account.id, id).await?;
    Ok(Json(contact.into()))
}

#[instrument(skip_all)]
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    id: Result<Path<i64>, PathRejection>,
    update: Result<Json<ContactUpdate>, JsonRejection>,
) -> ApiResult<Json<ContactResponse>> {
    let Path(id) = id?;
    let Json(update) = update?;
    let name = update.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(ApiError::validation("Contact name is required"));
    }
    let update = ContactUpdate {
        name,
        email: blank_to_none(update.email),
        phone: blank_to_none(update.phone),
        company: blank_to_none(update.company),
        position: blank_to_none(update.position),
        notes: blank_to_none(update.notes),
    };
    let contact = state.contacts.update_for_owner(account.id, id, update).await?;
    Ok(Json(contact.into()))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.contacts.delete_for_owner(account.id, id).await?;
    info!(account_id = %account.id, contact_id = id, "contact deleted");
    Ok(StatusCode::NO_CONTENT)
}
