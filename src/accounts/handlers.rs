use axum::{
    extract::{rejection::JsonRejection, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{EntitlementResponse, HomeView, PlansView, ProfileResponse},
    repo_types::{Plan, ProfileUpdate},
};
use crate::{
    auth::{
        extractors::{CurrentAccount, MaybeAccount},
        session::{api_session, browser_session, require_plan, soft_session},
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Route groups by session mode. The state is needed up front because the
/// session layers resolve accounts through it.
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(home))
        .route("/plans", get(plans))
        .layer(from_fn_with_state(state.clone(), soft_session));

    let browser = Router::new()
        .route("/account", get(account_page))
        .layer(from_fn_with_state(state.clone(), browser_session));

    let pro = Router::new()
        .route("/api/pro/status", get(pro_status))
        .layer(from_fn_with_state(Plan::Pro, require_plan));

    let api = Router::new()
        .route("/api/me", get(get_me).patch(update_me))
        .merge(pro)
        .layer(from_fn_with_state(state.clone(), api_session));

    public.merge(browser).merge(api)
}

pub async fn home(MaybeAccount(account): MaybeAccount) -> Json<HomeView> {
    Json(HomeView {
        logged_in: account.is_some(),
        user: account.map(ProfileResponse::from),
    })
}

pub async fn plans(MaybeAccount(account): MaybeAccount) -> Json<PlansView> {
    Json(PlansView {
        logged_in: account.is_some(),
        current_plan: account.map(|a| a.plan),
        plans: [Plan::Free, Plan::Pro],
    })
}

pub async fn account_page(CurrentAccount(account): CurrentAccount) -> Json<ProfileResponse> {
    Json(account.into())
}

pub async fn get_me(CurrentAccount(account): CurrentAccount) -> Json<ProfileResponse> {
    Json(account.into())
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    update: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<ProfileResponse>> {
    let Json(update) = update?;
    let update = ProfileUpdate {
        first_name: update.first_name.map(|v| v.trim().to_string()),
        last_name: update.last_name.map(|v| v.trim().to_string()),
    };
    if update.first_name.as_deref() == Some("") || update.last_name.as_deref() == Some("") {
        return Err(ApiError::validation("Names cannot be blank"));
    }
    let updated = state.store.update_profile(account.id, update).await?;
    info!(account_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}

pub async fn pro_status(CurrentAccount(account): CurrentAccount) -> Json<EntitlementResponse> {
    Json(EntitlementResponse {
        plan: account.plan,
        linked_to_billing: account.payment_customer_ref.is_some(),
    })
}
