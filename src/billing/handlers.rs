use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::{info, instrument, warn};

use super::{event::parse_event, reconciler::reconcile, signature::WebhookVerifier};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/stripe", post(stripe_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Rejects only bad signatures and unparseable payloads. Anything that gets
/// past both is acknowledged, whatever the reconciler made of it.
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("webhook without signature header");
            ApiError::Signature
        })?;
    WebhookVerifier::new(&state.config.webhook_secret)
        .verify(&body, signature)
        .map_err(|e| {
            warn!(reason = %e, "webhook signature rejected");
            ApiError::Signature
        })?;

    let delivery = parse_event(&body).map_err(|e| {
        warn!(error = %e, "unparseable webhook payload");
        ApiError::validation("Malformed event payload")
    })?;

    let outcome = reconcile(state.store.as_ref(), &delivery.event).await;
    info!(event_id = %delivery.id, kind = delivery.event.kind(), ?outcome, "webhook handled");
    Ok(StatusCode::OK)
}
