pub mod event;
pub mod handlers;
pub mod reconciler;
pub mod signature;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::billing_routes()
}
