pub mod auth;
pub mod health;
pub mod turn;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the API router.
///
/// `/healthz` is public (health probes shouldn't need a token); `/v1/turn`
/// is gated behind the `api_token_env` bearer-token middleware when one is
/// configured (see [`auth::require_api_token`]).
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/turn", post(turn::run_turn))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_token));

    Router::new()
        .route("/healthz", get(health::healthz))
        .merge(protected)
        .with_state(state)
}
