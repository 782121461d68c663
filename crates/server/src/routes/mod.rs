use axum::Router;

use crate::AppState;

pub mod addresses;
pub mod health;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(addresses::router(&state))
        .merge(health::router(&state));

    Router::new().nest("/api", api).with_state(state)
}
