pub mod bloqueos;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /bloqueos                       list, create
/// /bloqueos/{id}                  get, update, delete
/// /bloqueos/validar-conflicto     single-interval conflict check (POST)
/// /bloqueos/validar               check-only run of a full draft (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/bloqueos", bloqueos::router())
}
