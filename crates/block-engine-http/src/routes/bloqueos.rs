//! Route definitions for the `/bloqueos` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::bloqueos;
use crate::state::AppState;

/// Routes mounted at `/bloqueos`.
///
/// ```text
/// GET    /                     -> list  (?fechaInicio&fechaFin&sedeId&recursoId&tipo)
/// POST   /                     -> create
/// GET    /{id}                 -> get_one
/// PUT    /{id}                 -> update
/// DELETE /{id}                 -> delete
/// POST   /validar-conflicto    -> validar_conflicto (single interval)
/// POST   /validar              -> validar (full draft, ?excluirId)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(bloqueos::list).post(bloqueos::create))
        .route("/validar-conflicto", post(bloqueos::validar_conflicto))
        .route("/validar", post(bloqueos::validar))
        .route(
            "/{id}",
            get(bloqueos::get_one)
                .put(bloqueos::update)
                .delete(bloqueos::delete),
        )
}
