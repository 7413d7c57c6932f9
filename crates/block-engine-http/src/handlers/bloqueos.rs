//! Handlers for the `/bloqueos` resource.
//!
//! Writes go through the engine's validate → conflict check → commit chain.
//! A transient store error (a concurrent write on the same resource, or an
//! unreachable store) is retried once from the top; a second failure reaches
//! the client as 503.

use std::future::Future;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use block_engine::ical::block_rrule_text;
use block_engine::{Block, BlockDraft, BlockPatch, BlockQuery, Deadline, SchedulingError};
use serde::Deserialize;
use uuid::Uuid;

use crate::dto::{
    BloqueoDto, BloqueoInput, BloqueoPatch, ConflictoDto, ListaQuery, ValidarConflictoDto,
    ValidarConflictoInput,
};
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Header carrying the acting user, recorded as the block's creator.
pub const ACTOR_HEADER: &str = "x-user-id";
const DEFAULT_ACTOR: &str = "system";

/// GET /api/v1/bloqueos
///
/// Blocks with at least one occurrence in `[fechaInicio, fechaFin)`, each with
/// those occurrences. Either bound may be omitted.
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListaQuery>, QueryRejection>,
) -> AppResult<Json<DataResponse<Vec<BloqueoDto>>>> {
    let Query(params) = query?;
    let deadline = request_deadline(&state);
    let query = BlockQuery {
        window: params.window(),
        filter: params.filter(),
    };

    let visible = state.service.list(&query, &deadline).await?;
    let zones = &state.service.config().zones;
    let data = visible
        .iter()
        .map(|v| {
            BloqueoDto::with_occurrences(
                v,
                &state.directory,
                block_rrule_text(&v.block.definition, zones),
            )
        })
        .collect();
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/bloqueos/{id}
pub async fn get_one(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<DataResponse<BloqueoDto>>> {
    let Path(id) = id?;
    let block = state.service.get(id).await?;
    Ok(Json(DataResponse {
        data: to_dto(&state, &block),
    }))
}

/// POST /api/v1/bloqueos
///
/// Returns 201 with the stored block, 409 with every conflicting occurrence,
/// or 400 naming the invalid field.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BloqueoInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<BloqueoDto>>)> {
    let Json(input) = payload?;
    let actor = actor(&headers);
    let deadline = request_deadline(&state);
    let draft = BlockDraft::from(input);

    let block = retry_transient("create", || {
        state.service.create(draft.clone(), &actor, &deadline)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: to_dto(&state, &block),
        }),
    ))
}

/// PUT /api/v1/bloqueos/{id}
///
/// Partial update. The block's own previous occurrences never count as
/// conflicts; on rejection the stored block is left unchanged.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<BloqueoPatch>, JsonRejection>,
) -> AppResult<Json<DataResponse<BloqueoDto>>> {
    let Path(id) = id?;
    let Json(input) = payload?;
    let actor = actor(&headers);
    let deadline = request_deadline(&state);
    let patch = BlockPatch::from(input);

    let block = retry_transient("update", || {
        state.service.update(id, patch.clone(), &actor, &deadline)
    })
    .await?;

    Ok(Json(DataResponse {
        data: to_dto(&state, &block),
    }))
}

/// DELETE /api/v1/bloqueos/{id}
pub async fn delete(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = id?;
    retry_transient("delete", || state.service.delete(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/bloqueos/validar-conflicto
///
/// Single-interval pre-submit check. Never expands recurrence, never writes.
pub async fn validar_conflicto(
    State(state): State<AppState>,
    payload: Result<Json<ValidarConflictoInput>, JsonRejection>,
) -> AppResult<Json<DataResponse<ValidarConflictoDto>>> {
    let Json(input) = payload?;
    let report = state
        .service
        .check_conflict(&input.resource(), input.window())
        .await?;

    let citas: Vec<String> = report
        .appointment_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(Json(DataResponse {
        data: ValidarConflictoDto {
            tiene_conflicto: report.has_conflict,
            citas_conflictivas: report.has_conflict.then_some(citas),
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidarQuery {
    /// Block being edited; its own occurrences are ignored.
    pub excluir_id: Option<Uuid>,
}

/// Full check-only result for a possibly recurring draft.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidarBloqueoDto {
    pub tiene_conflicto: bool,
    pub citas_conflictivas: Vec<String>,
    pub conflictos: Vec<ConflictoDto>,
}

/// POST /api/v1/bloqueos/validar
///
/// Runs the same validation and expansion-based conflict check as a create,
/// without committing. `?excluirId=` checks an edit of an existing block.
pub async fn validar(
    State(state): State<AppState>,
    query: Result<Query<ValidarQuery>, QueryRejection>,
    payload: Result<Json<BloqueoInput>, JsonRejection>,
) -> AppResult<Json<DataResponse<ValidarBloqueoDto>>> {
    let Query(params) = query?;
    let Json(input) = payload?;
    let deadline = request_deadline(&state);

    let report = state
        .service
        .check_block(BlockDraft::from(input), params.excluir_id, &deadline)
        .await?;

    Ok(Json(DataResponse {
        data: ValidarBloqueoDto {
            tiene_conflicto: report.has_conflict,
            citas_conflictivas: report
                .appointment_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            conflictos: report.conflicts.iter().map(ConflictoDto::from).collect(),
        },
    }))
}

fn to_dto(state: &AppState, block: &Block) -> BloqueoDto {
    let rrule = block_rrule_text(&block.definition, &state.service.config().zones);
    BloqueoDto::new(block, &state.directory, rrule)
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

/// Expansion budget for one request, matching the HTTP timeout.
fn request_deadline(state: &AppState) -> Deadline {
    Deadline::after(Duration::from_secs(state.config.request_timeout_secs))
}

async fn retry_transient<T, F, Fut>(operation: &'static str, mut run: F) -> Result<T, SchedulingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SchedulingError>>,
{
    match run().await {
        Err(err) if err.is_transient() => {
            tracing::warn!(operation, error = %err, "Transient store error, retrying once");
            run().await
        }
        other => other,
    }
}
