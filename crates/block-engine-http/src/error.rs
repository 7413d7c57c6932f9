use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use block_engine::{SchedulingError, StoreError};
use serde_json::json;

use crate::dto::ConflictoDto;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`SchedulingError`] for domain errors and adds request-decoding failures.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `block_engine`.
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// A request that could not be decoded, with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Scheduling(err) => match err {
                SchedulingError::InvalidRule(rule) => {
                    let body = json!({
                        "error": err.to_string(),
                        "code": "VALIDATION_ERROR",
                        "campo": wire_field(rule.field),
                    });
                    return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
                }
                SchedulingError::InvalidBlock { field, .. } => {
                    let body = json!({
                        "error": err.to_string(),
                        "code": "VALIDATION_ERROR",
                        "campo": wire_field(field),
                    });
                    return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
                }
                SchedulingError::ConflictFound(report) => {
                    let conflictos: Vec<ConflictoDto> =
                        report.conflicts.iter().map(ConflictoDto::from).collect();
                    let body = json!({
                        "error": err.to_string(),
                        "code": "CONFLICT",
                        "tieneConflicto": true,
                        "citasConflictivas": report.appointment_ids(),
                        "conflictos": conflictos,
                    });
                    return (StatusCode::CONFLICT, axum::Json(body)).into_response();
                }
                SchedulingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                SchedulingError::Interrupted => (
                    StatusCode::REQUEST_TIMEOUT,
                    "TIMEOUT",
                    "The request took too long to expand its recurrence".to_string(),
                ),
                SchedulingError::Store(store) => classify_store_error(store),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Transient store errors map to 503 so clients know a retry may succeed.
/// Everything else is a sanitized 500.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    if err.is_transient() {
        tracing::warn!(error = %err, "Transient store error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "STORE_CONFLICT",
            "The resource changed or the store is unavailable; retry the request".to_string(),
        );
    }
    tracing::error!(error = %err, "Store error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// The request field a domain validation error refers to.
fn wire_field(field: &str) -> &'static str {
    match field {
        "site_id" => "sedeId",
        "resource_id" => "recursoId",
        "reason" => "motivo",
        "window" => "fechaFin",
        "kind" => "recurrencia.tipo",
        "interval" => "recurrencia.intervalo",
        "until" => "recurrencia.fechaFin",
        "count" => "recurrencia.repeticiones",
        "by_weekday" => "recurrencia.diasSemana",
        "by_month_day" => "recurrencia.diaMes",
        _ => "recurrencia",
    }
}
