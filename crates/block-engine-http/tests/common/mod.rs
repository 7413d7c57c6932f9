#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use block_engine_http::config::ServerConfig;
use block_engine_http::router::build_app_router;
use block_engine_http::seed::Seed;
use block_engine_http::state::AppState;

/// Two sites in different zones, one room, two practitioners.
///
/// - `cita-1`: prof-1, Wednesday 2025-03-12 14:00-14:30 UTC, confirmed
/// - `cita-2`: sala-1, 2025-03-05 12:15-12:45 UTC, cancelled
/// - `cita-3`: prof-2, 2025-06-10 09:00-09:30 Madrid time
pub const SEED: &str = r#"{
    "sedes": [
        { "id": "sede-centro", "nombre": "Sede Centro", "zonaHoraria": "America/Santiago" },
        { "id": "sede-madrid", "nombre": "Sede Madrid", "zonaHoraria": "Europe/Madrid" }
    ],
    "recursos": [
        { "tipo": "SALA", "id": "sala-1", "nombre": "Box 1" },
        { "tipo": "PROFESIONAL", "id": "prof-1", "nombre": "Dra. Rojas" },
        { "tipo": "PROFESIONAL", "id": "prof-2", "nombre": "Dr. Vidal" }
    ],
    "citas": [
        { "id": "cita-1", "tipo": "PROFESIONAL", "recursoId": "prof-1",
          "fechaInicio": "2025-03-12T14:00:00Z", "fechaFin": "2025-03-12T14:30:00Z",
          "estado": "CONFIRMADA" },
        { "id": "cita-2", "tipo": "SALA", "recursoId": "sala-1",
          "fechaInicio": "2025-03-05T12:15:00Z", "fechaFin": "2025-03-05T12:45:00Z",
          "estado": "CANCELADA" },
        { "id": "cita-3", "tipo": "PROFESIONAL", "recursoId": "prof-2",
          "fechaInicio": "2025-06-10T07:00:00Z", "fechaFin": "2025-06-10T07:30:00Z" }
    ]
}"#;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        ..ServerConfig::default()
    }
}

pub fn test_state() -> AppState {
    let seed = Seed::from_json(SEED).unwrap();
    AppState::in_memory(test_config(), &seed).unwrap()
}

/// The full application router, seeded with [`SEED`] and backed by
/// in-memory stores. Clones share the same stores.
pub fn build_test_app() -> Router {
    build_app_with(test_state())
}

pub fn build_app_with(state: AppState) -> Router {
    build_app_router(state, &test_config()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn delete(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
    send(app, json_request(Method::POST, uri, &body)).await
}

pub async fn put_json(app: &Router, uri: &str, body: Value) -> Response {
    send(app, json_request(Method::PUT, uri, &body)).await
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
