//! HTTP surface for the person service.
//!
//! Thin axum layer over [`PersonEngine`]: request decoding, id assignment on
//! create, and mapping of [`EngineError`] to status codes. All concurrency
//! semantics live in the engine.

mod handlers;

use crate::core::EngineError;
use crate::engine::PersonEngine;
use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{Level, event};

/// Set on a 200 response whose record was saved but whose expiration marker
/// was not refreshed.
pub const PARTIAL_WRITE_HEADER: &str = "x-personkv-warning";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Engine(EngineError),
    Input(String),
}

impl From<EngineError> for WebError {
    fn from(err: EngineError) -> Self {
        WebError::Engine(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(err: JsonRejection) -> Self {
        WebError::Input(format!("Invalid request: {}", err.body_text()))
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Input(_) => StatusCode::BAD_REQUEST,
            WebError::Engine(err) => match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::Lock(_) | EngineError::Timeout(_) | EngineError::Storage(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                EngineError::ExpirationMarker { .. } => StatusCode::OK,
            },
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let WebError::Engine(EngineError::ExpirationMarker { person, reason }) = self {
            event!(Level::WARN, person_id = %person.id, %reason, "record saved without expiration marker");
            let warning = format!("partial_write: {reason}");
            return (status, [(PARTIAL_WRITE_HEADER, warning)], Json(*person)).into_response();
        }

        let (message, code) = match self {
            WebError::Input(msg) => (msg, "input_error".to_string()),
            WebError::Engine(err) => (err.to_string(), err.code().to_string()),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// Routes of the person API, with request tracing.
pub fn router(engine: PersonEngine) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/readiness", get(handlers::readiness))
        .route(
            "/api/v1/person",
            post(handlers::create_person).patch(handlers::update_person_optimistic),
        )
        .route(
            "/api/v1/person/pessimistic",
            patch(handlers::update_person_pessimistic),
        )
        .route("/api/v1/person/:id", get(handlers::get_person))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
