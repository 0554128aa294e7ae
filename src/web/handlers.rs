use super::{Result, WebError};
use crate::core::{Person, PersonPatch};
use crate::engine::PersonEngine;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{Level, event};
use uuid::Uuid;

pub(super) async fn index() -> String {
    format!("personkv v{}", env!("CARGO_PKG_VERSION"))
}

pub(super) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(super) async fn readiness(State(engine): State<PersonEngine>) -> StatusCode {
    match engine.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            event!(Level::WARN, error = %err, "readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub(super) async fn create_person(
    State(engine): State<PersonEngine>,
    body: std::result::Result<Json<Person>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(mut person) = body?;
    // ids are always server-assigned
    person.id = Uuid::new_v4().to_string();

    let created = engine.create(person).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(super) async fn get_person(
    State(engine): State<PersonEngine>,
    Path(id): Path<String>,
) -> Result<Json<Person>> {
    Ok(Json(engine.get(&id).await?))
}

pub(super) async fn update_person_optimistic(
    State(engine): State<PersonEngine>,
    body: std::result::Result<Json<PersonPatch>, JsonRejection>,
) -> Result<Json<Person>> {
    let patch = decode_patch(body)?;
    Ok(Json(engine.update_optimistic(patch).await?))
}

pub(super) async fn update_person_pessimistic(
    State(engine): State<PersonEngine>,
    body: std::result::Result<Json<PersonPatch>, JsonRejection>,
) -> Result<Json<Person>> {
    let patch = decode_patch(body)?;
    Ok(Json(engine.update_pessimistic(patch).await?))
}

fn decode_patch(body: std::result::Result<Json<PersonPatch>, JsonRejection>) -> Result<PersonPatch> {
    let Json(patch) = body?;
    if patch.id.trim().is_empty() {
        return Err(WebError::Input("Missing person ID".to_string()));
    }
    Ok(patch)
}
