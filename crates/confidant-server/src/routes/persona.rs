//! Persona management endpoints

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use confidant_memory::{ChatError, Identity, Persona, PersonaDraft};
use tracing::info;
use uuid::Uuid;

fn owner(identity: Option<Identity>) -> Result<Identity, ApiError> {
    identity
        .filter(Identity::is_complete)
        .ok_or(ApiError(ChatError::Unauthenticated))
}

/// `POST /api/persona`
pub async fn create(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(draft): Json<PersonaDraft>,
) -> Result<Json<Persona>, ApiError> {
    let owner = owner(identity)?;
    let persona = draft.into_persona(Uuid::new_v4().to_string())?;

    let persona = state.records.save_persona(persona, &owner.user_id).await?;
    info!(persona_id = %persona.id, owner = %owner.user_id, "Persona created");
    Ok(Json(persona))
}

/// `PATCH /api/persona/:persona_id`
pub async fn update(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Caller(identity): Caller,
    Json(draft): Json<PersonaDraft>,
) -> Result<Json<Persona>, ApiError> {
    let owner = owner(identity)?;
    if state.records.persona(&persona_id).await?.is_none() {
        return Err(ApiError(ChatError::NotFound { persona_id }));
    }
    let persona = draft.into_persona(persona_id)?;

    let persona = state.records.save_persona(persona, &owner.user_id).await?;
    info!(persona_id = %persona.id, "Persona updated");
    Ok(Json(persona))
}

/// `DELETE /api/persona/:persona_id`
pub async fn delete(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Caller(identity): Caller,
) -> Result<StatusCode, ApiError> {
    let owner = owner(identity)?;

    state.records.delete_persona(&persona_id, &owner.user_id).await?;
    info!(persona_id = %persona_id, "Persona deleted");
    Ok(StatusCode::NO_CONTENT)
}
