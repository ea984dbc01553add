//! Chat endpoints

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use confidant_memory::{ChatRequest, ConversationMessage, TurnOutcome};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Transcript {
    pub persona: PersonaSummary,
    pub messages: Vec<ConversationMessage>,
}

/// `POST /api/chat/:persona_id` streams the persona's reply as plain text
pub async fn send_message(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Caller(identity): Caller,
    uri: Uri,
    Json(body): Json<SendMessage>,
) -> Result<Response, ApiError> {
    let mut request = ChatRequest::new(persona_id, body.prompt).with_origin(uri.path());
    if let Some(identity) = identity {
        request = request.with_identity(identity);
    }

    let reply = state.orchestrator.chat(request).await?;
    let key = reply.key().to_string();
    let (chunks, outcome) = reply.into_parts();

    tokio::spawn(async move {
        match outcome.wait().await {
            TurnOutcome::Completed { text, .. } => {
                debug!(key = %key, chars = text.len(), "Chat turn completed")
            }
            other => info!(key = %key, outcome = ?other, "Chat turn ended early"),
        }
    });

    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// `GET /api/chat/:persona_id` returns the caller's transcript
pub async fn transcript(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Caller(identity): Caller,
) -> Result<Json<Transcript>, ApiError> {
    let (persona, messages) = state
        .orchestrator
        .transcript(&persona_id, identity.as_ref())
        .await?;

    Ok(Json(Transcript {
        persona: PersonaSummary {
            id: persona.id,
            name: persona.name,
        },
        messages,
    }))
}
