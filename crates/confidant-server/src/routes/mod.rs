//! HTTP routes

mod chat;
mod persona;

pub use chat::{PersonaSummary, SendMessage, Transcript};

use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/chat/:persona_id",
            get(chat::transcript).post(chat::send_message),
        )
        .route("/api/persona", post(persona::create))
        .route(
            "/api/persona/:persona_id",
            patch(persona::update).delete(persona::delete),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
