//! # Confidant Server
//!
//! HTTP binding for streamed persona chat.
//!
//! - `POST /api/chat/:persona_id` with `{"prompt": "..."}` streams the reply
//!   as `text/plain`
//! - `GET /api/chat/:persona_id` returns the caller's transcript
//! - `GET /health`
//!
//! Callers are identified by the `x-user-id` and `x-user-name` headers, which
//! an upstream auth proxy is trusted to set.

pub mod config;
pub mod error;
pub mod identity;
pub mod postgres;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
