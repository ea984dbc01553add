//! HTTP mapping of chat errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use confidant_memory::ChatError;
use tracing::error;

/// A [`ChatError`] on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code and public body for this error
    pub fn status_and_body(&self) -> (StatusCode, String) {
        match &self.0 {
            ChatError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ChatError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            ChatError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ChatError::InvalidRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            error!(
                error = %self.0,
                source = ?std::error::Error::source(&self.0),
                "Chat request failed"
            );
        }
        (status, body).into_response()
    }
}
