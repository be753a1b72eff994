use reqwest::StatusCode;

use crate::api::models::ErrorBody;

/// Everything that can go wrong talking to the marketplace backend.
///
/// Server-side failures keep the `message` field of the JSON error body when
/// the backend sent one, since that is what ends up in front of the user.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },
    #[error("conflict: {}", .0.as_deref().unwrap_or("already exists"))]
    Conflict(Option<String>),
    #[error("not found: {}", .0.as_deref().unwrap_or("no such resource"))]
    NotFound(Option<String>),
    #[error("unauthorized: {}", .0.as_deref().unwrap_or("missing or expired token"))]
    Unauthorized(Option<String>),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Builds the error for a non-2xx response from its status and raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .unwrap_or_default()
            .message
            .filter(|m| !m.trim().is_empty());
        match status {
            StatusCode::CONFLICT => ApiError::Conflict(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
            other => ApiError::Server {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// The message the backend attached to its error response, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Server { message, .. } => message.as_deref(),
            ApiError::Conflict(message)
            | ApiError::NotFound(message)
            | ApiError::Unauthorized(message) => message.as_deref(),
            ApiError::Network(_) | ApiError::Decode(_) | ApiError::Url(_) => None,
        }
    }

    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}
