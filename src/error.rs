use crate::pipe::PipeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrestleError>;

#[derive(Debug, Error)]
pub enum TrestleError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid REST method registration: the method [{method}] of action '{action}' is not allowed")]
    InvalidMethod { method: String, action: String },

    #[error("Invalid REST method path: the path of action '{action}' is empty")]
    InvalidPath { action: String },

    #[error("No binding registered for '{key}'")]
    MissingBinding { key: String },

    #[error("Circular dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("Invalid result type: {message}")]
    InvalidResultType { message: String },

    #[error("Controller '{controller}' is already compiled")]
    AlreadyCompiled { controller: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Invalid parameter '{key}': {message}")]
    InvalidParameter { key: String, message: String },

    #[error("Failed to parse request body: {message}")]
    BodyParse { message: String },

    #[error("Request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Too many parameters in request body (limit {limit})")]
    TooManyParameters { limit: usize },

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error("Handler failed: {0}")]
    Handler(anyhow::Error),

    #[error("Handler panicked: {message}")]
    Panicked { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrestleError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_parameter(key: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Unwraps a framework error that travelled through an action's `anyhow::Error`,
    /// so it keeps its own status code.
    pub fn from_handler(error: anyhow::Error) -> Self {
        match error.downcast::<TrestleError>() {
            Ok(inner) => inner,
            Err(other) => Self::Handler(other),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TrestleError::InvalidParameter { .. }
            | TrestleError::BodyParse { .. }
            | TrestleError::Pipe(_) => StatusCode::BAD_REQUEST,
            TrestleError::PayloadTooLarge { .. } | TrestleError::TooManyParameters { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrestleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Business errors are not echoed to clients.
            TrestleError::Handler(_) | TrestleError::Panicked { .. } | TrestleError::Io(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({
                "statusCode": status.as_u16(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        )
            .into_response()
    }
}
