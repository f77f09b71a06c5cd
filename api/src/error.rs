use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use axon_core::error::{ApiError, codes};
use axon_core::inputs::InputError;
use axon_runtime::GatewayError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
    },
    /// Unknown route target (404)
    NotFound { message: String },
    /// Agent or tool execution failure (500)
    Execution(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Input(input) => {
                let InputError::MissingRequired(name) = &input;
                AppError::Validation {
                    message: input.to_string(),
                    field: Some(name.clone()),
                }
            }
            GatewayError::UnknownTool(name) => AppError::NotFound {
                message: format!("unknown tool '{name}'"),
            },
            GatewayError::Runner(err) => AppError::Execution(err.to_string()),
            GatewayError::Tool(err) => AppError::Execution(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation { message, field } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: codes::NOT_FOUND.to_string(),
                    message,
                    field: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Execution(message) => {
                tracing::error!("execution error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: codes::EXECUTION_FAILED.to_string(),
                        message,
                        field: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}
