use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug)]
pub enum AppError {
    ConfigLoad(String),
    ConfigValidation(String),
    Authentication(String),
    MailApi {
        status: u16,
        code: Option<String>,
        message: String,
    },
    LlmApi {
        status: u16,
        message: String,
    },
    RateLimitExceeded(String),
    Conflict(String),
    Classification {
        email_id: Option<String>,
        attempts: i32,
        message: String,
    },
    SnippetCleaning {
        step: &'static str,
        partial: String,
    },
    NotFound(String),
    Store(sea_orm::DbErr),
    Internal(anyhow::Error),
}

impl AppError {
    /// Status code of the underlying provider response, when there is one.
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            AppError::MailApi { status, .. } | AppError::LlmApi { status, .. } => Some(*status),
            AppError::Conflict(_) => Some(412),
            _ => None,
        }
    }

    /// Whether a bounded retry is worth attempting (5xx, connection drop, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::MailApi { status, .. } | AppError::LlmApi { status, .. } => {
                *status >= 500 || *status == 429 || *status == 0
            }
            AppError::RateLimitExceeded(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::ConfigLoad(msg) => write!(f, "config load error: {msg}"),
            AppError::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            AppError::Authentication(msg) => write!(f, "authentication error: {msg}"),
            AppError::MailApi {
                status,
                code,
                message,
            } => write!(
                f,
                "mail API error (status {status}, code {}): {message}",
                code.as_deref().unwrap_or("-")
            ),
            AppError::LlmApi { status, message } => {
                write!(f, "LLM API error (status {status}): {message}")
            }
            AppError::RateLimitExceeded(msg) => write!(f, "rate limit exceeded: {msg}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::Classification {
                email_id,
                attempts,
                message,
            } => write!(
                f,
                "classification failed for {} after {attempts} attempts: {message}",
                email_id.as_deref().unwrap_or("<unknown>")
            ),
            AppError::SnippetCleaning { step, .. } => {
                write!(f, "snippet cleaning step '{step}' failed")
            }
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Store(err) => write!(f, "store error: {err}"),
            AppError::Internal(err) => write!(f, "internal error: {err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(error: sea_orm::DbErr) -> Self {
        AppError::Store(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16()).unwrap_or(0);
        match status {
            401 | 403 => AppError::Authentication(error.to_string()),
            412 => AppError::Conflict(error.to_string()),
            _ => AppError::MailApi {
                status,
                code: None,
                message: error.to_string(),
            },
        }
    }
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {
                    "code": StatusCode::NOT_FOUND.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::ConfigLoad(msg) | AppError::ConfigValidation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": {
                    "code": StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::Authentication(msg) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {
                    "code": StatusCode::UNAUTHORIZED.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::RateLimitExceeded(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {
                    "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "message": "Too many requests"
                }})),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                Json(json!({"error": {
                    "code": StatusCode::CONFLICT.as_u16(),
                    "message": msg
                }})),
            ),
            AppError::Store(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": "Database error"
                    }})),
                )
            }
            other => {
                tracing::error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        "message": "Internal server error"
                    }})),
                )
            }
        };

        err.into_response()
    }
}
