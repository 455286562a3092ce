//! Error taxonomy and the single translation step into the response envelope.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::ApiResponse;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    /// One entry per violated rule, all reported together
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("external service failure: {0}")]
    ExternalService(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Hashing(#[from] bcrypt::BcryptError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        AppError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => "ValidationError",
            AppError::Unauthorized(_) | AppError::Token(_) => "AuthenticationError",
            AppError::Forbidden(_) => "AuthorizationError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::Conflict(_) => "ConflictError",
            AppError::RateLimited(_) => "RateLimitError",
            AppError::ExternalService(_) => "ExternalServiceError",
            _ => "UnexpectedError",
        }
    }

    /// Message shown to the caller; internal detail never leaves the process.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(messages) => {
                let mut messages = messages.clone();
                messages.sort();
                messages.dedup();
                messages.join(", ")
            }
            AppError::Token(_) => "Invalid token".to_string(),
            AppError::ExternalService(_) => "External service unavailable".to_string(),
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Hashing(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some("23505") {
                let field = match db.constraint() {
                    Some(c) if c.contains("email") => "email",
                    Some(c) if c.contains("slug") => "slug",
                    Some(c) if c.contains("name") => "name",
                    _ => "value",
                };
                return AppError::Conflict(format!("A record with this {} already exists", field));
            }
        }
        AppError::Database(e)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "request rejected");
        }

        ApiResponse::failure(status, self.public_message(), Some(self.kind().to_string()))
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_joined() {
        let err = AppError::Validation(vec!["b is bad".into(), "a is bad".into()]);
        assert_eq!(err.public_message(), "a is bad, b is bad");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = AppError::internal("connection reset by peer");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_row_not_found_is_unexpected() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_into_response_uses_envelope() {
        let res = AppError::not_found("Project").into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Project not found");
        assert_eq!(body["error"], "NotFoundError");
    }
}
