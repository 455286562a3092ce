/**
 * Response Envelope
 * Uniform JSON wrapper returned by every API endpoint
 */
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Pagination block attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit)),
        }
    }
}

/// `{ success, message, data?, error?, pagination? }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            pagination: None,
            status: StatusCode::OK,
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }

    pub fn paginated(message: impl Into<String>, data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(message, data)
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload (deletes, logout)
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
            pagination: None,
            status: StatusCode::OK,
        }
    }

    /// Failure envelope, used by the error translation step
    pub fn failure(status: StatusCode, message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error,
            pagination: None,
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
