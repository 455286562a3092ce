/**
 * Routes Module
 * API route handlers
 */
pub mod analytics;
pub mod auth;
pub mod blogs;
pub mod comments;
pub mod contact;
pub mod health;
pub mod projects;
pub mod skills;
pub mod upload;

use axum::http::Uri;
use serde::Serialize;

use crate::error::AppError;

/// Body of the like endpoints
#[derive(Debug, Serialize)]
pub struct LikeCount {
    pub likes: i64,
}

/// Fallback for unmatched paths
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {} not found", uri.path()))
}
