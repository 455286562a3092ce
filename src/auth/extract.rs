/**
 * Auth Extractors
 * Resolve the calling account from a bearer token or the session cookie
 */
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::db::models::{Role, User};
use crate::error::AppError;
use crate::state::AppState;

use super::TOKEN_COOKIE;

/// Extract bearer token from Authorization header, falling back to the token cookie
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| cookie_value(headers, TOKEN_COOKIE))
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state
        .jwt
        .verify_access(token)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    state
        .store
        .find_user(&claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".into()))
}

/// Any signed-in, active account
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Access token is required".into()))?;
        authenticate(state, &token).await.map(AuthUser)
    }
}

/// The caller's account when a valid token is presented; anonymous otherwise.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

impl MaybeAuthUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|u| u.role == Role::Admin)
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = request_token(&parts.headers) else {
            return Ok(MaybeAuthUser(None));
        };
        match authenticate(state, &token).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(AppError::Unauthorized(_)) => Ok(MaybeAuthUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// A signed-in account holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden("Insufficient permissions".into()));
        }
        Ok(AdminUser(user))
    }
}
