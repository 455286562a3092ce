/**
 * Auth Routes
 * Registration, password login, token refresh, profile and the OAuth flows
 */
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{
    clear_cookie, cookie, extract::cookie_value, password, provider::resolve_account,
    redirect_cookie, token_digest, AuthProvider, AuthUser, Credentials, TokenPair,
    OAUTH_STATE_COOKIE, TOKEN_COOKIE,
};
use crate::db::models::{NewUser, ProviderKind, Role, User, UserPatch};
use crate::error::{AppError, Result};
use crate::response::ApiResponse;
use crate::services::mailer;
use crate::state::AppState;
use crate::validation::{
    asset_url, empty_string_as_none, password_strength, Payload, ValidatedJson,
    LETTERS_AND_SPACES,
};

const OAUTH_STATE_TTL_SECS: i64 = 600;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for POST /auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(
        length(min = 2, max = 50, message = "Name must be 2-50 characters"),
        regex(path = *LETTERS_AND_SPACES, message = "Name can only contain letters and spaces")
    )]
    pub name: String,

    #[serde(default)]
    #[validate(
        email(message = "Please provide a valid email"),
        length(max = 254, message = "Email must be under 254 characters")
    )]
    pub email: String,

    #[serde(default)]
    #[validate(
        length(min = 8, max = 128, message = "Password must be 8-128 characters"),
        custom(function = "password_strength")
    )]
    pub password: String,
}

impl Payload for RegisterRequest {}

/// Request body for POST /auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

impl Payload for LoginRequest {}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

impl Payload for RefreshRequest {}

/// Request body for PUT /auth/profile; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        length(min = 2, max = 50, message = "Name must be 2-50 characters"),
        regex(path = *LETTERS_AND_SPACES, message = "Name can only contain letters and spaces")
    )]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        email(message = "Please provide a valid email"),
        length(max = 254, message = "Email must be under 254 characters")
    )]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub avatar: Option<String>,
}

impl Payload for UpdateProfileRequest {}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[serde(default)]
    #[validate(
        length(min = 8, max = 128, message = "New password must be 8-128 characters"),
        custom(function = "password_strength")
    )]
    pub new_password: String,
}

impl Payload for ChangePasswordRequest {}

/// Query string the provider appends to the callback URL
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// User plus a fresh token pair
#[derive(Debug, Serialize)]
pub struct SessionData {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

// ============================================================================
// Session helpers
// ============================================================================

/// Issue a token pair and make its refresh token the single active one.
async fn start_session(state: &AppState, user: &User) -> Result<TokenPair> {
    let tokens = state.jwt.issue_pair(user)?;
    state
        .store
        .set_refresh_token(&user.id, Some(&token_digest(&tokens.refresh_token)))
        .await?;
    Ok(tokens)
}

fn session_cookie(state: &AppState, access_token: &str) -> String {
    cookie(
        TOKEN_COOKIE,
        access_token,
        state.jwt.access_ttl().num_seconds(),
        state.config.is_production(),
    )
}

fn invalid_refresh() -> AppError {
    AppError::Unauthorized("Invalid refresh token".into())
}

// ============================================================================
// Password accounts
// ============================================================================

/// POST /auth/register - Create a local account
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<Response> {
    let email = body.email.to_lowercase();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User already exists with this email".into()));
    }

    let password_hash = password::hash_password(body.password, state.config.bcrypt_cost).await?;
    let user = state
        .store
        .insert_user(NewUser {
            email,
            password_hash: Some(password_hash),
            name: body.name,
            avatar: None,
            role: Role::User,
            provider: ProviderKind::Local,
            provider_id: None,
        })
        .await?;
    tracing::info!(user_id = %user.id, email = %user.email, "user registered");

    state.send_in_background(mailer::welcome_email(&user));

    let tokens = start_session(&state, &user).await?;
    let set_cookie = session_cookie(&state, &tokens.access_token);
    Ok((
        [(header::SET_COOKIE, set_cookie)],
        ApiResponse::created("User registered successfully", SessionData { user, tokens }),
    )
        .into_response())
}

/// POST /auth/login - Authenticate with email and password
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Response> {
    let identity = AuthProvider::Local
        .verify(
            &*state.store,
            &state.http,
            Credentials::Password {
                email: body.email,
                password: body.password,
            },
        )
        .await?;
    let user = resolve_account(&*state.store, identity).await?;
    tracing::info!(user_id = %user.id, "user logged in");

    let tokens = start_session(&state, &user).await?;
    let set_cookie = session_cookie(&state, &tokens.access_token);
    Ok((
        [(header::SET_COOKIE, set_cookie)],
        ApiResponse::ok("Login successful", SessionData { user, tokens }),
    )
        .into_response())
}

/// POST /auth/refresh-token - Trade the active refresh token for a new pair
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefreshRequest>,
) -> Result<Response> {
    let claims = state
        .jwt
        .verify_refresh(&body.refresh_token)
        .map_err(|_| invalid_refresh())?;

    let user = state
        .store
        .find_user(&claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid_refresh)?;

    let digest = token_digest(&body.refresh_token);
    if user.refresh_token_hash.as_deref() != Some(digest.as_str()) {
        tracing::warn!(user_id = %user.id, "superseded refresh token presented");
        return Err(invalid_refresh());
    }

    let tokens = start_session(&state, &user).await?;
    let set_cookie = session_cookie(&state, &tokens.access_token);
    Ok((
        [(header::SET_COOKIE, set_cookie)],
        ApiResponse::ok("Token refreshed successfully", tokens),
    )
        .into_response())
}

/// POST /auth/logout - Drop the stored refresh token and the session cookie
pub async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Response> {
    state.store.set_refresh_token(&user.id, None).await?;
    tracing::info!(user_id = %user.id, "user logged out");
    Ok((
        [(
            header::SET_COOKIE,
            clear_cookie(TOKEN_COOKIE, state.config.is_production()),
        )],
        ApiResponse::message_only("Logout successful"),
    )
        .into_response())
}

/// GET /auth/profile
pub async fn get_profile(AuthUser(user): AuthUser) -> ApiResponse<User> {
    ApiResponse::ok("Profile retrieved successfully", user)
}

/// PUT /auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(body): ValidatedJson<UpdateProfileRequest>,
) -> Result<ApiResponse<User>> {
    let email = body.email.map(|e| e.to_lowercase());
    if let Some(email) = email.as_deref().filter(|e| *e != user.email) {
        if state.store.find_user_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("Email already in use".into()));
        }
    }

    let updated = state
        .store
        .update_user(
            &user.id,
            UserPatch {
                name: body.name,
                email,
                avatar: body.avatar,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ApiResponse::ok("Profile updated successfully", updated))
}

/// PUT /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(body): ValidatedJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>> {
    let hash = user.password_hash.clone().ok_or_else(|| {
        AppError::BadRequest("This account signs in with an external provider".into())
    })?;
    if !password::verify_password(body.current_password, hash).await? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let new_hash = password::hash_password(body.new_password, state.config.bcrypt_cost).await?;
    state.store.set_password(&user.id, &new_hash).await?;
    tracing::info!(user_id = %user.id, "password changed");
    Ok(ApiResponse::message_only("Password changed successfully"))
}

// ============================================================================
// OAuth
// ============================================================================

fn configured_provider(state: &AppState, kind: ProviderKind) -> Result<AuthProvider> {
    AuthProvider::oauth(kind, &state.config.oauth)
        .ok_or_else(|| AppError::NotFound(format!("{} authentication is not configured", kind)))
}

async fn begin_oauth(state: AppState, kind: ProviderKind) -> Result<Response> {
    let provider = configured_provider(&state, kind)?;
    let oauth_state = format!("{:032x}", rand::random::<u128>());
    let url = provider.authorize_url(&oauth_state)?;

    Ok((
        [(
            header::SET_COOKIE,
            redirect_cookie(
                OAUTH_STATE_COOKIE,
                &oauth_state,
                OAUTH_STATE_TTL_SECS,
                state.config.is_production(),
            ),
        )],
        Redirect::to(&url),
    )
        .into_response())
}

async fn complete_oauth(
    state: &AppState,
    kind: ProviderKind,
    headers: &HeaderMap,
    callback: OAuthCallback,
) -> Result<String> {
    if let Some(error) = callback.error {
        return Err(AppError::Unauthorized(format!("Provider refused sign-in: {}", error)));
    }
    let expected = cookie_value(headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || callback.state != expected {
        return Err(AppError::Unauthorized("OAuth state mismatch".into()));
    }
    let code = callback
        .code
        .ok_or_else(|| AppError::Unauthorized("Missing authorization code".into()))?;

    let provider = configured_provider(state, kind)?;
    let identity = provider
        .verify(
            &*state.store,
            &state.http,
            Credentials::AuthorizationCode { code },
        )
        .await?;
    let user = resolve_account(&*state.store, identity).await?;
    tracing::info!(user_id = %user.id, provider = %kind, "oauth sign-in");

    let tokens = start_session(state, &user).await?;
    Ok(tokens.access_token)
}

async fn finish_oauth(
    state: AppState,
    kind: ProviderKind,
    headers: HeaderMap,
    callback: OAuthCallback,
) -> Result<Response> {
    let secure = state.config.is_production();
    let client_url = state.config.client_url.trim_end_matches('/').to_string();
    let clear_state = clear_cookie(OAUTH_STATE_COOKIE, secure);

    match complete_oauth(&state, kind, &headers, callback).await {
        Ok(access_token) => {
            let url = reqwest::Url::parse_with_params(
                &format!("{}/auth/success", client_url),
                &[("token", access_token.as_str())],
            )
            .map_err(AppError::internal)?;
            Ok((
                AppendHeaders([
                    (header::SET_COOKIE, clear_state),
                    (header::SET_COOKIE, session_cookie(&state, &access_token)),
                ]),
                Redirect::to(url.as_str()),
            )
                .into_response())
        }
        Err(e) => {
            tracing::warn!(provider = %kind, error = %e, "oauth sign-in failed");
            Ok((
                [(header::SET_COOKIE, clear_state)],
                Redirect::to(&format!("{}/login?error=oauth_failed", client_url)),
            )
                .into_response())
        }
    }
}

/// GET /auth/google - Redirect to the Google consent screen
pub async fn google_redirect(State(state): State<AppState>) -> Result<Response> {
    begin_oauth(state, ProviderKind::Google).await
}

/// GET /auth/google/callback
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response> {
    finish_oauth(state, ProviderKind::Google, headers, callback).await
}

/// GET /auth/github - Redirect to the GitHub consent screen
pub async fn github_redirect(State(state): State<AppState>) -> Result<Response> {
    begin_oauth(state, ProviderKind::Github).await
}

/// GET /auth/github/callback
pub async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response> {
    finish_oauth(state, ProviderKind::Github, headers, callback).await
}
