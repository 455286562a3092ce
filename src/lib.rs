//! Portfolio CMS - library for app logic and testing

pub mod auth;
pub mod client_info;
pub mod config;
pub mod db;
pub mod derive;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod sanitize;
pub mod services;
pub mod state;
pub mod store;
pub mod validation;

#[cfg(test)]
mod test_util;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    http::{header, HeaderValue, Method},
    middleware::{self, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;
use crate::routes::{
    analytics, auth as auth_routes, blogs, comments, contact, health, projects, skills, upload,
};
use crate::state::AppState;
use crate::store::{DynStore, MemoryStore, PgStore};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const REQUEST_OVERHEAD: usize = 1024 * 1024;

/// Configure CORS from `ALLOWED_ORIGINS`, falling back to `CLIENT_URL`.
pub fn configure_cors(config: &AppConfig) -> CorsLayer {
    let configured = if config.allowed_origins.is_empty() {
        vec![config.client_url.clone()]
    } else {
        config.allowed_origins.clone()
    };

    let mut origins: Vec<HeaderValue> = configured
        .iter()
        .filter_map(|origin| match origin.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn auth_router(state: &AppState) -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(auth_routes::register))
        .route("/login", post(auth_routes::login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::auth_limit));

    Router::new()
        .route("/refresh-token", post(auth_routes::refresh_token))
        .route("/logout", post(auth_routes::logout))
        .route(
            "/profile",
            get(auth_routes::get_profile).put(auth_routes::update_profile),
        )
        .route("/change-password", put(auth_routes::change_password))
        .route("/google", get(auth_routes::google_redirect))
        .route("/google/callback", get(auth_routes::google_callback))
        .route("/github", get(auth_routes::github_redirect))
        .route("/github/callback", get(auth_routes::github_callback))
        .merge(limited)
}

fn upload_router(state: &AppState) -> Router<AppState> {
    let body_limit = state.config.upload.max_file_size * upload::MAX_FILES + REQUEST_OVERHEAD;
    Router::new()
        .route("/single", post(upload::upload_single))
        .route("/multiple", post(upload::upload_multiple))
        .route("/{asset_id}", delete(upload::delete_upload))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::upload_limit))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn api_router(state: &AppState) -> Router<AppState> {
    let contact_submit =
        contact::submit.layer(from_fn_with_state(state.clone(), rate_limit::contact_limit));

    Router::new()
        .nest("/auth", auth_router(state))
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{id}/like", post(projects::like_project))
        .route("/blogs", get(blogs::list_blogs).post(blogs::create_blog))
        .route(
            "/blogs/{id}",
            get(blogs::get_blog)
                .put(blogs::update_blog)
                .delete(blogs::delete_blog),
        )
        .route("/blogs/{id}/like", post(blogs::like_blog))
        .route("/skills", get(skills::list_skills).post(skills::create_skill))
        .route(
            "/skills/{id}",
            get(skills::get_skill)
                .put(skills::update_skill)
                .delete(skills::delete_skill),
        )
        .route("/contact", post(contact_submit).get(contact::list_contacts))
        .route(
            "/contact/{id}",
            get(contact::get_contact).delete(contact::delete_contact),
        )
        .route("/contact/{id}/status", patch(contact::update_status))
        .route(
            "/comments/blog/{blog_id}",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/comments/{id}/approve", patch(comments::approve_comment))
        .nest("/upload", upload_router(state))
        .route("/analytics", get(analytics::list_events))
        .route("/analytics/track", post(analytics::track))
        .route("/analytics/dashboard", get(analytics::dashboard))
        .layer(from_fn_with_state(state.clone(), rate_limit::api_limit))
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config);
    let body_limit = state.config.upload.max_file_size * upload::MAX_FILES + REQUEST_OVERHEAD;
    let uploads = ServeDir::new(&state.config.upload.dir);

    Router::new()
        .route("/health", get(health::health_ping))
        .route("/health/detailed", get(health::health_detailed))
        .nest("/api/v1", api_router(&state))
        .nest_service("/uploads", uploads)
        .fallback(routes::not_found)
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Record store for the configured environment, plus the pool to close on exit.
async fn open_store(config: &AppConfig) -> Result<(DynStore, Option<PgPool>), BoxError> {
    let Some(db_config) = db::DbConfig::from_app(config) else {
        tracing::warn!("DATABASE_URL not set. Using the in-memory store; data is lost on restart.");
        return Ok((Arc::new(MemoryStore::new()), None));
    };
    let pool = db::init_pool(&db_config).await?;
    db::run_migrations(&pool).await?;
    Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
}

/// Run the server (used by main).
pub async fn run() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();

    // Held for the process lifetime so buffered lines reach the log files.
    let _log_guards = logging::init(&logging::LogConfig::from_env(config.environment));

    health::init_start_time();
    config.check_secrets()?;

    let (store, pool) = open_store(&config).await?;
    let limiter = RateLimiter::new(
        rate_limit::connect_store(config.redis_url.as_deref()).await,
        &config.rate_limit,
    );
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    let assets = services::assets::from_config(&config.upload, http.clone());
    let mailer = services::mailer::from_config(&config.mail)?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = config.environment.as_str(),
        store = store.backend(),
        assets = assets.backend(),
        "services configured"
    );
    let app = create_app(AppState::new(config, store, limiter, assets, mailer, http));

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("database pool closed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{app, call, request};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_route_gets_envelope() {
        let state = AppState::for_tests();
        let (status, body) = call(&app(&state), Method::GET, "/api/v1/nothing-here", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route /api/v1/nothing-here not found");
    }

    #[tokio::test]
    async fn test_api_responses_carry_rate_limit_and_request_id() {
        let state = AppState::for_tests();
        let res = app(&state)
            .oneshot(request(Method::GET, "/api/v1/skills", None, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["ratelimit-limit"], "100");
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_health_is_outside_api_limit() {
        let state = AppState::for_tests();
        let res = app(&state)
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_cors_allows_client_url() {
        let state = AppState::for_tests();
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/projects")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let res = app(&state).oneshot(preflight).await.unwrap();
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}
