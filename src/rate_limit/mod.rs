/**
 * Rate Limiting
 * Fixed-window counters per (limiter class, client IP) over a pluggable counter store
 */
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{sync::Arc, time::Duration};

use crate::client_info::client_ip;
use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};
use crate::state::AppState;

pub use memory::{MemoryRateLimitStore, NoopRateLimitStore};
pub use redis_store::RedisRateLimitStore;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("ratelimit-reset");
const RETRY_AFTER_HEADER: HeaderName = HeaderName::from_static("retry-after");

/// Counter state after one increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub count: u64,
    pub reset_after: Duration,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request; the window starts on the first hit of a key.
    async fn incr(&self, key: &str, window: Duration) -> Result<Hit>;
    async fn decrement(&self, key: &str) -> Result<()>;
    async fn reset_key(&self, key: &str) -> Result<()>;
    async fn ping(&self) -> Result<()>;
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Api,
    Auth,
    Contact,
    Upload,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Api => "api",
            LimitClass::Auth => "auth",
            LimitClass::Contact => "contact",
            LimitClass::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Policy {
    pub class: LimitClass,
    pub window: Duration,
    pub max_requests: u64,
    pub message: &'static str,
    /// Responses below 400 give their hit back
    pub skip_successful: bool,
}

impl Policy {
    pub fn api(config: &RateLimitConfig) -> Self {
        Self {
            class: LimitClass::Api,
            window: config.window,
            max_requests: config.max_requests,
            message: "Too many requests from this IP, please try again later.",
            skip_successful: false,
        }
    }

    pub fn auth() -> Self {
        Self {
            class: LimitClass::Auth,
            window: Duration::from_secs(15 * 60),
            max_requests: 5,
            message: "Too many authentication attempts, please try again later.",
            skip_successful: true,
        }
    }

    pub fn contact() -> Self {
        Self {
            class: LimitClass::Contact,
            window: Duration::from_secs(60 * 60),
            max_requests: 3,
            message: "Too many contact form submissions, please try again later.",
            skip_successful: false,
        }
    }

    pub fn upload() -> Self {
        Self {
            class: LimitClass::Upload,
            window: Duration::from_secs(15 * 60),
            max_requests: 10,
            message: "Too many file uploads, please try again later.",
            skip_successful: false,
        }
    }

    pub fn key(&self, ip: &str) -> String {
        format!("rl:{}:{}", self.class.as_str(), ip)
    }

    pub fn with_limit(mut self, window: Duration, max_requests: u64) -> Self {
        self.window = window;
        self.max_requests = max_requests;
        self
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    api: Policy,
    auth: Policy,
    contact: Policy,
    upload: Policy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            api: Policy::api(config),
            auth: Policy::auth(),
            contact: Policy::contact(),
            upload: Policy::upload(),
        }
    }

    /// Replace the policy of the same class.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        match policy.class {
            LimitClass::Api => self.api = policy,
            LimitClass::Auth => self.auth = policy,
            LimitClass::Contact => self.contact = policy,
            LimitClass::Upload => self.upload = policy,
        }
        self
    }

    pub fn policy(&self, class: LimitClass) -> &Policy {
        match class {
            LimitClass::Api => &self.api,
            LimitClass::Auth => &self.auth,
            LimitClass::Contact => &self.contact,
            LimitClass::Upload => &self.upload,
        }
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Clear one client's counter for a class.
    pub async fn reset(&self, class: LimitClass, ip: &str) -> Result<()> {
        self.store.reset_key(&self.policy(class).key(ip)).await
    }
}

/// Pick the counter store: Redis when configured and reachable, otherwise
/// in-process counters; an unreachable Redis disables limiting.
pub async fn connect_store(redis_url: Option<&str>) -> Arc<dyn RateLimitStore> {
    let Some(url) = redis_url else {
        tracing::info!("REDIS_URL not set. Using in-memory rate limit counters.");
        return Arc::new(MemoryRateLimitStore::new());
    };
    match RedisRateLimitStore::connect(url).await {
        Ok(store) => {
            tracing::info!("Rate limit counters stored in Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unreachable. Rate limiting is disabled.");
            Arc::new(NoopRateLimitStore)
        }
    }
}

fn set_headers(headers: &mut HeaderMap, policy: &Policy, remaining: u64, reset_after: Duration) {
    let reset_secs = reset_after.as_millis().div_ceil(1000) as u64;
    for (name, value) in [
        (LIMIT_HEADER, policy.max_requests),
        (REMAINING_HEADER, remaining),
        (RESET_HEADER, reset_secs),
    ] {
        headers.entry(name).or_insert(HeaderValue::from(value));
    }
}

async fn enforce(limiter: &RateLimiter, class: LimitClass, request: Request, next: Next) -> Response {
    let policy = limiter.policy(class).clone();
    let ip = client_ip(request.headers(), request.extensions());
    let key = policy.key(&ip);

    let hit = match limiter.store.incr(&key, policy.window).await {
        Ok(hit) => hit,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "rate limit store failed, allowing request");
            return next.run(request).await;
        }
    };

    if hit.count > policy.max_requests {
        tracing::warn!(ip = %ip, class = class.as_str(), count = hit.count, "rate limit exceeded");
        let mut response = AppError::RateLimited(policy.message.to_string()).into_response();
        let headers = response.headers_mut();
        set_headers(headers, &policy, 0, hit.reset_after);
        let retry_after = hit.reset_after.as_millis().div_ceil(1000) as u64;
        headers.insert(RETRY_AFTER_HEADER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(request).await;

    let mut used = hit.count;
    if policy.skip_successful && response.status().as_u16() < 400 {
        match limiter.store.decrement(&key).await {
            Ok(()) => used = used.saturating_sub(1),
            Err(e) => tracing::warn!(error = %e, key = %key, "rate limit decrement failed"),
        }
    }

    set_headers(
        response.headers_mut(),
        &policy,
        policy.max_requests.saturating_sub(used),
        hit.reset_after,
    );
    response
}

pub async fn api_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state.limiter, LimitClass::Api, request, next).await
}

pub async fn auth_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state.limiter, LimitClass::Auth, request, next).await
}

pub async fn contact_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state.limiter, LimitClass::Contact, request, next).await
}

pub async fn upload_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(&state.limiter, LimitClass::Upload, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn router(state: AppState, class: LimitClass, status: StatusCode) -> Router {
        router_for_peer(state, class, status, [127, 0, 0, 1])
    }

    fn router_for_peer(
        state: AppState,
        class: LimitClass,
        status: StatusCode,
        peer: [u8; 4],
    ) -> Router {
        let routes = Router::new().route("/", post(move || async move { status }));
        let routes = match class {
            LimitClass::Auth => {
                routes.layer(middleware::from_fn_with_state(state.clone(), auth_limit))
            }
            _ => routes.layer(middleware::from_fn_with_state(state.clone(), contact_limit)),
        };
        routes
            .with_state(state)
            .layer(MockConnectInfo(SocketAddr::from((peer, 9000))))
    }

    async fn hit(app: &Router) -> Response {
        app.clone()
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_policy_keys_and_defaults() {
        let api = Policy::api(&RateLimitConfig {
            window: Duration::from_secs(900),
            max_requests: 100,
        });
        assert_eq!(api.key("1.2.3.4"), "rl:api:1.2.3.4");
        assert_eq!(Policy::auth().max_requests, 5);
        assert!(Policy::auth().skip_successful);
        assert_eq!(Policy::contact().window, Duration::from_secs(3600));
        assert_eq!(Policy::upload().max_requests, 10);
    }

    #[tokio::test]
    async fn test_contact_limit_blocks_fourth_submission() {
        let state = AppState::for_tests();
        let app = router(state, LimitClass::Contact, StatusCode::CREATED);

        for expected_remaining in ["2", "1", "0"] {
            let res = hit(&app).await;
            assert_eq!(res.status(), StatusCode::CREATED);
            assert_eq!(res.headers()["ratelimit-limit"], "3");
            assert_eq!(res.headers()["ratelimit-remaining"], expected_remaining);
        }

        let res = hit(&app).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key("retry-after"));
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            "Too many contact form submissions, please try again later."
        );
    }

    #[tokio::test]
    async fn test_auth_limit_only_counts_failures() {
        let state = AppState::for_tests();
        let ok = router(state.clone(), LimitClass::Auth, StatusCode::OK);
        for _ in 0..10 {
            assert_eq!(hit(&ok).await.status(), StatusCode::OK);
        }

        let failing = router(state, LimitClass::Auth, StatusCode::UNAUTHORIZED);
        for _ in 0..5 {
            assert_eq!(hit(&failing).await.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(hit(&failing).await.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_window_expiry_restores_access() {
        let state = AppState::for_tests();
        let state = AppState {
            limiter: state
                .limiter
                .clone()
                .with_policy(Policy::contact().with_limit(Duration::from_millis(100), 1)),
            ..state
        };
        let app = router(state, LimitClass::Contact, StatusCode::CREATED);

        assert_eq!(hit(&app).await.status(), StatusCode::CREATED);
        assert_eq!(hit(&app).await.status(), StatusCode::TOO_MANY_REQUESTS);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hit(&app).await.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_reset_clears_counter() {
        let state = AppState::for_tests();
        let app = router(state.clone(), LimitClass::Contact, StatusCode::CREATED);
        for _ in 0..3 {
            hit(&app).await;
        }
        assert_eq!(hit(&app).await.status(), StatusCode::TOO_MANY_REQUESTS);
        state.limiter.reset(LimitClass::Contact, "127.0.0.1").await.unwrap();
        assert_eq!(hit(&app).await.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_each_client_ip_has_its_own_bucket() {
        let state = AppState::for_tests();
        let first = router_for_peer(
            state.clone(),
            LimitClass::Contact,
            StatusCode::CREATED,
            [10, 0, 0, 1],
        );
        let second = router_for_peer(state, LimitClass::Contact, StatusCode::CREATED, [10, 0, 0, 2]);

        for _ in 0..3 {
            assert_eq!(hit(&first).await.status(), StatusCode::CREATED);
        }
        assert_eq!(hit(&first).await.status(), StatusCode::TOO_MANY_REQUESTS);

        let res = hit(&second).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()["ratelimit-remaining"], "2");
    }
}
