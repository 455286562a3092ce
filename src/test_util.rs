//! Helpers for driving the full router in tests.

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use tower::ServiceExt;

use crate::auth::password::hash_password;
use crate::db::models::{NewUser, ProviderKind, Role, User};
use crate::state::AppState;

pub const PASSWORD: &str = "Password1!";

pub fn app(state: &AppState) -> Router {
    crate::create_app(state.clone()).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

pub async fn seed_user(state: &AppState, email: &str, role: Role) -> User {
    state
        .store
        .insert_user(NewUser {
            email: email.to_string(),
            password_hash: Some(hash_password(PASSWORD.to_string(), 4).await.unwrap()),
            name: "Test User".to_string(),
            avatar: None,
            role,
            provider: ProviderKind::Local,
            provider_id: None,
        })
        .await
        .unwrap()
}

pub async fn admin_token(state: &AppState) -> String {
    let admin = seed_user(state, "admin@example.com", Role::Admin).await;
    state.jwt.issue_access(&admin).unwrap()
}

pub async fn user_token(state: &AppState) -> String {
    let user = seed_user(state, "reader@example.com", Role::User).await;
    state.jwt.issue_access(&user).unwrap()
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, request(method, uri, token, body)).await
}
