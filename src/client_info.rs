//! Caller network details: address, user agent and referrer.

use axum::{
    extract::{connect_info::MockConnectInfo, ConnectInfo, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};
use std::{convert::Infallible, net::SocketAddr};

/// Connection peer recorded by the server, or by `MockConnectInfo` in tests.
fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

fn forwarded_for(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP: the connection peer, else the first `X-Forwarded-For` hop, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    match peer_addr(extensions) {
        Some(addr) => addr.ip().to_string(),
        None => forwarded_for(headers),
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ip = match ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await {
            Ok(ConnectInfo(addr)) => addr.ip().to_string(),
            Err(_) => forwarded_for(&parts.headers),
        };
        let header_text = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Ok(ClientInfo {
            ip,
            user_agent: header_text(header::USER_AGENT),
            referrer: header_text(header::REFERER),
        })
    }
}
