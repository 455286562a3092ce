//! Per-request log lines and request-id plumbing.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

use crate::client_info::client_ip;

pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let ip = client_ip(request.headers(), request.extensions());

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(request_id = %req_id, method = %method, uri = %uri, ip = %ip, "incoming request");

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;

    macro_rules! completed {
        ($level:ident, $message:literal) => {
            tracing::$level!(
                request_id = %req_id,
                method = %method,
                uri = %uri,
                ip = %ip,
                status = status.as_u16(),
                duration_ms,
                $message
            )
        };
    }

    if status.is_server_error() {
        completed!(error, "request failed");
    } else if status.is_client_error() {
        completed!(warn, "request rejected");
    } else {
        completed!(info, "request completed");
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
