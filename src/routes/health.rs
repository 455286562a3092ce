/**
 * Health Routes
 * Liveness and dependency checks, mounted outside the API prefix
 */
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Instant};

use crate::error::Result;
use crate::state::AppState;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceCheck {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Health checks for all shared dependencies
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub store: ServiceCheck,
    pub rate_limit: ServiceCheck,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    #[serde(flatten)]
    pub summary: HealthResponse,
    pub uptime: u64,
    pub checks: HealthChecks,
}

fn summary(state: &AppState, success: bool, message: &str) -> HealthResponse {
    HealthResponse {
        success,
        message: message.to_string(),
        timestamp: Utc::now(),
        environment: state.config.environment.as_str().to_string(),
    }
}

async fn timed<F>(backend: &str, check: F) -> ServiceCheck
where
    F: Future<Output = Result<()>>,
{
    let started = Instant::now();
    match check.await {
        Ok(()) => ServiceCheck {
            status: "healthy".to_string(),
            backend: backend.to_string(),
            response_time: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ServiceCheck {
            status: "unhealthy".to_string(),
            backend: backend.to_string(),
            response_time: None,
            error: Some(e.to_string()),
        },
    }
}

/// GET /health - Simple health ping
pub async fn health_ping(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(summary(&state, true, "Server is running"))
}

/// GET /health/detailed - Record store and counter store round trips
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let store = timed(state.store.backend(), state.store.ping()).await;
    let counters = state.limiter.store();
    let rate_limit = timed(counters.backend(), counters.ping()).await;

    if !store.is_healthy() {
        tracing::warn!(error = ?store.error, "record store health check failed");
    }

    // The counter store fails open, so only the record store degrades the result.
    let healthy = store.is_healthy();
    let message = if healthy {
        "Server is running"
    } else {
        "Server is running with degraded dependencies"
    };

    Json(DetailedHealthResponse {
        summary: summary(&state, healthy, message),
        uptime: SERVER_START.elapsed().as_secs(),
        checks: HealthChecks { store, rate_limit },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{app, call};
    use axum::http::{Method, StatusCode};

    #[test]
    fn test_service_check_omits_empty_fields() {
        let check = ServiceCheck {
            status: "healthy".to_string(),
            backend: "memory".to_string(),
            response_time: Some(3),
            error: None,
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["responseTime"], 3);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_health_ping() {
        let state = AppState::for_tests();
        let (status, body) = call(&app(&state), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Server is running");
        assert_eq!(body["environment"], "test");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_detailed_reports_backends() {
        init_start_time();
        let state = AppState::for_tests();
        let (status, body) = call(&app(&state), Method::GET, "/health/detailed", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["checks"]["store"]["status"], "healthy");
        assert_eq!(body["checks"]["store"]["backend"], "memory");
        assert_eq!(body["checks"]["rateLimit"]["backend"], "memory");
        assert!(body["uptime"].is_u64());
    }
}
