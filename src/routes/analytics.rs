/**
 * Analytics Routes
 * Event tracking and the admin dashboard rollups
 */
use axum::extract::State;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::auth::AdminUser;
use crate::client_info::ClientInfo;
use crate::db::models::{AnalyticsEvent, DashboardStats, EventType, NewEvent};
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::state::AppState;
use crate::store::{EventFilter, PageRequest};
use crate::validation::{
    empty_string_as_none, parse_checked, parse_optional, Payload,
    ValidatedJson, ValidatedQuery,
};

const DEFAULT_LIMIT: u32 = 100;
const RECENT_DAYS: i64 = 7;
const TOP_RESOURCES: usize = 5;

/// Request body for POST /analytics/track
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(rename = "type", default)]
    #[validate(custom(function = "crate::validation::event_type"))]
    pub event_type: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "crate::validation::resource_id"))]
    pub resource_id: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 100, message = "Country must be under 100 characters"))]
    pub country: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 100, message = "City must be under 100 characters"))]
    pub city: Option<String>,
}

impl Payload for TrackRequest {}

/// Query parameters for GET /analytics
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    #[serde(default, deserialize_with = "parse_optional")]
    #[validate(range(min = 1, max = 1000, message = "Page must be 1-1000"))]
    pub page: Option<u32>,

    #[serde(default, deserialize_with = "parse_optional")]
    #[validate(range(min = 1, max = 1000, message = "Limit must be 1-1000"))]
    pub limit: Option<u32>,

    #[serde(rename = "type", default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "crate::validation::event_type"))]
    pub event_type: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub start_date: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub end_date: Option<String>,
}

/// RFC 3339 timestamp, or a calendar date taken as its first (or last) instant.
fn parse_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{}'", raw)))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::validation(format!("Invalid date '{}'", raw)))
}

/// Append one view event. A failure is logged and never reaches the caller.
pub async fn record_view(
    state: &AppState,
    event_type: EventType,
    resource_id: &str,
    client: ClientInfo,
) {
    let event = NewEvent {
        event_type: Some(event_type),
        resource_id: Some(resource_id.to_string()),
        user_agent: client.user_agent,
        ip: Some(client.ip),
        referrer: client.referrer,
        ..Default::default()
    };
    if let Err(e) = state.store.record_event(event).await {
        tracing::warn!(resource_id = %resource_id, error = %e, "failed to record view event");
    }
}

/// POST /analytics/track
pub async fn track(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(body): ValidatedJson<TrackRequest>,
) -> Result<ApiResponse<AnalyticsEvent>> {
    let event = state
        .store
        .record_event(NewEvent {
            event_type: Some(parse_checked(&body.event_type)?),
            resource_id: body.resource_id,
            user_agent: client.user_agent,
            ip: Some(client.ip),
            country: body.country,
            city: body.city,
            referrer: client.referrer,
        })
        .await?;
    Ok(ApiResponse::created("Event tracked successfully", event))
}

/// GET /analytics - Raw events, newest first
pub async fn list_events(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedQuery(query): ValidatedQuery<EventQuery>,
) -> Result<ApiResponse<Vec<AnalyticsEvent>>> {
    let filter = EventFilter {
        event_type: query.event_type.as_deref().map(parse_checked).transpose()?,
        start: query
            .start_date
            .as_deref()
            .map(|d| parse_date(d, false))
            .transpose()?,
        end: query
            .end_date
            .as_deref()
            .map(|d| parse_date(d, true))
            .transpose()?,
    };
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_LIMIT),
    );

    let (events, total) = state.store.list_events(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Analytics retrieved successfully",
        events,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// GET /analytics/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<ApiResponse<DashboardStats>> {
    let since = Utc::now() - chrono::Duration::days(RECENT_DAYS);
    let stats = state.store.dashboard(since, TOP_RESOURCES).await?;
    Ok(ApiResponse::ok("Dashboard stats retrieved successfully", stats))
}
