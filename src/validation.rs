/**
 * Validation
 * Shared rule set, aggregated error reporting and the validating extractors
 */
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::{borrow::Cow, fmt::Display, str::FromStr};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::db::models::{
    is_object_id, BlogCategory, ContactStatus, EventType, ProjectCategory, ProjectStatus,
    SkillCategory,
};
use crate::error::AppError;
use crate::sanitize::{self, TextPolicy};
use crate::store::PageRequest;

// ============================================================================
// Patterns
// ============================================================================

pub static LETTERS_AND_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s]+$").expect("static regex"));

pub static PERSON_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s\-']+$").expect("static regex"));

pub static PROJECT_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_.]+$").expect("static regex"));

pub static BLOG_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_.?!:]+$").expect("static regex"));

/// Technologies and skill names share one alphabet
pub static TECH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_.+#]+$").expect("static regex"));

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_]+$").expect("static regex"));

pub static COMMENT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[a-zA-Z0-9\s.,!?\-_()\[\]"'/\\]+$"#).expect("static regex"));

pub static SORT_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_-]+$").expect("static regex"));

pub static CATEGORY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"));

const PASSWORD_SYMBOLS: &str = "@$!%*?&";

// ============================================================================
// Custom rules
// ============================================================================

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn member<T: FromStr>(value: &str, message: &'static str) -> Result<(), ValidationError> {
    value
        .parse::<T>()
        .map(|_| ())
        .map_err(|_| rule("one_of", message))
}

pub fn password_strength(password: &str) -> Result<(), ValidationError> {
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));
    if lower && upper && digit && symbol {
        Ok(())
    } else {
        Err(rule(
            "password_strength",
            "Password must contain uppercase, lowercase, number and special character",
        ))
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Absolute http(s) URL, or a path served from the local asset directory.
fn is_asset_url(value: &str) -> bool {
    is_http_url(value) || (value.starts_with("/uploads/") && !value.contains(".."))
}

pub fn live_url(value: &str) -> Result<(), ValidationError> {
    if is_http_url(value) {
        Ok(())
    } else {
        Err(rule("url", "Live URL must be valid and under 500 characters"))
    }
}

pub fn github_url(value: &str) -> Result<(), ValidationError> {
    if is_http_url(value) && value.contains("github.com") {
        Ok(())
    } else {
        Err(rule("github_url", "Must be a valid GitHub URL"))
    }
}

pub fn asset_url(value: &str) -> Result<(), ValidationError> {
    if is_asset_url(value) {
        Ok(())
    } else {
        Err(rule("asset_url", "Invalid image URL"))
    }
}

pub fn asset_urls(values: &[String]) -> Result<(), ValidationError> {
    values.iter().try_for_each(|v| asset_url(v))
}

pub fn technology_items(items: &[String]) -> Result<(), ValidationError> {
    let valid = items
        .iter()
        .all(|t| (1..=30).contains(&t.chars().count()) && TECH_NAME.is_match(t));
    if valid {
        Ok(())
    } else {
        Err(rule("technology", "Invalid technology format"))
    }
}

pub fn tag_items(items: &[String]) -> Result<(), ValidationError> {
    let valid = items
        .iter()
        .all(|t| (2..=30).contains(&t.chars().count()) && TAG.is_match(t));
    if valid {
        Ok(())
    } else {
        Err(rule("tag", "Invalid tag format"))
    }
}

pub fn project_category(value: &str) -> Result<(), ValidationError> {
    member::<ProjectCategory>(value, "Invalid category")
}

pub fn project_status(value: &str) -> Result<(), ValidationError> {
    member::<ProjectStatus>(value, "Invalid status")
}

pub fn blog_category(value: &str) -> Result<(), ValidationError> {
    member::<BlogCategory>(value, "Invalid category")
}

pub fn skill_category(value: &str) -> Result<(), ValidationError> {
    member::<SkillCategory>(value, "Invalid category")
}

pub fn contact_status(value: &str) -> Result<(), ValidationError> {
    member::<ContactStatus>(value, "Invalid status")
}

pub fn event_type(value: &str) -> Result<(), ValidationError> {
    member::<EventType>(value, "Invalid analytics type")
}

pub fn parent_comment_id(value: &str) -> Result<(), ValidationError> {
    if is_object_id(value) {
        Ok(())
    } else {
        Err(rule("object_id", "Invalid parent comment ID"))
    }
}

pub fn resource_id(value: &str) -> Result<(), ValidationError> {
    if is_object_id(value) {
        Ok(())
    } else {
        Err(rule("object_id", "Invalid resource ID"))
    }
}

/// Parse a field whose rule already passed validation.
pub fn parse_checked<T>(value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| AppError::validation(e.to_string()))
}

// ============================================================================
// Deserialization helpers
// ============================================================================

/// Optional string where `""` counts as absent.
pub fn empty_string_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Optional value carried as a string (query parameters); `""` counts as absent.
pub fn parse_optional<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match empty_string_as_none(de)? {
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

// ============================================================================
// Error aggregation
// ============================================================================

/// Every violated rule's message, including nested structs and list items.
pub fn collect_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages = Vec::new();
    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(errs) => {
                messages.extend(errs.iter().map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid {}", field),
                }))
            }
            ValidationErrorsKind::Struct(inner) => messages.extend(collect_messages(inner)),
            ValidationErrorsKind::List(items) => {
                for inner in items.values() {
                    messages.extend(collect_messages(inner));
                }
            }
        }
    }
    messages
}

// ============================================================================
// Extractors
// ============================================================================

/// A JSON request body with a rule set.
pub trait Payload: DeserializeOwned + Validate {
    /// Object keys whose strings keep the rich-text allow-list.
    const RICH_TEXT: &'static [&'static str] = &[];
}

/// Sanitized, deserialized and validated JSON body.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Payload + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(raw) = Json::<Value>::from_request(req, state).await?;
        let cleaned = sanitize::sanitize_value(raw, T::RICH_TEXT);
        let payload: T = serde_json::from_value(cleaned)
            .map_err(|e| AppError::validation(format!("Invalid request body: {}", e)))?;
        payload
            .validate()
            .map_err(|e| AppError::Validation(collect_messages(&e)))?;
        Ok(ValidatedJson(payload))
    }
}

/// Sanitized and validated query string. Every value reaches `T` as a string.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)?;
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(sanitize::clean_text(&v, TextPolicy::Plain))))
            .collect();
        let query: T = serde_json::from_value(Value::Object(map))
            .map_err(|e| AppError::validation(format!("Invalid query parameters: {}", e)))?;
        query
            .validate()
            .map_err(|e| AppError::Validation(collect_messages(&e)))?;
        Ok(ValidatedQuery(query))
    }
}

/// A single `{id}` path segment that must be a document id.
#[derive(Debug, Clone)]
pub struct ObjectId(pub String);

impl<S> FromRequestParts<S> for ObjectId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<String>::from_request_parts(parts, state).await?;
        if !is_object_id(&id) {
            return Err(AppError::validation("Invalid ID format"));
        }
        Ok(ObjectId(id))
    }
}

// ============================================================================
// Common queries
// ============================================================================

/// Listing parameters shared by every collection endpoint.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListQuery {
    #[serde(default, deserialize_with = "parse_optional")]
    #[validate(range(min = 1, max = 1000, message = "Page must be 1-1000"))]
    pub page: Option<u32>,

    #[serde(default, deserialize_with = "parse_optional")]
    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    pub limit: Option<u32>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        length(max = 50, message = "Invalid category format"),
        regex(path = *CATEGORY_PARAM, message = "Invalid category format")
    )]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "parse_optional")]
    pub featured: Option<bool>,

    #[serde(default, deserialize_with = "parse_optional")]
    pub published: Option<bool>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub tag: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(min = 1, max = 100, message = "Search must be 1-100 characters"))]
    pub search: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        length(max = 50, message = "Invalid sort parameter"),
        regex(path = *SORT_PARAM, message = "Invalid sort parameter")
    )]
    pub sort: Option<String>,
}

impl ListQuery {
    pub fn page_request(&self, default_limit: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.limit.unwrap_or(default_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Validate)]
    struct Sample {
        #[serde(default)]
        #[validate(length(min = 3, message = "Title too short"))]
        title: String,
        #[serde(default)]
        #[validate(
            length(min = 1, max = 20, message = "1-20 technologies required"),
            custom(function = "technology_items")
        )]
        technologies: Vec<String>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        #[validate(custom(function = "crate::validation::github_url"))]
        github_url: Option<String>,
    }

    fn messages(value: Value) -> Vec<String> {
        let sample: Sample = serde_json::from_value(value).unwrap();
        let mut messages = sample.validate().map(|_| Vec::new()).unwrap_or_else(|e| collect_messages(&e));
        messages.sort();
        messages
    }

    #[test]
    fn test_messages_are_aggregated() {
        let got = messages(json!({ "title": "ab", "technologies": [] }));
        assert_eq!(got, vec!["1-20 technologies required", "Title too short"]);
    }

    #[test]
    fn test_one_message_per_bad_technology_list() {
        let got = messages(json!({ "title": "abc", "technologies": ["ok", "bad<>", "also$bad"] }));
        assert_eq!(got, vec!["Invalid technology format"]);
    }

    #[test]
    fn test_empty_optional_is_absent() {
        assert!(messages(json!({ "title": "abc", "technologies": ["Rust"], "github_url": "" })).is_empty());
        assert_eq!(
            messages(json!({ "title": "abc", "technologies": ["Rust"], "github_url": "https://gitlab.com/x" })),
            vec!["Must be a valid GitHub URL"]
        );
    }

    #[test]
    fn test_password_strength() {
        assert!(password_strength("Password1!").is_ok());
        assert!(password_strength("password1!").is_err());
        assert!(password_strength("Password!!").is_err());
        assert!(password_strength("Password12").is_err());
    }

    #[test]
    fn test_asset_urls() {
        assert!(asset_url("https://res.cloudinary.com/demo/image/upload/a.png").is_ok());
        assert!(asset_url("/uploads/general/a.png").is_ok());
        assert!(asset_url("/uploads/../secret").is_err());
        assert!(asset_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_tag_items() {
        assert!(tag_items(&["rust".into(), "web-dev".into()]).is_ok());
        assert!(tag_items(&["a".into()]).is_err());
        assert!(tag_items(&["has space".into()]).is_err());
    }

    #[test]
    fn test_list_query_defaults_and_ranges() {
        let query: ListQuery = serde_json::from_value(json!({ "page": "2", "featured": "true" })).unwrap();
        assert!(query.validate().is_ok());
        assert_eq!(query.page_request(10), PageRequest::new(2, 10));
        assert_eq!(query.featured, Some(true));

        let query: ListQuery = serde_json::from_value(json!({ "limit": "500", "sort": "d r" })).unwrap();
        let mut got = collect_messages(&query.validate().unwrap_err());
        got.sort();
        assert_eq!(got, vec!["Invalid sort parameter", "Limit must be 1-100"]);
    }

    #[test]
    fn test_list_query_rejects_non_numeric_page() {
        assert!(serde_json::from_value::<ListQuery>(json!({ "page": "two" })).is_err());
    }
}
