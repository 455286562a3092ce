/**
 * Project Routes
 * Portfolio projects: public listing and reads, admin authoring
 */
use axum::extract::{Path, State};
use serde::Deserialize;
use validator::Validate;

use crate::auth::{AdminUser, MaybeAuthUser};
use crate::client_info::ClientInfo;
use crate::db::models::{EventType, NewProject, Project, ProjectPatch, ProjectStatus};
use crate::derive::DeriveFields;
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::routes::{analytics::record_view, LikeCount};
use crate::services::assets::delete_assets;
use crate::state::AppState;
use crate::store::{Counter, ProjectFilter};
use crate::validation::{
    asset_urls, empty_string_as_none, parse_checked, project_category,
    project_status, technology_items, ListQuery, ObjectId, Payload, ValidatedJson,
    ValidatedQuery, PROJECT_TITLE,
};

const DEFAULT_LIMIT: u32 = 10;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(default)]
    #[validate(
        length(min = 3, max = 100, message = "Title must be 3-100 characters"),
        regex(path = *PROJECT_TITLE, message = "Title contains invalid characters")
    )]
    pub title: String,

    #[serde(default)]
    #[validate(length(min = 10, max = 5000, message = "Description must be 10-5000 characters"))]
    pub description: String,

    #[serde(default)]
    #[validate(length(
        min = 10,
        max = 200,
        message = "Short description must be 10-200 characters"
    ))]
    pub short_description: String,

    #[serde(default)]
    #[validate(
        length(min = 1, max = 20, message = "1-20 technologies required"),
        custom(function = "technology_items")
    )]
    pub technologies: Vec<String>,

    #[serde(default)]
    #[validate(custom(function = "project_category"))]
    pub category: String,

    #[serde(default)]
    #[validate(
        length(max = 10, message = "Maximum 10 images allowed"),
        custom(function = "asset_urls")
    )]
    pub images: Vec<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        length(max = 500, message = "Live URL must be valid and under 500 characters"),
        custom(function = "crate::validation::live_url")
    )]
    pub live_url: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Must be a valid GitHub URL"), custom(function = "crate::validation::github_url"))]
    pub github_url: Option<String>,

    #[serde(default)]
    pub featured: Option<bool>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "project_status"))]
    pub status: Option<String>,
}

impl Payload for CreateProjectRequest {
    const RICH_TEXT: &'static [&'static str] = &["description"];
}

impl CreateProjectRequest {
    fn into_new(self) -> Result<NewProject> {
        Ok(NewProject {
            category: parse_checked(&self.category)?,
            status: match self.status.as_deref() {
                Some(status) => parse_checked(status)?,
                None => ProjectStatus::Draft,
            },
            title: self.title,
            description: self.description,
            short_description: self.short_description,
            technologies: self.technologies,
            images: self.images,
            live_url: self.live_url,
            github_url: self.github_url,
            featured: self.featured.unwrap_or(false),
            slug: String::new(),
        }
        .derive_fields())
    }
}

/// Same rules as create; only fields present are checked and changed.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    #[validate(
        length(min = 3, max = 100, message = "Title must be 3-100 characters"),
        regex(path = *PROJECT_TITLE, message = "Title contains invalid characters")
    )]
    pub title: Option<String>,

    #[validate(length(min = 10, max = 5000, message = "Description must be 10-5000 characters"))]
    pub description: Option<String>,

    #[validate(length(
        min = 10,
        max = 200,
        message = "Short description must be 10-200 characters"
    ))]
    pub short_description: Option<String>,

    #[validate(
        length(min = 1, max = 20, message = "1-20 technologies required"),
        custom(function = "technology_items")
    )]
    pub technologies: Option<Vec<String>>,

    #[validate(custom(function = "project_category"))]
    pub category: Option<String>,

    #[validate(
        length(max = 10, message = "Maximum 10 images allowed"),
        custom(function = "asset_urls")
    )]
    pub images: Option<Vec<String>>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(
        length(max = 500, message = "Live URL must be valid and under 500 characters"),
        custom(function = "crate::validation::live_url")
    )]
    pub live_url: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Must be a valid GitHub URL"), custom(function = "crate::validation::github_url"))]
    pub github_url: Option<String>,

    pub featured: Option<bool>,

    #[validate(custom(function = "project_status"))]
    pub status: Option<String>,
}

impl Payload for UpdateProjectRequest {
    const RICH_TEXT: &'static [&'static str] = &["description"];
}

impl UpdateProjectRequest {
    fn into_patch(self) -> Result<ProjectPatch> {
        Ok(ProjectPatch {
            category: self.category.as_deref().map(parse_checked).transpose()?,
            status: self.status.as_deref().map(parse_checked).transpose()?,
            title: self.title,
            description: self.description,
            short_description: self.short_description,
            technologies: self.technologies,
            images: self.images,
            live_url: self.live_url,
            github_url: self.github_url,
            featured: self.featured,
            slug: None,
        }
        .derive_fields())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /projects - Published projects; admins may filter by any status
pub async fn list_projects(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Project>>> {
    let status = if viewer.is_admin() {
        query
            .status
            .as_deref()
            .map(parse_checked::<ProjectStatus>)
            .transpose()?
    } else {
        Some(ProjectStatus::Published)
    };
    let filter = ProjectFilter {
        status,
        category: query.category.clone(),
        featured: query.featured,
        search: query.search.clone(),
    };
    let page = query.page_request(DEFAULT_LIMIT);

    let (projects, total) = state.store.list_projects(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Projects retrieved successfully",
        projects,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// GET /projects/{id} - By id or slug; a published read counts a view
pub async fn get_project(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    client: ClientInfo,
    Path(key): Path<String>,
) -> Result<ApiResponse<Project>> {
    let project = state
        .store
        .find_project(&key)
        .await?
        .filter(|p| p.status == ProjectStatus::Published || viewer.is_admin())
        .ok_or_else(|| AppError::not_found("Project"))?;

    if project.status != ProjectStatus::Published {
        return Ok(ApiResponse::ok("Project retrieved successfully", project));
    }

    let project = state
        .store
        .increment_project(&project.id, Counter::Views)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    record_view(&state, EventType::ProjectView, &project.id, client).await;

    Ok(ApiResponse::ok("Project retrieved successfully", project))
}

/// POST /projects/{id}/like
pub async fn like_project(
    State(state): State<AppState>,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<LikeCount>> {
    let project = state
        .store
        .increment_project(&id, Counter::Likes)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(ApiResponse::ok(
        "Project liked successfully",
        LikeCount { likes: project.likes },
    ))
}

/// POST /projects - Create (admin)
pub async fn create_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(body): ValidatedJson<CreateProjectRequest>,
) -> Result<ApiResponse<Project>> {
    let project = state.store.insert_project(body.into_new()?).await?;
    tracing::info!(project_id = %project.id, admin_id = %admin.id, "project created");
    Ok(ApiResponse::created("Project created successfully", project))
}

/// PUT /projects/{id} - Partial update (admin)
pub async fn update_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
    ValidatedJson(body): ValidatedJson<UpdateProjectRequest>,
) -> Result<ApiResponse<Project>> {
    let project = state
        .store
        .update_project(&id, body.into_patch()?)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(ApiResponse::ok("Project updated successfully", project))
}

/// DELETE /projects/{id} - Delete (admin), along with its stored images
pub async fn delete_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<()>> {
    let project = state
        .store
        .delete_project(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    delete_assets(&*state.assets, &project.images).await;
    tracing::info!(project_id = %project.id, admin_id = %admin.id, "project deleted");
    Ok(ApiResponse::message_only("Project deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{admin_token, app, call, user_token};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn project_body() -> Value {
        json!({
            "title": "My First Project",
            "description": "A portfolio project with a <strong>bold</strong> claim",
            "shortDescription": "Short summary here",
            "technologies": ["Rust", "Node.js"],
            "category": "web",
        })
    }

    async fn create(app: &axum::Router, token: &str, body: Value) -> Value {
        let (status, body) = call(app, Method::POST, "/api/v1/projects", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].clone()
    }

    #[tokio::test]
    async fn test_create_requires_admin() {
        let state = AppState::for_tests();
        let app = app(&state);
        let (status, _) =
            call(&app, Method::POST, "/api/v1/projects", None, Some(project_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = user_token(&state).await;
        let (status, body) =
            call(&app, Method::POST, "/api/v1/projects", Some(&token), Some(project_body())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Insufficient permissions");
    }

    #[tokio::test]
    async fn test_technology_count_bounds() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;

        let mut body = project_body();
        body["technologies"] = json!([]);
        let (status, res) = call(&app, Method::POST, "/api/v1/projects", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res["message"], "1-20 technologies required");

        let mut body = project_body();
        body["technologies"] = json!(["Rust"]);
        let created = create(&app, &token, body).await;
        assert_eq!(created["status"], "draft");
        assert_eq!(created["slug"], "my-first-project");
        assert_eq!(created["views"], 0);
        assert_eq!(created["description"], "A portfolio project with a <strong>bold</strong> claim");
    }

    #[tokio::test]
    async fn test_validation_reports_every_rule_and_writes_nothing() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;

        let (status, res) = call(
            &app,
            Method::POST,
            "/api/v1/projects",
            Some(&token),
            Some(json!({ "title": "ab", "category": "game", "githubUrl": "https://example.com/x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = res["message"].as_str().unwrap();
        for expected in [
            "Title must be 3-100 characters",
            "Invalid category",
            "Must be a valid GitHub URL",
            "1-20 technologies required",
        ] {
            assert!(message.contains(expected), "{}", message);
        }

        let (projects, total) = state
            .store
            .list_projects(&ProjectFilter::default(), crate::store::PageRequest::new(1, 10))
            .await
            .unwrap();
        assert!(projects.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_draft_is_hidden_from_public() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let created = create(&app, &token, project_body()).await;
        let id = created["_id"].as_str().unwrap();

        let (status, body) = call(&app, Method::GET, &format!("/api/v1/projects/{}", id), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Project not found");

        let (status, body) =
            call(&app, Method::GET, &format!("/api/v1/projects/{}", id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["views"], 0);

        let (_, list) = call(&app, Method::GET, "/api/v1/projects", None, None).await;
        assert_eq!(list["pagination"]["total"], 0);
        let (_, list) = call(&app, Method::GET, "/api/v1/projects?status=draft", Some(&token), None).await;
        assert_eq!(list["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn test_public_reads_count_views_and_log_events() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let mut body = project_body();
        body["status"] = json!("published");
        let created = create(&app, &token, body).await;
        let id = created["_id"].as_str().unwrap().to_string();

        let (_, first) = call(&app, Method::GET, &format!("/api/v1/projects/{}", id), None, None).await;
        assert_eq!(first["data"]["views"], 1);
        let (_, second) =
            call(&app, Method::GET, "/api/v1/projects/my-first-project", None, None).await;
        assert_eq!(second["data"]["views"], 2);

        let (events, total) = state
            .store
            .list_events(
                &crate::store::EventFilter {
                    event_type: Some(EventType::ProjectView),
                    ..Default::default()
                },
                crate::store::PageRequest::new(1, 10),
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(events.iter().all(|e| e.resource_id.as_deref() == Some(id.as_str())));
    }

    #[tokio::test]
    async fn test_update_is_partial_and_idempotent() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let created = create(&app, &token, project_body()).await;
        let uri = format!("/api/v1/projects/{}", created["_id"].as_str().unwrap());

        let patch = json!({ "title": "Renamed Project", "featured": true });
        let (status, first) = call(&app, Method::PUT, &uri, Some(&token), Some(patch.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["slug"], "renamed-project");
        assert_eq!(first["data"]["shortDescription"], "Short summary here");

        let (_, second) = call(&app, Method::PUT, &uri, Some(&token), Some(patch)).await;
        assert_eq!(first["data"]["title"], second["data"]["title"]);
        assert_eq!(first["data"]["featured"], second["data"]["featured"]);
        assert_eq!(first["data"]["slug"], second["data"]["slug"]);

        let (status, body) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "technologies": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "1-20 technologies required");
    }

    #[tokio::test]
    async fn test_like_and_delete() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let created = create(&app, &token, project_body()).await;
        let id = created["_id"].as_str().unwrap();

        let (status, body) =
            call(&app, Method::POST, &format!("/api/v1/projects/{}/like", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["likes"], 1);

        let uri = format!("/api/v1/projects/{}", id);
        let (status, body) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Project deleted successfully");
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let state = AppState::for_tests();
        let token = admin_token(&state).await;
        let (status, body) =
            call(&app(&state), Method::DELETE, "/api/v1/projects/123", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid ID format");
    }
}
