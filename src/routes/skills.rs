/**
 * Skill Routes
 */
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AdminUser;
use crate::db::models::{NewSkill, Skill, SkillPatch};
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::services::assets::delete_assets;
use crate::state::AppState;
use crate::store::SkillFilter;
use crate::validation::{
    asset_url, empty_string_as_none, parse_checked, skill_category, ListQuery, ObjectId, Payload,
    ValidatedJson, ValidatedQuery, TECH_NAME,
};

const DEFAULT_LIMIT: u32 = 50;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSkillRequest {
    #[serde(default)]
    #[validate(
        length(min = 2, max = 50, message = "Name must be 2-50 characters"),
        regex(path = *TECH_NAME, message = "Name contains invalid characters")
    )]
    pub name: String,

    #[serde(default)]
    #[validate(custom(function = "skill_category"))]
    pub category: String,

    #[serde(default)]
    #[validate(range(min = 1, max = 100, message = "Proficiency must be 1-100"))]
    pub proficiency: i32,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub icon: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Description must be under 500 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, max = 50, message = "Years of experience must be 0-50"))]
    pub years_of_experience: Option<i32>,

    #[serde(default)]
    pub featured: Option<bool>,
}

impl Payload for CreateSkillRequest {}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSkillRequest {
    #[validate(
        length(min = 2, max = 50, message = "Name must be 2-50 characters"),
        regex(path = *TECH_NAME, message = "Name contains invalid characters")
    )]
    pub name: Option<String>,

    #[validate(custom(function = "skill_category"))]
    pub category: Option<String>,

    #[validate(range(min = 1, max = 100, message = "Proficiency must be 1-100"))]
    pub proficiency: Option<i32>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub icon: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Description must be under 500 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 0, max = 50, message = "Years of experience must be 0-50"))]
    pub years_of_experience: Option<i32>,

    pub featured: Option<bool>,
}

impl Payload for UpdateSkillRequest {}

/// GET /skills
pub async fn list_skills(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Skill>>> {
    let filter = SkillFilter {
        category: query.category.clone(),
        featured: query.featured,
    };
    let page = query.page_request(DEFAULT_LIMIT);

    let (skills, total) = state.store.list_skills(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Skills retrieved successfully",
        skills,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// GET /skills/{id}
pub async fn get_skill(
    State(state): State<AppState>,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<Skill>> {
    let skill = state
        .store
        .find_skill(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Skill"))?;
    Ok(ApiResponse::ok("Skill retrieved successfully", skill))
}

/// POST /skills
pub async fn create_skill(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(body): ValidatedJson<CreateSkillRequest>,
) -> Result<ApiResponse<Skill>> {
    let skill = state
        .store
        .insert_skill(NewSkill {
            category: parse_checked(&body.category)?,
            name: body.name,
            proficiency: body.proficiency,
            icon: body.icon,
            description: body.description,
            years_of_experience: body.years_of_experience.unwrap_or(0),
            featured: body.featured.unwrap_or(false),
        })
        .await?;
    Ok(ApiResponse::created("Skill created successfully", skill))
}

/// PUT /skills/{id}
pub async fn update_skill(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
    ValidatedJson(body): ValidatedJson<UpdateSkillRequest>,
) -> Result<ApiResponse<Skill>> {
    let patch = SkillPatch {
        category: body.category.as_deref().map(parse_checked).transpose()?,
        name: body.name,
        proficiency: body.proficiency,
        icon: body.icon,
        description: body.description,
        years_of_experience: body.years_of_experience,
        featured: body.featured,
    };
    let skill = state
        .store
        .update_skill(&id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("Skill"))?;
    Ok(ApiResponse::ok("Skill updated successfully", skill))
}

/// DELETE /skills/{id}
pub async fn delete_skill(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<()>> {
    let skill = state
        .store
        .delete_skill(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Skill"))?;
    delete_assets(&*state.assets, skill.icon.iter()).await;
    Ok(ApiResponse::message_only("Skill deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{admin_token, app, call};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_skill_lifecycle() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let body = json!({ "name": "Rust", "category": "backend", "proficiency": 85 });

        let (status, created) =
            call(&app, Method::POST, "/api/v1/skills", Some(&token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["yearsOfExperience"], 0);
        assert_eq!(created["data"]["featured"], false);

        let (status, _) = call(&app, Method::POST, "/api/v1/skills", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/v1/skills/{}", created["data"]["_id"].as_str().unwrap());
        let (status, updated) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "proficiency": 90, "featured": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["proficiency"], 90);
        assert_eq!(updated["data"]["name"], "Rust");

        let (status, list) = call(&app, Method::GET, "/api/v1/skills?featured=true", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["pagination"]["limit"], 50);
        assert_eq!(list["pagination"]["total"], 1);

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proficiency_out_of_range() {
        let state = AppState::for_tests();
        let token = admin_token(&state).await;
        let (status, body) = call(
            &app(&state),
            Method::POST,
            "/api/v1/skills",
            Some(&token),
            Some(json!({ "name": "Go", "category": "backend", "proficiency": 150 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Proficiency must be 1-100");
    }
}
