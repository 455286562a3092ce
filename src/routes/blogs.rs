/**
 * Blog Routes
 * Blog posts: public listing and reads, admin authoring
 */
use axum::extract::{Path, State};
use serde::Deserialize;
use validator::Validate;

use crate::auth::{AdminUser, MaybeAuthUser};
use crate::client_info::ClientInfo;
use crate::db::models::{Blog, BlogPatch, EventType, NewBlog};
use crate::derive::DeriveFields;
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::routes::{analytics::record_view, LikeCount};
use crate::services::assets::delete_assets;
use crate::state::AppState;
use crate::store::{BlogFilter, Counter};
use crate::validation::{
    asset_url, blog_category, empty_string_as_none, parse_checked, tag_items, ListQuery,
    ObjectId, Payload, ValidatedJson, ValidatedQuery, BLOG_TITLE,
};

const DEFAULT_LIMIT: u32 = 10;

fn lowercase_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().map(|t| t.to_lowercase()).collect()
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    #[serde(default)]
    #[validate(
        length(min = 5, max = 150, message = "Title must be 5-150 characters"),
        regex(path = *BLOG_TITLE, message = "Title contains invalid characters")
    )]
    pub title: String,

    #[serde(default)]
    #[validate(length(min = 100, max = 50000, message = "Content must be 100-50000 characters"))]
    pub content: String,

    #[serde(default)]
    #[validate(length(min = 10, max = 300, message = "Excerpt must be 10-300 characters"))]
    pub excerpt: String,

    #[serde(default)]
    #[validate(
        length(max = 10, message = "Maximum 10 tags allowed"),
        custom(function = "tag_items")
    )]
    pub tags: Vec<String>,

    #[serde(default)]
    #[validate(custom(function = "blog_category"))]
    pub category: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub featured_image: Option<String>,

    #[serde(default)]
    pub published: Option<bool>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 60, message = "SEO title must be under 60 characters"))]
    pub seo_title: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 160, message = "SEO description must be under 160 characters"))]
    pub seo_description: Option<String>,
}

impl Payload for CreateBlogRequest {
    const RICH_TEXT: &'static [&'static str] = &["content"];
}

impl CreateBlogRequest {
    fn into_new(self, author_id: String) -> Result<NewBlog> {
        Ok(NewBlog {
            category: parse_checked(&self.category)?,
            tags: lowercase_tags(self.tags),
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            author_id,
            featured_image: self.featured_image,
            published: self.published.unwrap_or(false),
            seo_title: self.seo_title,
            seo_description: self.seo_description,
            slug: String::new(),
            read_time: 0,
        }
        .derive_fields())
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogRequest {
    #[validate(
        length(min = 5, max = 150, message = "Title must be 5-150 characters"),
        regex(path = *BLOG_TITLE, message = "Title contains invalid characters")
    )]
    pub title: Option<String>,

    #[validate(length(min = 100, max = 50000, message = "Content must be 100-50000 characters"))]
    pub content: Option<String>,

    #[validate(length(min = 10, max = 300, message = "Excerpt must be 10-300 characters"))]
    pub excerpt: Option<String>,

    #[validate(
        length(max = 10, message = "Maximum 10 tags allowed"),
        custom(function = "tag_items")
    )]
    pub tags: Option<Vec<String>>,

    #[validate(custom(function = "blog_category"))]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub featured_image: Option<String>,

    pub published: Option<bool>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 60, message = "SEO title must be under 60 characters"))]
    pub seo_title: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 160, message = "SEO description must be under 160 characters"))]
    pub seo_description: Option<String>,
}

impl Payload for UpdateBlogRequest {
    const RICH_TEXT: &'static [&'static str] = &["content"];
}

impl UpdateBlogRequest {
    fn into_patch(self) -> Result<BlogPatch> {
        Ok(BlogPatch {
            category: self.category.as_deref().map(parse_checked).transpose()?,
            tags: self.tags.map(lowercase_tags),
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            featured_image: self.featured_image,
            published: self.published,
            seo_title: self.seo_title,
            seo_description: self.seo_description,
            slug: None,
            read_time: None,
        }
        .derive_fields())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /blogs - Published posts; admins see drafts unless `published` narrows it
pub async fn list_blogs(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Blog>>> {
    let filter = BlogFilter {
        published: if viewer.is_admin() {
            query.published
        } else {
            Some(true)
        },
        category: query.category.clone(),
        tag: query.tag.as_deref().map(str::to_lowercase),
        search: query.search.clone(),
    };
    let page = query.page_request(DEFAULT_LIMIT);

    let (blogs, total) = state.store.list_blogs(&filter, page).await?;
    Ok(ApiResponse::paginated(
        "Blogs retrieved successfully",
        blogs,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// GET /blogs/{id} - By id or slug; a published read counts a view
pub async fn get_blog(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    client: ClientInfo,
    Path(key): Path<String>,
) -> Result<ApiResponse<Blog>> {
    let blog = state
        .store
        .find_blog(&key)
        .await?
        .filter(|b| b.published || viewer.is_admin())
        .ok_or_else(|| AppError::not_found("Blog"))?;

    if !blog.published {
        return Ok(ApiResponse::ok("Blog retrieved successfully", blog));
    }

    let blog = state
        .store
        .increment_blog(&blog.id, Counter::Views)
        .await?
        .ok_or_else(|| AppError::not_found("Blog"))?;
    record_view(&state, EventType::BlogView, &blog.id, client).await;

    Ok(ApiResponse::ok("Blog retrieved successfully", blog))
}

/// POST /blogs/{id}/like
pub async fn like_blog(
    State(state): State<AppState>,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<LikeCount>> {
    let blog = state
        .store
        .increment_blog(&id, Counter::Likes)
        .await?
        .ok_or_else(|| AppError::not_found("Blog"))?;
    Ok(ApiResponse::ok("Blog liked successfully", LikeCount { likes: blog.likes }))
}

/// POST /blogs - Create (admin); the caller becomes the author
pub async fn create_blog(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(body): ValidatedJson<CreateBlogRequest>,
) -> Result<ApiResponse<Blog>> {
    let blog = state.store.insert_blog(body.into_new(admin.id.clone())?).await?;
    tracing::info!(blog_id = %blog.id, admin_id = %admin.id, "blog created");
    Ok(ApiResponse::created("Blog created successfully", blog))
}

/// PUT /blogs/{id}
pub async fn update_blog(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
    ValidatedJson(body): ValidatedJson<UpdateBlogRequest>,
) -> Result<ApiResponse<Blog>> {
    let blog = state
        .store
        .update_blog(&id, body.into_patch()?)
        .await?
        .ok_or_else(|| AppError::not_found("Blog"))?;
    Ok(ApiResponse::ok("Blog updated successfully", blog))
}

/// DELETE /blogs/{id}
pub async fn delete_blog(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<()>> {
    let blog = state
        .store
        .delete_blog(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Blog"))?;
    delete_assets(&*state.assets, blog.featured_image.iter()).await;
    tracing::info!(blog_id = %blog.id, admin_id = %admin.id, "blog deleted");
    Ok(ApiResponse::message_only("Blog deleted successfully"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_util::{admin_token, app, call};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    pub(crate) fn blog_body(published: bool) -> Value {
        json!({
            "title": "Notes on Rust Ownership",
            "content": "word ".repeat(250),
            "excerpt": "A short excerpt for the list page",
            "tags": ["Rust", "memory"],
            "category": "technology",
            "published": published,
        })
    }

    pub(crate) async fn create_blog(app: &axum::Router, token: &str, published: bool) -> Value {
        let (status, body) =
            call(app, Method::POST, "/api/v1/blogs", Some(token), Some(blog_body(published))).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].clone()
    }

    #[tokio::test]
    async fn test_create_derives_fields() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let blog = create_blog(&app, &token, true).await;

        assert_eq!(blog["slug"], "notes-on-rust-ownership");
        assert_eq!(blog["readTime"], 2);
        assert_eq!(blog["tags"], json!(["rust", "memory"]));
        assert_eq!(blog["author"]["name"], "Test User");
    }

    #[tokio::test]
    async fn test_short_content_is_rejected() {
        let state = AppState::for_tests();
        let token = admin_token(&state).await;
        let mut body = blog_body(true);
        body["content"] = json!("far too short");
        let (status, res) =
            call(&app(&state), Method::POST, "/api/v1/blogs", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res["message"], "Content must be 100-50000 characters");
    }

    #[tokio::test]
    async fn test_unpublished_post_visibility() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let blog = create_blog(&app, &token, false).await;
        let uri = format!("/api/v1/blogs/{}", blog["_id"].as_str().unwrap());

        let (status, _) = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, public) = call(&app, Method::GET, "/api/v1/blogs", None, None).await;
        assert_eq!(public["pagination"]["total"], 0);
        let (_, admin) = call(&app, Method::GET, "/api/v1/blogs", Some(&token), None).await;
        assert_eq!(admin["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn test_tag_filter_ignores_case_and_reads_count() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        create_blog(&app, &token, true).await;

        let (_, list) = call(&app, Method::GET, "/api/v1/blogs?tag=RUST", None, None).await;
        assert_eq!(list["pagination"]["total"], 1);

        let (_, read) =
            call(&app, Method::GET, "/api/v1/blogs/notes-on-rust-ownership", None, None).await;
        assert_eq!(read["data"]["views"], 1);
    }

    #[tokio::test]
    async fn test_update_recomputes_read_time() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let blog = create_blog(&app, &token, true).await;
        let uri = format!("/api/v1/blogs/{}", blog["_id"].as_str().unwrap());

        let (status, body) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "content": "word ".repeat(650) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["readTime"], 4);
        assert_eq!(body["data"]["slug"], "notes-on-rust-ownership");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
