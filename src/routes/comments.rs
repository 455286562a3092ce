/**
 * Comment Routes
 * Threaded comments on blog posts with admin moderation
 */
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use crate::auth::{AdminUser, MaybeAuthUser};
use crate::db::models::{Comment, CommentAuthor, CommentThread, NewComment};
use crate::error::{AppError, Result};
use crate::response::{ApiResponse, Pagination};
use crate::state::AppState;
use crate::validation::{
    asset_url, empty_string_as_none, parent_comment_id, ListQuery, ObjectId, Payload,
    ValidatedJson, ValidatedQuery, COMMENT_TEXT, PERSON_NAME,
};

const DEFAULT_LIMIT: u32 = 20;
const AVATAR_SERVICE: &str = "https://ui-avatars.com/api/";

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CommentAuthorInput {
    #[serde(default)]
    #[validate(
        length(min = 2, max = 50, message = "Author name must be 2-50 characters"),
        regex(path = *PERSON_NAME, message = "Author name contains invalid characters")
    )]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "asset_url"))]
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[serde(default)]
    #[validate(
        length(min = 5, max = 1000, message = "Comment must be 5-1000 characters"),
        regex(path = *COMMENT_TEXT, message = "Comment contains invalid characters")
    )]
    pub content: String,

    #[serde(default)]
    #[validate(nested)]
    pub author: CommentAuthorInput,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom(function = "parent_comment_id"))]
    pub parent_comment: Option<String>,
}

impl Payload for CreateCommentRequest {}

fn default_avatar(name: &str) -> String {
    reqwest::Url::parse_with_params(AVATAR_SERVICE, &[("name", name), ("background", "random")])
        .map(String::from)
        .unwrap_or_else(|_| AVATAR_SERVICE.to_string())
}

/// 404 unless the blog exists and the caller may see it.
async fn visible_blog(state: &AppState, viewer: &MaybeAuthUser, blog_id: &str) -> Result<()> {
    state
        .store
        .find_blog(blog_id)
        .await?
        .filter(|b| b.published || viewer.is_admin())
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Blog"))
}

/// GET /comments/blog/{blogId} - Approved threads
pub async fn list_comments(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    ObjectId(blog_id): ObjectId,
    ValidatedQuery(query): ValidatedQuery<ListQuery>,
) -> Result<ApiResponse<Vec<CommentThread>>> {
    visible_blog(&state, &viewer, &blog_id).await?;
    let page = query.page_request(DEFAULT_LIMIT);

    let (threads, total) = state.store.list_comment_threads(&blog_id, page).await?;
    Ok(ApiResponse::paginated(
        "Comments retrieved successfully",
        threads,
        Pagination::new(page.page, page.limit, total),
    ))
}

/// POST /comments/blog/{blogId} - Held until an admin approves it
pub async fn create_comment(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    ObjectId(blog_id): ObjectId,
    ValidatedJson(body): ValidatedJson<CreateCommentRequest>,
) -> Result<ApiResponse<Comment>> {
    visible_blog(&state, &viewer, &blog_id).await?;

    if let Some(parent_id) = body.parent_comment.as_deref() {
        state
            .store
            .find_comment(parent_id)
            .await?
            .filter(|parent| parent.blog_id == blog_id)
            .ok_or_else(|| AppError::not_found("Parent comment"))?;
    }

    let CommentAuthorInput { name, email, avatar } = body.author;
    let comment = state
        .store
        .insert_comment(NewComment {
            content: body.content,
            author: CommentAuthor {
                avatar: avatar.unwrap_or_else(|| default_avatar(&name)),
                email: email.to_lowercase(),
                name,
            },
            blog_id,
            parent_comment: body.parent_comment,
        })
        .await?;
    tracing::info!(comment_id = %comment.id, blog_id = %comment.blog_id, "comment submitted");

    Ok(ApiResponse::created("Comment submitted for approval", comment))
}

/// PATCH /comments/{id}/approve
pub async fn approve_comment(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<Comment>> {
    let comment = state
        .store
        .approve_comment(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment"))?;
    Ok(ApiResponse::ok("Comment approved successfully", comment))
}

/// DELETE /comments/{id} - Removes the comment and its replies
pub async fn delete_comment(
    State(state): State<AppState>,
    _admin: AdminUser,
    ObjectId(id): ObjectId,
) -> Result<ApiResponse<()>> {
    let removed = state.store.delete_comment(&id).await?;
    if removed == 0 {
        return Err(AppError::not_found("Comment"));
    }
    tracing::info!(comment_id = %id, removed, "comment deleted");
    Ok(ApiResponse::message_only("Comment deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::blogs::tests::create_blog;
    use crate::test_util::{admin_token, app, call};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn comment(parent: Option<&str>) -> Value {
        json!({
            "content": "Great write-up, thanks!",
            "author": { "name": "Jane Doe", "email": "jane@example.com" },
            "parentComment": parent,
        })
    }

    async fn post(app: &axum::Router, blog_id: &str, body: Value) -> (StatusCode, Value) {
        call(app, Method::POST, &format!("/api/v1/comments/blog/{}", blog_id), None, Some(body)).await
    }

    #[test]
    fn test_default_avatar_encodes_name() {
        assert_eq!(
            default_avatar("Jane Doe"),
            "https://ui-avatars.com/api/?name=Jane+Doe&background=random"
        );
    }

    #[tokio::test]
    async fn test_moderation_flow() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let blog = create_blog(&app, &token, true).await;
        let blog_id = blog["_id"].as_str().unwrap();

        let (status, body) = post(&app, blog_id, comment(None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Comment submitted for approval");
        assert_eq!(body["data"]["approved"], false);
        assert!(body["data"]["author"].get("email").is_none());
        let comment_id = body["data"]["_id"].as_str().unwrap().to_string();

        let list_uri = format!("/api/v1/comments/blog/{}", blog_id);
        let (_, list) = call(&app, Method::GET, &list_uri, None, None).await;
        assert_eq!(list["pagination"]["total"], 0);

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/api/v1/comments/{}/approve", comment_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = call(&app, Method::GET, &list_uri, None, None).await;
        assert_eq!(list["pagination"]["total"], 1);
        assert_eq!(list["data"][0]["replies"], json!([]));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let blog = create_blog(&app, &token, true).await;
        let blog_id = blog["_id"].as_str().unwrap();

        let (_, parent) = post(&app, blog_id, comment(None)).await;
        let parent_id = parent["data"]["_id"].as_str().unwrap().to_string();
        let (status, reply) = post(&app, blog_id, comment(Some(&parent_id))).await;
        assert_eq!(status, StatusCode::CREATED);
        let reply_id = reply["data"]["_id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            Method::DELETE,
            &format!("/api/v1/comments/{}", parent_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.find_comment(&parent_id).await.unwrap().is_none());
        assert!(state.store.find_comment(&reply_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parent_must_belong_to_blog() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let first = create_blog(&app, &token, true).await;
        let mut second_body = crate::routes::blogs::tests::blog_body(true);
        second_body["title"] = json!("A Different Post");
        let (_, second) =
            call(&app, Method::POST, "/api/v1/blogs", Some(&token), Some(second_body)).await;

        let (_, parent) = post(&app, first["_id"].as_str().unwrap(), comment(None)).await;
        let parent_id = parent["data"]["_id"].as_str().unwrap().to_string();
        let (status, body) = post(
            &app,
            second["data"]["_id"].as_str().unwrap(),
            comment(Some(&parent_id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Parent comment not found");
    }

    #[tokio::test]
    async fn test_comments_on_hidden_blog_are_not_found() {
        let state = AppState::for_tests();
        let app = app(&state);
        let token = admin_token(&state).await;
        let draft = create_blog(&app, &token, false).await;

        let (status, body) = post(&app, draft["_id"].as_str().unwrap(), comment(None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Blog not found");

        let (status, body) = post(
            &app,
            draft["_id"].as_str().unwrap(),
            json!({ "content": "<script>x</script>", "author": { "name": "J" } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Author name must be 2-50 characters"));
    }
}
