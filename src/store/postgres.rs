//! PostgreSQL implementation of the repository traits.
//!
//! Enumerations live in TEXT columns and are parsed on the way out; list
//! filters are assembled with `QueryBuilder` so every user value is bound.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder, Row};
use std::{collections::HashMap, str::FromStr};

use super::{
    like_pattern, AnalyticsStore, BlogFilter, BlogStore, CommentStore, ContactFilter,
    ContactStore, Counter, EventFilter, PageRequest, ProjectFilter, ProjectStore, SkillFilter,
    SkillStore, Store, UserStore,
};
use crate::db::models::{
    new_object_id, AnalyticsEvent, AuthorSummary, Blog, BlogPatch, Comment, CommentAuthor,
    CommentThread, Contact, ContactStatus, DashboardStats, EventType, NewBlog, NewComment,
    NewContact, NewEvent, NewProject, NewSkill, NewUser, ParseEnumError, Project, ProjectPatch,
    ProviderKind, ResourceCount, Skill, SkillPatch, User, UserPatch,
};
use crate::error::Result;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn text_enum<T>(row: &PgRow, column: &str) -> std::result::Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            avatar: row.try_get("avatar")?,
            role: text_enum(row, "role")?,
            is_active: row.try_get("is_active")?,
            provider: text_enum(row, "provider")?,
            provider_id: row.try_get("provider_id")?,
            refresh_token_hash: row.try_get("refresh_token_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Project {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            short_description: row.try_get("short_description")?,
            technologies: row.try_get("technologies")?,
            category: text_enum(row, "category")?,
            images: row.try_get("images")?,
            live_url: row.try_get("live_url")?,
            github_url: row.try_get("github_url")?,
            featured: row.try_get("featured")?,
            status: text_enum(row, "status")?,
            slug: row.try_get("slug")?,
            views: row.try_get("views")?,
            likes: row.try_get("likes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Blog {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            content: row.try_get("content")?,
            excerpt: row.try_get("excerpt")?,
            author: AuthorSummary {
                id: row.try_get("author_id")?,
                name: row.try_get("author_name")?,
                avatar: row.try_get("author_avatar")?,
            },
            tags: row.try_get("tags")?,
            category: text_enum(row, "category")?,
            featured_image: row.try_get("featured_image")?,
            published: row.try_get("published")?,
            views: row.try_get("views")?,
            likes: row.try_get("likes")?,
            read_time: row.try_get("read_time")?,
            seo_title: row.try_get("seo_title")?,
            seo_description: row.try_get("seo_description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Skill {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category: text_enum(row, "category")?,
            proficiency: row.try_get("proficiency")?,
            icon: row.try_get("icon")?,
            description: row.try_get("description")?,
            years_of_experience: row.try_get("years_of_experience")?,
            featured: row.try_get("featured")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Comment {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            content: row.try_get("content")?,
            author: CommentAuthor {
                name: row.try_get("author_name")?,
                email: row.try_get("author_email")?,
                avatar: row.try_get("author_avatar")?,
            },
            blog_id: row.try_get("blog_id")?,
            parent_comment: row.try_get("parent_comment")?,
            approved: row.try_get("approved")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Contact {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            subject: row.try_get("subject")?,
            message: row.try_get("message")?,
            status: text_enum(row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for AnalyticsEvent {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: text_enum(row, "event_type")?,
            resource_id: row.try_get("resource_id")?,
            user_agent: row.try_get("user_agent")?,
            ip: row.try_get("ip")?,
            country: row.try_get("country")?,
            city: row.try_get("city")?,
            referrer: row.try_get("referrer")?,
            timestamp: row.try_get("created_at")?,
        })
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_provider(
        &self,
        provider: ProviderKind,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE provider = $1 AND provider_id = $2",
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, name, avatar, role, provider, provider_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.avatar)
        .bind(user.role.as_str())
        .bind(user.provider.as_str())
        .bind(&user.provider_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                avatar = COALESCE($4, avatar),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.avatar)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn link_provider(
        &self,
        id: &str,
        provider: ProviderKind,
        provider_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET provider = $2, provider_id = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(provider.as_str())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_refresh_token(&self, id: &str, digest: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Projects
// ============================================================================

fn push_project_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProjectFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR short_description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR array_to_string(technologies, ' ') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Project>, u64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM projects WHERE TRUE");
        push_project_filter(&mut qb, filter);
        qb.push(" ORDER BY featured DESC, created_at DESC, id DESC");
        push_page(&mut qb, page);
        let items = qb.build_query_as::<Project>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects WHERE TRUE");
        push_project_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((items, total as u64))
    }

    async fn find_project(&self, key: &str) -> Result<Option<Project>> {
        let project =
            sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 OR slug = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(project)
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (
                id, title, description, short_description, technologies, category,
                images, live_url, github_url, featured, status, slug
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.short_description)
        .bind(&project.technologies)
        .bind(project.category.as_str())
        .bind(&project.images)
        .bind(&project.live_url)
        .bind(&project.github_url)
        .bind(project.featured)
        .bind(project.status.as_str())
        .bind(&project.slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                short_description = COALESCE($4, short_description),
                technologies = COALESCE($5, technologies),
                category = COALESCE($6, category),
                images = COALESCE($7, images),
                live_url = COALESCE($8, live_url),
                github_url = COALESCE($9, github_url),
                featured = COALESCE($10, featured),
                status = COALESCE($11, status),
                slug = COALESCE($12, slug),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.short_description)
        .bind(patch.technologies)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.images)
        .bind(patch.live_url)
        .bind(patch.github_url)
        .bind(patch.featured)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn delete_project(&self, id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("DELETE FROM projects WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    async fn increment_project(&self, id: &str, counter: Counter) -> Result<Option<Project>> {
        let sql = format!(
            "UPDATE projects SET {col} = {col} + 1, updated_at = now() WHERE id = $1 RETURNING *",
            col = counter.column()
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }
}

// ============================================================================
// Blogs
// ============================================================================

const BLOG_SELECT: &str = "SELECT b.*, u.name AS author_name, u.avatar AS author_avatar \
     FROM blogs b LEFT JOIN users u ON u.id = b.author_id";

fn push_blog_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BlogFilter) {
    if let Some(published) = filter.published {
        qb.push(" AND b.published = ").push_bind(published);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND b.category = ").push_bind(category.clone());
    }
    if let Some(tag) = &filter.tag {
        qb.push(" AND ").push_bind(tag.clone()).push(" = ANY(b.tags)");
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.content ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.excerpt ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR array_to_string(b.tags, ' ') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl BlogStore for PgStore {
    async fn list_blogs(
        &self,
        filter: &BlogFilter,
        page: PageRequest,
    ) -> Result<(Vec<Blog>, u64)> {
        let mut qb = QueryBuilder::<Postgres>::new(BLOG_SELECT);
        qb.push(" WHERE TRUE");
        push_blog_filter(&mut qb, filter);
        qb.push(" ORDER BY b.created_at DESC, b.id DESC");
        push_page(&mut qb, page);
        let items = qb.build_query_as::<Blog>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM blogs b WHERE TRUE");
        push_blog_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((items, total as u64))
    }

    async fn find_blog(&self, key: &str) -> Result<Option<Blog>> {
        let sql = format!("{BLOG_SELECT} WHERE b.id = $1 OR b.slug = $1");
        let blog = sqlx::query_as::<_, Blog>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(blog)
    }

    async fn insert_blog(&self, blog: NewBlog) -> Result<Blog> {
        let blog = sqlx::query_as::<_, Blog>(
            r#"
            WITH inserted AS (
                INSERT INTO blogs (
                    id, title, slug, content, excerpt, author_id, tags, category,
                    featured_image, published, read_time, seo_title, seo_description
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING *
            )
            SELECT b.*, u.name AS author_name, u.avatar AS author_avatar
            FROM inserted b LEFT JOIN users u ON u.id = b.author_id
            "#,
        )
        .bind(new_object_id())
        .bind(&blog.title)
        .bind(&blog.slug)
        .bind(&blog.content)
        .bind(&blog.excerpt)
        .bind(&blog.author_id)
        .bind(&blog.tags)
        .bind(blog.category.as_str())
        .bind(&blog.featured_image)
        .bind(blog.published)
        .bind(blog.read_time)
        .bind(&blog.seo_title)
        .bind(&blog.seo_description)
        .fetch_one(&self.pool)
        .await?;
        Ok(blog)
    }

    async fn update_blog(&self, id: &str, patch: BlogPatch) -> Result<Option<Blog>> {
        let blog = sqlx::query_as::<_, Blog>(
            r#"
            WITH updated AS (
                UPDATE blogs SET
                    title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    excerpt = COALESCE($4, excerpt),
                    tags = COALESCE($5, tags),
                    category = COALESCE($6, category),
                    featured_image = COALESCE($7, featured_image),
                    published = COALESCE($8, published),
                    seo_title = COALESCE($9, seo_title),
                    seo_description = COALESCE($10, seo_description),
                    slug = COALESCE($11, slug),
                    read_time = COALESCE($12, read_time),
                    updated_at = now()
                WHERE id = $1
                RETURNING *
            )
            SELECT b.*, u.name AS author_name, u.avatar AS author_avatar
            FROM updated b LEFT JOIN users u ON u.id = b.author_id
            "#,
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .bind(patch.excerpt)
        .bind(patch.tags)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.featured_image)
        .bind(patch.published)
        .bind(patch.seo_title)
        .bind(patch.seo_description)
        .bind(patch.slug)
        .bind(patch.read_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(blog)
    }

    async fn delete_blog(&self, id: &str) -> Result<Option<Blog>> {
        let blog = sqlx::query_as::<_, Blog>(
            r#"
            WITH deleted AS (DELETE FROM blogs WHERE id = $1 RETURNING *)
            SELECT b.*, u.name AS author_name, u.avatar AS author_avatar
            FROM deleted b LEFT JOIN users u ON u.id = b.author_id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(blog)
    }

    async fn increment_blog(&self, id: &str, counter: Counter) -> Result<Option<Blog>> {
        let sql = format!(
            r#"
            WITH updated AS (
                UPDATE blogs SET {col} = {col} + 1, updated_at = now()
                WHERE id = $1
                RETURNING *
            )
            SELECT b.*, u.name AS author_name, u.avatar AS author_avatar
            FROM updated b LEFT JOIN users u ON u.id = b.author_id
            "#,
            col = counter.column()
        );
        let blog = sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(blog)
    }
}

// ============================================================================
// Skills
// ============================================================================

fn push_skill_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &SkillFilter) {
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
}

#[async_trait]
impl SkillStore for PgStore {
    async fn list_skills(
        &self,
        filter: &SkillFilter,
        page: PageRequest,
    ) -> Result<(Vec<Skill>, u64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM skills WHERE TRUE");
        push_skill_filter(&mut qb, filter);
        qb.push(" ORDER BY featured DESC, proficiency DESC, created_at DESC");
        push_page(&mut qb, page);
        let items = qb.build_query_as::<Skill>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM skills WHERE TRUE");
        push_skill_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((items, total as u64))
    }

    async fn find_skill(&self, id: &str) -> Result<Option<Skill>> {
        let skill = sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(skill)
    }

    async fn insert_skill(&self, skill: NewSkill) -> Result<Skill> {
        let skill = sqlx::query_as::<_, Skill>(
            r#"
            INSERT INTO skills (
                id, name, category, proficiency, icon, description, years_of_experience, featured
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(&skill.name)
        .bind(skill.category.as_str())
        .bind(skill.proficiency)
        .bind(&skill.icon)
        .bind(&skill.description)
        .bind(skill.years_of_experience)
        .bind(skill.featured)
        .fetch_one(&self.pool)
        .await?;
        Ok(skill)
    }

    async fn update_skill(&self, id: &str, patch: SkillPatch) -> Result<Option<Skill>> {
        let skill = sqlx::query_as::<_, Skill>(
            r#"
            UPDATE skills SET
                name = COALESCE($2, name),
                category = COALESCE($3, category),
                proficiency = COALESCE($4, proficiency),
                icon = COALESCE($5, icon),
                description = COALESCE($6, description),
                years_of_experience = COALESCE($7, years_of_experience),
                featured = COALESCE($8, featured),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.proficiency)
        .bind(patch.icon)
        .bind(patch.description)
        .bind(patch.years_of_experience)
        .bind(patch.featured)
        .fetch_optional(&self.pool)
        .await?;
        Ok(skill)
    }

    async fn delete_skill(&self, id: &str) -> Result<Option<Skill>> {
        let skill = sqlx::query_as::<_, Skill>("DELETE FROM skills WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(skill)
    }
}

// ============================================================================
// Comments
// ============================================================================

#[async_trait]
impl CommentStore for PgStore {
    async fn list_comment_threads(
        &self,
        blog_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<CommentThread>, u64)> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE blog_id = $1 AND approved AND parent_comment IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(blog_id)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE blog_id = $1 AND approved AND parent_comment IS NULL",
        )
        .bind(blog_id)
        .fetch_one(&self.pool)
        .await?;

        let parent_ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let replies = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE approved AND parent_comment = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&parent_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
        for reply in replies {
            if let Some(parent) = reply.parent_comment.clone() {
                by_parent.entry(parent).or_default().push(reply);
            }
        }

        let threads = comments
            .into_iter()
            .map(|comment| {
                let replies = by_parent.remove(&comment.id).unwrap_or_default();
                CommentThread { comment, replies }
            })
            .collect();

        Ok((threads, total as u64))
    }

    async fn find_comment(&self, id: &str) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (
                id, content, author_name, author_email, author_avatar, blog_id, parent_comment
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(&comment.content)
        .bind(&comment.author.name)
        .bind(&comment.author.email)
        .bind(&comment.author.avatar)
        .bind(&comment.blog_id)
        .bind(&comment.parent_comment)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn approve_comment(&self, id: &str) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            "UPDATE comments SET approved = true, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1 OR parent_comment = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Contacts
// ============================================================================

#[async_trait]
impl ContactStore for PgStore {
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, u64)> {
        let status = filter.status.map(|s| s.as_str());

        let items = sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contacts WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((items, total as u64))
    }

    async fn open_contact(&self, id: &str) -> Result<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                status = CASE WHEN status = 'new' THEN 'read' ELSE status END,
                updated_at = CASE WHEN status = 'new' THEN now() ELSE updated_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contact)
    }

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, name, email, subject, message, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.subject)
        .bind(&contact.message)
        .bind(ContactStatus::New.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(contact)
    }

    async fn set_contact_status(
        &self,
        id: &str,
        status: ContactStatus,
    ) -> Result<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            "UPDATE contacts SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(contact)
    }

    async fn delete_contact(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Analytics
// ============================================================================

fn push_event_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    if let Some(kind) = filter.event_type {
        qb.push(" AND event_type = ").push_bind(kind.as_str());
    }
    if let Some(start) = filter.start {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

impl PgStore {
    async fn top_resources(&self, kind: EventType, top: usize) -> Result<Vec<ResourceCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT resource_id, COUNT(*) AS count
            FROM analytics_events
            WHERE event_type = $1 AND resource_id IS NOT NULL
            GROUP BY resource_id
            ORDER BY count DESC, resource_id ASC
            LIMIT $2
            "#,
        )
        .bind(kind.as_str())
        .bind(top as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| ResourceCount { id, count })
            .collect())
    }
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn record_event(&self, event: NewEvent) -> Result<AnalyticsEvent> {
        let event = sqlx::query_as::<_, AnalyticsEvent>(
            r#"
            INSERT INTO analytics_events (
                id, event_type, resource_id, user_agent, ip, country, city, referrer
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new_object_id())
        .bind(event.event_type.unwrap_or(EventType::PageView).as_str())
        .bind(&event.resource_id)
        .bind(&event.user_agent)
        .bind(&event.ip)
        .bind(&event.country)
        .bind(&event.city)
        .bind(&event.referrer)
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> Result<(Vec<AnalyticsEvent>, u64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM analytics_events WHERE TRUE");
        push_event_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC");
        push_page(&mut qb, page);
        let items = qb
            .build_query_as::<AnalyticsEvent>()
            .fetch_all(&self.pool)
            .await?;

        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM analytics_events WHERE TRUE");
        push_event_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((items, total as u64))
    }

    async fn dashboard(&self, recent_since: DateTime<Utc>, top: usize) -> Result<DashboardStats> {
        let (total_views, project_views, blog_views, recent_views): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE event_type = 'project_view'),
                    COUNT(*) FILTER (WHERE event_type = 'blog_view'),
                    COUNT(*) FILTER (WHERE created_at >= $1)
                FROM analytics_events
                "#,
            )
            .bind(recent_since)
            .fetch_one(&self.pool)
            .await?;

        Ok(DashboardStats {
            total_views,
            project_views,
            blog_views,
            recent_views,
            top_projects: self.top_resources(EventType::ProjectView, top).await?,
            top_blogs: self.top_resources(EventType::BlogView, top).await?,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
