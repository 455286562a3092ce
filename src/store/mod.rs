/**
 * Store Module
 * Repository traits over the record store, injected into handlers as `Arc<dyn Store>`
 */
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::models::{
    AnalyticsEvent, Blog, BlogPatch, Comment, CommentThread, Contact, ContactStatus,
    DashboardStats, EventType, NewBlog, NewComment, NewContact, NewEvent, NewProject, NewSkill,
    NewUser, Project, ProjectPatch, ProjectStatus, ProviderKind, Skill, SkillPatch, User,
    UserPatch,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type DynStore = Arc<dyn Store>;

/// Page window requested by a list call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Single-field counters on viewable records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Views,
    Likes,
}

impl Counter {
    pub fn column(&self) -> &'static str {
        match self {
            Counter::Views => "views",
            Counter::Likes => "likes",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub published: Option<bool>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillFilter {
    pub category: Option<String>,
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_provider(
        &self,
        provider: ProviderKind,
        provider_id: &str,
    ) -> Result<Option<User>>;
    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User>;
    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>>;
    async fn set_password(&self, id: &str, password_hash: &str) -> Result<()>;
    async fn link_provider(&self, id: &str, provider: ProviderKind, provider_id: &str)
        -> Result<()>;
    /// Replaces (or clears) the single active refresh-token digest.
    async fn set_refresh_token(&self, id: &str, digest: Option<&str>) -> Result<()>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Ordered featured first, then newest first.
    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Project>, u64)>;
    /// Looks up by document id, or by slug when the key is not id-shaped.
    async fn find_project(&self, key: &str) -> Result<Option<Project>>;
    async fn insert_project(&self, project: NewProject) -> Result<Project>;
    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>>;
    async fn delete_project(&self, id: &str) -> Result<Option<Project>>;
    /// Atomic `+1` on one counter, returning the updated record.
    async fn increment_project(&self, id: &str, counter: Counter) -> Result<Option<Project>>;
}

#[async_trait]
pub trait BlogStore: Send + Sync {
    /// Ordered newest first.
    async fn list_blogs(&self, filter: &BlogFilter, page: PageRequest)
        -> Result<(Vec<Blog>, u64)>;
    async fn find_blog(&self, key: &str) -> Result<Option<Blog>>;
    async fn insert_blog(&self, blog: NewBlog) -> Result<Blog>;
    async fn update_blog(&self, id: &str, patch: BlogPatch) -> Result<Option<Blog>>;
    async fn delete_blog(&self, id: &str) -> Result<Option<Blog>>;
    async fn increment_blog(&self, id: &str, counter: Counter) -> Result<Option<Blog>>;
}

#[async_trait]
pub trait SkillStore: Send + Sync {
    /// Ordered featured first, then by proficiency descending.
    async fn list_skills(&self, filter: &SkillFilter, page: PageRequest)
        -> Result<(Vec<Skill>, u64)>;
    async fn find_skill(&self, id: &str) -> Result<Option<Skill>>;
    /// Fails with `Conflict` when the name is taken.
    async fn insert_skill(&self, skill: NewSkill) -> Result<Skill>;
    async fn update_skill(&self, id: &str, patch: SkillPatch) -> Result<Option<Skill>>;
    async fn delete_skill(&self, id: &str) -> Result<Option<Skill>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Approved top-level comments newest first, each with approved replies oldest first.
    async fn list_comment_threads(
        &self,
        blog_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<CommentThread>, u64)>;
    async fn find_comment(&self, id: &str) -> Result<Option<Comment>>;
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment>;
    async fn approve_comment(&self, id: &str) -> Result<Option<Comment>>;
    /// Deletes the comment and its direct replies; returns how many rows went.
    async fn delete_comment(&self, id: &str) -> Result<u64>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, u64)>;
    /// Fetch for an admin reader: a `new` contact becomes `read`.
    async fn open_contact(&self, id: &str) -> Result<Option<Contact>>;
    async fn insert_contact(&self, contact: NewContact) -> Result<Contact>;
    async fn set_contact_status(&self, id: &str, status: ContactStatus)
        -> Result<Option<Contact>>;
    async fn delete_contact(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn record_event(&self, event: NewEvent) -> Result<AnalyticsEvent>;
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> Result<(Vec<AnalyticsEvent>, u64)>;
    /// Rollups over the whole log; `recent_since` bounds `recent_views`.
    async fn dashboard(&self, recent_since: DateTime<Utc>, top: usize) -> Result<DashboardStats>;
}

/// Everything the request handlers need from persistence.
#[async_trait]
pub trait Store:
    UserStore + ProjectStore + BlogStore + SkillStore + CommentStore + ContactStore + AnalyticsStore
{
    /// Round-trip to the backing store, used by health checks.
    async fn ping(&self) -> Result<()>;

    fn backend(&self) -> &'static str;
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_offset() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
