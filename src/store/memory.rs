//! In-process store backing tests and database-less development runs.
//!
//! Tables are plain vectors in insertion order behind one `RwLock`, so every
//! operation (including counter increments) is atomic with respect to other
//! requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{cmp::Reverse, collections::HashMap};
use tokio::sync::RwLock;

use super::{
    AnalyticsStore, BlogFilter, BlogStore, CommentStore, ContactFilter, ContactStore, Counter,
    EventFilter, PageRequest, ProjectFilter, ProjectStore, SkillFilter, SkillStore, Store,
    UserStore,
};
use crate::db::models::{
    new_object_id, AnalyticsEvent, AuthorSummary, Blog, BlogPatch, Comment, CommentThread,
    Contact, ContactStatus, DashboardStats, EventType, NewBlog, NewComment, NewContact, NewEvent,
    NewProject, NewSkill, NewUser, Project, ProjectPatch, ProviderKind, ResourceCount, Skill,
    SkillPatch, User, UserPatch,
};
use crate::error::{AppError, Result};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    projects: Vec<Project>,
    blogs: Vec<Blog>,
    skills: Vec<Skill>,
    comments: Vec<Comment>,
    contacts: Vec<Contact>,
    events: Vec<AnalyticsEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn set_active(&self, id: &str, active: bool) {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == id) {
            user.is_active = active;
        }
    }
}

fn conflict(field: &str) -> AppError {
    AppError::Conflict(format!("A record with this {} already exists", field))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T: Clone>(items: Vec<&T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let slice = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .cloned()
        .collect();
    (slice, total)
}

fn bump(value: &mut i64, updated_at: &mut DateTime<Utc>) {
    *value += 1;
    *updated_at = Utc::now();
}

impl Tables {
    fn populate(&self, mut blog: Blog) -> Blog {
        if let Some(user) = self.users.iter().find(|u| u.id == blog.author.id) {
            blog.author.name = Some(user.name.clone());
            blog.author.avatar = user.avatar.clone();
        }
        blog
    }

    fn slug_taken(&self, slug: &str, except: Option<&str>, projects: bool) -> bool {
        if projects {
            self.projects
                .iter()
                .any(|p| p.slug == slug && Some(p.id.as_str()) != except)
        } else {
            self.blogs
                .iter()
                .any(|b| b.slug == slug && Some(b.id.as_str()) != except)
        }
    }
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_provider(
        &self,
        provider: ProviderKind,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t
            .users
            .iter()
            .find(|u| u.provider == provider && u.provider_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(conflict("email"));
        }
        let now = Utc::now();
        let record = User {
            id: new_object_id(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            avatar: user.avatar,
            role: user.role,
            is_active: true,
            provider: user.provider,
            provider_id: user.provider_id,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        t.users.push(record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>> {
        let mut t = self.tables.write().await;
        if let Some(email) = &patch.email {
            if t.users.iter().any(|u| &u.email == email && u.id != id) {
                return Err(conflict("email"));
            }
        }
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(avatar) = patch.avatar {
            user.avatar = Some(avatar);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn link_provider(
        &self,
        id: &str,
        provider: ProviderKind,
        provider_id: &str,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == id) {
            user.provider = provider;
            user.provider_id = Some(provider_id.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_refresh_token(&self, id: &str, digest: Option<&str>) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == id) {
            user.refresh_token_hash = digest.map(str::to_string);
        }
        Ok(())
    }
}

// ============================================================================
// Projects
// ============================================================================

fn apply_project_patch(p: &mut Project, patch: ProjectPatch) {
    if let Some(v) = patch.title {
        p.title = v;
    }
    if let Some(v) = patch.description {
        p.description = v;
    }
    if let Some(v) = patch.short_description {
        p.short_description = v;
    }
    if let Some(v) = patch.technologies {
        p.technologies = v;
    }
    if let Some(v) = patch.category {
        p.category = v;
    }
    if let Some(v) = patch.images {
        p.images = v;
    }
    if let Some(v) = patch.live_url {
        p.live_url = Some(v);
    }
    if let Some(v) = patch.github_url {
        p.github_url = Some(v);
    }
    if let Some(v) = patch.featured {
        p.featured = v;
    }
    if let Some(v) = patch.status {
        p.status = v;
    }
    if let Some(v) = patch.slug {
        p.slug = v;
    }
    p.updated_at = Utc::now();
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn list_projects(
        &self,
        filter: &ProjectFilter,
        page: PageRequest,
    ) -> Result<(Vec<Project>, u64)> {
        let t = self.tables.read().await;
        let mut matched: Vec<&Project> = t
            .projects
            .iter()
            .rev()
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .filter(|p| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.as_str() == c)
            })
            .filter(|p| filter.featured.is_none_or(|f| p.featured == f))
            .filter(|p| {
                filter.search.as_deref().is_none_or(|q| {
                    contains_ci(&p.title, q)
                        || contains_ci(&p.description, q)
                        || contains_ci(&p.short_description, q)
                        || p.technologies.iter().any(|t| contains_ci(t, q))
                })
            })
            .collect();
        matched.sort_by_key(|p| Reverse(p.featured));
        Ok(paginate(matched, page))
    }

    async fn find_project(&self, key: &str) -> Result<Option<Project>> {
        let t = self.tables.read().await;
        Ok(t
            .projects
            .iter()
            .find(|p| p.id == key || p.slug == key)
            .cloned())
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let mut t = self.tables.write().await;
        if t.slug_taken(&project.slug, None, true) {
            return Err(conflict("slug"));
        }
        let now = Utc::now();
        let record = Project {
            id: new_object_id(),
            title: project.title,
            description: project.description,
            short_description: project.short_description,
            technologies: project.technologies,
            category: project.category,
            images: project.images,
            live_url: project.live_url,
            github_url: project.github_url,
            featured: project.featured,
            status: project.status,
            slug: project.slug,
            views: 0,
            likes: 0,
            created_at: now,
            updated_at: now,
        };
        t.projects.push(record.clone());
        Ok(record)
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>> {
        let mut t = self.tables.write().await;
        if let Some(slug) = &patch.slug {
            if t.slug_taken(slug, Some(id), true) {
                return Err(conflict("slug"));
            }
        }
        let Some(project) = t.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        apply_project_patch(project, patch);
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: &str) -> Result<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(pos) = t.projects.iter().position(|p| p.id == id) else {
            return Ok(None);
        };
        Ok(Some(t.projects.remove(pos)))
    }

    async fn increment_project(&self, id: &str, counter: Counter) -> Result<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(p) = t.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        match counter {
            Counter::Views => bump(&mut p.views, &mut p.updated_at),
            Counter::Likes => bump(&mut p.likes, &mut p.updated_at),
        }
        Ok(Some(p.clone()))
    }
}

// ============================================================================
// Blogs
// ============================================================================

fn apply_blog_patch(b: &mut Blog, patch: BlogPatch) {
    if let Some(v) = patch.title {
        b.title = v;
    }
    if let Some(v) = patch.content {
        b.content = v;
    }
    if let Some(v) = patch.excerpt {
        b.excerpt = v;
    }
    if let Some(v) = patch.tags {
        b.tags = v;
    }
    if let Some(v) = patch.category {
        b.category = v;
    }
    if let Some(v) = patch.featured_image {
        b.featured_image = Some(v);
    }
    if let Some(v) = patch.published {
        b.published = v;
    }
    if let Some(v) = patch.seo_title {
        b.seo_title = Some(v);
    }
    if let Some(v) = patch.seo_description {
        b.seo_description = Some(v);
    }
    if let Some(v) = patch.slug {
        b.slug = v;
    }
    if let Some(v) = patch.read_time {
        b.read_time = v;
    }
    b.updated_at = Utc::now();
}

#[async_trait]
impl BlogStore for MemoryStore {
    async fn list_blogs(
        &self,
        filter: &BlogFilter,
        page: PageRequest,
    ) -> Result<(Vec<Blog>, u64)> {
        let t = self.tables.read().await;
        let matched: Vec<&Blog> = t
            .blogs
            .iter()
            .rev()
            .filter(|b| filter.published.is_none_or(|p| b.published == p))
            .filter(|b| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| b.category.as_str() == c)
            })
            .filter(|b| filter.tag.as_deref().is_none_or(|tag| b.tags.iter().any(|t| t == tag)))
            .filter(|b| {
                filter.search.as_deref().is_none_or(|q| {
                    contains_ci(&b.title, q)
                        || contains_ci(&b.content, q)
                        || contains_ci(&b.excerpt, q)
                        || b.tags.iter().any(|t| contains_ci(t, q))
                })
            })
            .collect();
        let (items, total) = paginate(matched, page);
        Ok((items.into_iter().map(|b| t.populate(b)).collect(), total))
    }

    async fn find_blog(&self, key: &str) -> Result<Option<Blog>> {
        let t = self.tables.read().await;
        Ok(t
            .blogs
            .iter()
            .find(|b| b.id == key || b.slug == key)
            .cloned()
            .map(|b| t.populate(b)))
    }

    async fn insert_blog(&self, blog: NewBlog) -> Result<Blog> {
        let mut t = self.tables.write().await;
        if t.slug_taken(&blog.slug, None, false) {
            return Err(conflict("slug"));
        }
        let now = Utc::now();
        let record = Blog {
            id: new_object_id(),
            title: blog.title,
            slug: blog.slug,
            content: blog.content,
            excerpt: blog.excerpt,
            author: AuthorSummary {
                id: blog.author_id,
                name: None,
                avatar: None,
            },
            tags: blog.tags,
            category: blog.category,
            featured_image: blog.featured_image,
            published: blog.published,
            views: 0,
            likes: 0,
            read_time: blog.read_time,
            seo_title: blog.seo_title,
            seo_description: blog.seo_description,
            created_at: now,
            updated_at: now,
        };
        t.blogs.push(record.clone());
        Ok(t.populate(record))
    }

    async fn update_blog(&self, id: &str, patch: BlogPatch) -> Result<Option<Blog>> {
        let mut t = self.tables.write().await;
        if let Some(slug) = &patch.slug {
            if t.slug_taken(slug, Some(id), false) {
                return Err(conflict("slug"));
            }
        }
        let Some(blog) = t.blogs.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        apply_blog_patch(blog, patch);
        let updated = blog.clone();
        Ok(Some(t.populate(updated)))
    }

    async fn delete_blog(&self, id: &str) -> Result<Option<Blog>> {
        let mut t = self.tables.write().await;
        let Some(pos) = t.blogs.iter().position(|b| b.id == id) else {
            return Ok(None);
        };
        let removed = t.blogs.remove(pos);
        t.comments.retain(|c| c.blog_id != id);
        Ok(Some(removed))
    }

    async fn increment_blog(&self, id: &str, counter: Counter) -> Result<Option<Blog>> {
        let mut t = self.tables.write().await;
        let Some(b) = t.blogs.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        match counter {
            Counter::Views => bump(&mut b.views, &mut b.updated_at),
            Counter::Likes => bump(&mut b.likes, &mut b.updated_at),
        }
        let updated = b.clone();
        Ok(Some(t.populate(updated)))
    }
}

// ============================================================================
// Skills
// ============================================================================

#[async_trait]
impl SkillStore for MemoryStore {
    async fn list_skills(
        &self,
        filter: &SkillFilter,
        page: PageRequest,
    ) -> Result<(Vec<Skill>, u64)> {
        let t = self.tables.read().await;
        let mut matched: Vec<&Skill> = t
            .skills
            .iter()
            .rev()
            .filter(|s| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| s.category.as_str() == c)
            })
            .filter(|s| filter.featured.is_none_or(|f| s.featured == f))
            .collect();
        matched.sort_by_key(|s| (Reverse(s.featured), Reverse(s.proficiency)));
        Ok(paginate(matched, page))
    }

    async fn find_skill(&self, id: &str) -> Result<Option<Skill>> {
        let t = self.tables.read().await;
        Ok(t.skills.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_skill(&self, skill: NewSkill) -> Result<Skill> {
        let mut t = self.tables.write().await;
        if t.skills.iter().any(|s| s.name == skill.name) {
            return Err(conflict("name"));
        }
        let now = Utc::now();
        let record = Skill {
            id: new_object_id(),
            name: skill.name,
            category: skill.category,
            proficiency: skill.proficiency,
            icon: skill.icon,
            description: skill.description,
            years_of_experience: skill.years_of_experience,
            featured: skill.featured,
            created_at: now,
            updated_at: now,
        };
        t.skills.push(record.clone());
        Ok(record)
    }

    async fn update_skill(&self, id: &str, patch: SkillPatch) -> Result<Option<Skill>> {
        let mut t = self.tables.write().await;
        if let Some(name) = &patch.name {
            if t.skills.iter().any(|s| &s.name == name && s.id != id) {
                return Err(conflict("name"));
            }
        }
        let Some(s) = t.skills.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(v) = patch.name {
            s.name = v;
        }
        if let Some(v) = patch.category {
            s.category = v;
        }
        if let Some(v) = patch.proficiency {
            s.proficiency = v;
        }
        if let Some(v) = patch.icon {
            s.icon = Some(v);
        }
        if let Some(v) = patch.description {
            s.description = Some(v);
        }
        if let Some(v) = patch.years_of_experience {
            s.years_of_experience = v;
        }
        if let Some(v) = patch.featured {
            s.featured = v;
        }
        s.updated_at = Utc::now();
        Ok(Some(s.clone()))
    }

    async fn delete_skill(&self, id: &str) -> Result<Option<Skill>> {
        let mut t = self.tables.write().await;
        let Some(pos) = t.skills.iter().position(|s| s.id == id) else {
            return Ok(None);
        };
        Ok(Some(t.skills.remove(pos)))
    }
}

// ============================================================================
// Comments
// ============================================================================

#[async_trait]
impl CommentStore for MemoryStore {
    async fn list_comment_threads(
        &self,
        blog_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<CommentThread>, u64)> {
        let t = self.tables.read().await;
        let top_level: Vec<&Comment> = t
            .comments
            .iter()
            .rev()
            .filter(|c| c.blog_id == blog_id && c.approved && c.parent_comment.is_none())
            .collect();
        let (comments, total) = paginate(top_level, page);

        let threads = comments
            .into_iter()
            .map(|comment| {
                let replies = t
                    .comments
                    .iter()
                    .filter(|r| r.approved && r.parent_comment.as_deref() == Some(comment.id.as_str()))
                    .cloned()
                    .collect();
                CommentThread { comment, replies }
            })
            .collect();
        Ok((threads, total))
    }

    async fn find_comment(&self, id: &str) -> Result<Option<Comment>> {
        let t = self.tables.read().await;
        Ok(t.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let record = Comment {
            id: new_object_id(),
            content: comment.content,
            author: comment.author,
            blog_id: comment.blog_id,
            parent_comment: comment.parent_comment,
            approved: false,
            created_at: now,
            updated_at: now,
        };
        t.comments.push(record.clone());
        Ok(record)
    }

    async fn approve_comment(&self, id: &str) -> Result<Option<Comment>> {
        let mut t = self.tables.write().await;
        let Some(c) = t.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        c.approved = true;
        c.updated_at = Utc::now();
        Ok(Some(c.clone()))
    }

    async fn delete_comment(&self, id: &str) -> Result<u64> {
        let mut t = self.tables.write().await;
        let before = t.comments.len();
        t.comments
            .retain(|c| c.id != id && c.parent_comment.as_deref() != Some(id));
        Ok((before - t.comments.len()) as u64)
    }
}

// ============================================================================
// Contacts
// ============================================================================

#[async_trait]
impl ContactStore for MemoryStore {
    async fn list_contacts(
        &self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, u64)> {
        let t = self.tables.read().await;
        let matched: Vec<&Contact> = t
            .contacts
            .iter()
            .rev()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .collect();
        Ok(paginate(matched, page))
    }

    async fn open_contact(&self, id: &str) -> Result<Option<Contact>> {
        let mut t = self.tables.write().await;
        let Some(c) = t.contacts.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if c.status == ContactStatus::New {
            c.status = ContactStatus::Read;
            c.updated_at = Utc::now();
        }
        Ok(Some(c.clone()))
    }

    async fn insert_contact(&self, contact: NewContact) -> Result<Contact> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let record = Contact {
            id: new_object_id(),
            name: contact.name,
            email: contact.email,
            subject: contact.subject,
            message: contact.message,
            status: ContactStatus::New,
            created_at: now,
            updated_at: now,
        };
        t.contacts.push(record.clone());
        Ok(record)
    }

    async fn set_contact_status(
        &self,
        id: &str,
        status: ContactStatus,
    ) -> Result<Option<Contact>> {
        let mut t = self.tables.write().await;
        let Some(c) = t.contacts.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        c.status = status;
        c.updated_at = Utc::now();
        Ok(Some(c.clone()))
    }

    async fn delete_contact(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.contacts.len();
        t.contacts.retain(|c| c.id != id);
        Ok(t.contacts.len() != before)
    }
}

// ============================================================================
// Analytics
// ============================================================================

fn top_resources(events: &[AnalyticsEvent], kind: EventType, top: usize) -> Vec<ResourceCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for event in events.iter().filter(|e| e.event_type == kind) {
        if let Some(id) = event.resource_id.as_deref() {
            *counts.entry(id).or_default() += 1;
        }
    }
    let mut rows: Vec<ResourceCount> = counts
        .into_iter()
        .map(|(id, count)| ResourceCount {
            id: id.to_string(),
            count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    rows.truncate(top);
    rows
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn record_event(&self, event: NewEvent) -> Result<AnalyticsEvent> {
        let mut t = self.tables.write().await;
        let record = AnalyticsEvent {
            id: new_object_id(),
            event_type: event.event_type.unwrap_or(EventType::PageView),
            resource_id: event.resource_id,
            user_agent: event.user_agent,
            ip: event.ip,
            country: event.country,
            city: event.city,
            referrer: event.referrer,
            timestamp: Utc::now(),
        };
        t.events.push(record.clone());
        Ok(record)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> Result<(Vec<AnalyticsEvent>, u64)> {
        let t = self.tables.read().await;
        let matched: Vec<&AnalyticsEvent> = t
            .events
            .iter()
            .rev()
            .filter(|e| filter.event_type.is_none_or(|k| e.event_type == k))
            .filter(|e| filter.start.is_none_or(|s| e.timestamp >= s))
            .filter(|e| filter.end.is_none_or(|end| e.timestamp <= end))
            .collect();
        Ok(paginate(matched, page))
    }

    async fn dashboard(&self, recent_since: DateTime<Utc>, top: usize) -> Result<DashboardStats> {
        let t = self.tables.read().await;
        let count_of = |kind: EventType| {
            t.events.iter().filter(|e| e.event_type == kind).count() as i64
        };
        Ok(DashboardStats {
            total_views: t.events.len() as i64,
            project_views: count_of(EventType::ProjectView),
            blog_views: count_of(EventType::BlogView),
            recent_views: t
                .events
                .iter()
                .filter(|e| e.timestamp >= recent_since)
                .count() as i64,
            top_projects: top_resources(&t.events, EventType::ProjectView, top),
            top_blogs: top_resources(&t.events, EventType::BlogView, top),
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        let _t = self.tables.read().await;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CommentAuthor, ProjectCategory, ProjectStatus};

    fn new_project(title: &str, featured: bool) -> NewProject {
        NewProject {
            title: title.into(),
            description: "A description of the project".into(),
            short_description: "Short description".into(),
            technologies: vec!["Rust".into()],
            category: ProjectCategory::Web,
            images: vec![],
            live_url: None,
            github_url: None,
            featured,
            status: ProjectStatus::Published,
            slug: crate::derive::slugify(title),
        }
    }

    fn new_comment(blog_id: &str, parent: Option<String>) -> NewComment {
        NewComment {
            content: "Nice article".into(),
            author: CommentAuthor {
                name: "Reader".into(),
                email: "reader@example.com".into(),
                avatar: "https://example.com/a.png".into(),
            },
            blog_id: blog_id.into(),
            parent_comment: parent,
        }
    }

    #[tokio::test]
    async fn test_projects_list_featured_first_then_newest() {
        let store = MemoryStore::new();
        store.insert_project(new_project("Old One", false)).await.unwrap();
        store.insert_project(new_project("Featured", true)).await.unwrap();
        store.insert_project(new_project("New One", false)).await.unwrap();

        let (items, total) = store
            .list_projects(&ProjectFilter::default(), PageRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 3);
        let titles: Vec<_> = items.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Featured", "New One", "Old One"]);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let store = MemoryStore::new();
        store.insert_project(new_project("Same", false)).await.unwrap();
        let err = store
            .insert_project(new_project("Same", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_increment_is_exactly_one() {
        let store = MemoryStore::new();
        let p = store.insert_project(new_project("Counted", false)).await.unwrap();
        store.increment_project(&p.id, Counter::Views).await.unwrap();
        let p = store
            .increment_project(&p.id, Counter::Views)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.views, 2);
        assert_eq!(p.likes, 0);
        assert!(store
            .increment_project("000000000000000000000000", Counter::Likes)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_comment_cascade_removes_direct_replies() {
        let store = MemoryStore::new();
        let parent = store.insert_comment(new_comment("b1", None)).await.unwrap();
        store
            .insert_comment(new_comment("b1", Some(parent.id.clone())))
            .await
            .unwrap();
        let other = store.insert_comment(new_comment("b1", None)).await.unwrap();

        assert_eq!(store.delete_comment(&parent.id).await.unwrap(), 2);
        assert!(store.find_comment(&other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_threads_only_show_approved() {
        let store = MemoryStore::new();
        let top = store.insert_comment(new_comment("b1", None)).await.unwrap();
        let reply = store
            .insert_comment(new_comment("b1", Some(top.id.clone())))
            .await
            .unwrap();

        let (threads, _) = store
            .list_comment_threads("b1", PageRequest::new(1, 20))
            .await
            .unwrap();
        assert!(threads.is_empty());

        store.approve_comment(&top.id).await.unwrap();
        let (threads, total) = store
            .list_comment_threads("b1", PageRequest::new(1, 20))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(threads[0].replies.is_empty());

        store.approve_comment(&reply.id).await.unwrap();
        let (threads, _) = store
            .list_comment_threads("b1", PageRequest::new(1, 20))
            .await
            .unwrap();
        assert_eq!(threads[0].replies.len(), 1);
    }

    #[tokio::test]
    async fn test_open_contact_marks_read_once() {
        let store = MemoryStore::new();
        let c = store
            .insert_contact(NewContact {
                name: "Jane".into(),
                email: "jane@example.com".into(),
                subject: "Hello".into(),
                message: "Message body".into(),
            })
            .await
            .unwrap();
        assert_eq!(c.status, ContactStatus::New);

        let opened = store.open_contact(&c.id).await.unwrap().unwrap();
        assert_eq!(opened.status, ContactStatus::Read);

        store
            .set_contact_status(&c.id, ContactStatus::New)
            .await
            .unwrap();
        let reopened = store.open_contact(&c.id).await.unwrap().unwrap();
        assert_eq!(reopened.status, ContactStatus::Read);
    }

    #[tokio::test]
    async fn test_dashboard_top_resources_break_ties_by_id() {
        let store = MemoryStore::new();
        for id in ["b", "a", "a", "c", "b"] {
            store
                .record_event(NewEvent {
                    event_type: Some(EventType::ProjectView),
                    resource_id: Some(id.into()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
            .record_event(NewEvent {
                event_type: Some(EventType::PageView),
                ..Default::default()
            })
            .await
            .unwrap();

        let stats = store
            .dashboard(Utc::now() - chrono::Duration::days(7), 2)
            .await
            .unwrap();
        assert_eq!(stats.total_views, 6);
        assert_eq!(stats.project_views, 5);
        assert_eq!(stats.blog_views, 0);
        assert_eq!(stats.recent_views, 6);
        let ids: Vec<_> = stats.top_projects.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
