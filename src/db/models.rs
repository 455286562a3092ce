//! Database Models
//! Persisted records and their closed enumerations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Generate a 24-character lowercase hex document id.
///
/// The first 8 characters encode the creation second so ids sort roughly by
/// creation time; the remaining 16 are random.
pub fn new_object_id() -> String {
    let secs = Utc::now().timestamp() as u32;
    let random: u64 = rand::random();
    format!("{:08x}{:016x}", secs, random)
}

/// True when `s` has the fixed document-id shape (24 hex characters).
pub fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Closed string enumerations stored as TEXT columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role, "role", { Admin => "admin", User => "user" });

text_enum!(
    /// Where an account's credentials live
    ProviderKind, "provider", { Local => "local", Google => "google", Github => "github" }
);

text_enum!(ProjectCategory, "project category", {
    Web => "web",
    Mobile => "mobile",
    Desktop => "desktop",
    Api => "api",
    Other => "other",
});

text_enum!(ProjectStatus, "project status", { Draft => "draft", Published => "published" });

text_enum!(BlogCategory, "blog category", {
    Technology => "technology",
    Tutorial => "tutorial",
    Personal => "personal",
    News => "news",
    Other => "other",
});

text_enum!(SkillCategory, "skill category", {
    Frontend => "frontend",
    Backend => "backend",
    Database => "database",
    Tools => "tools",
    Other => "other",
});

text_enum!(ContactStatus, "contact status", { New => "new", Read => "read", Replied => "replied" });

text_enum!(EventType, "analytics type", {
    PageView => "page_view",
    ProjectView => "project_view",
    BlogView => "blog_view",
    Download => "download",
});

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub provider: ProviderKind,
    #[serde(skip_serializing)]
    pub provider_id: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// An account can sign in when it has a password or a linked provider.
    pub fn has_login_path(&self) -> bool {
        self.password_hash.is_some() || self.provider != ProviderKind::Local
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub provider: ProviderKind,
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub technologies: Vec<String>,
    pub category: ProjectCategory,
    pub images: Vec<String>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub featured: bool,
    pub status: ProjectStatus,
    pub slug: String,
    pub views: i64,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub short_description: String,
    pub technologies: Vec<String>,
    pub category: ProjectCategory,
    pub images: Vec<String>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub featured: bool,
    pub status: ProjectStatus,
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub category: Option<ProjectCategory>,
    pub images: Option<Vec<String>>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub featured: Option<bool>,
    pub status: Option<ProjectStatus>,
    pub slug: Option<String>,
}

// ============================================================================
// Blogs
// ============================================================================

/// Populated author reference
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub author: AuthorSummary,
    pub tags: Vec<String>,
    pub category: BlogCategory,
    pub featured_image: Option<String>,
    pub published: bool,
    pub views: i64,
    pub likes: i64,
    pub read_time: i32,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author_id: String,
    pub tags: Vec<String>,
    pub category: BlogCategory,
    pub featured_image: Option<String>,
    pub published: bool,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: String,
    pub read_time: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlogPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<BlogCategory>,
    pub featured_image: Option<String>,
    pub published: Option<bool>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: Option<String>,
    pub read_time: Option<i32>,
}

// ============================================================================
// Skills
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category: SkillCategory,
    pub proficiency: i32,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub years_of_experience: i32,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSkill {
    pub name: String,
    pub category: SkillCategory,
    pub proficiency: i32,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub years_of_experience: i32,
    pub featured: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SkillPatch {
    pub name: Option<String>,
    pub category: Option<SkillCategory>,
    pub proficiency: Option<i32>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub years_of_experience: Option<i32>,
    pub featured: Option<bool>,
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CommentAuthor {
    pub name: String,
    #[serde(skip_serializing)]
    pub email: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub author: CommentAuthor,
    #[serde(rename = "blog")]
    pub blog_id: String,
    pub parent_comment: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Approved top-level comment with its approved direct replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub author: CommentAuthor,
    pub blog_id: String,
    pub parent_comment: Option<String>,
}

// ============================================================================
// Contacts
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub event_type: Option<EventType>,
    pub resource_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
}

/// `{ _id, count }` row of a top-N rollup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceCount {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_views: i64,
    pub project_views: i64,
    pub blog_views: i64,
    pub recent_views: i64,
    pub top_projects: Vec<ResourceCount>,
    pub top_blogs: Vec<ResourceCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_shape() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(is_object_id(&id));
        assert_ne!(id, new_object_id());
    }

    #[test]
    fn test_is_object_id_rejects_other_shapes() {
        assert!(!is_object_id("123"));
        assert!(!is_object_id("zzzzzzzzzzzzzzzzzzzzzzzz"));
        assert!(!is_object_id("my-first-project"));
    }

    #[test]
    fn test_text_enum_round_trip() {
        assert_eq!("page_view".parse::<EventType>(), Ok(EventType::PageView));
        assert_eq!(EventType::BlogView.as_str(), "blog_view");
        assert_eq!(
            serde_json::to_value(ContactStatus::Replied).unwrap(),
            serde_json::json!("replied")
        );
        assert!("archived".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_user_login_path() {
        let now = Utc::now();
        let mut user = User {
            id: new_object_id(),
            email: "a@b.c".into(),
            password_hash: None,
            name: "A".into(),
            avatar: None,
            role: Role::User,
            is_active: true,
            provider: ProviderKind::Local,
            provider_id: None,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!user.has_login_path());
        user.provider = ProviderKind::Github;
        assert!(user.has_login_path());
    }
}
