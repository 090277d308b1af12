use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod db_operations;
pub mod post_state;

/// Declares a string-backed enum that is stored as TEXT in SQLite and
/// serialized with the same spelling over JSON.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "Invalid {} '{}'. Allowed: {}",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    /// Lifecycle state of a blog post. Transitions live in `post_state`.
    PostStatus {
        Draft => "draft",
        PendingApproval => "pending_approval",
        Approved => "approved",
        Rejected => "rejected",
        Published => "published",
    }
);

text_enum!(Category {
    Technical => "technical",
    MarketResearch => "market-research",
});

text_enum!(
    /// How a post came to exist.
    GenerationSource {
        Manual => "manual",
        AiAssisted => "ai_assisted",
        Autonomous => "autonomous",
        TopicSuggestion => "topic_suggestion",
        MajorUpdate => "major_update",
    }
);

text_enum!(TopicPriority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Urgent => "urgent",
});

text_enum!(TopicStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(UserRole {
    Admin => "admin",
    Editor => "editor",
});

impl TopicPriority {
    /// Lower rank sorts first: urgent, high, normal, low.
    pub fn rank(&self) -> u8 {
        match self {
            TopicPriority::Urgent => 0,
            TopicPriority::High => 1,
            TopicPriority::Normal => 2,
            TopicPriority::Low => 3,
        }
    }

    /// Urgent and high topics are generated regardless of the posting interval.
    pub fn preempts_schedule(&self) -> bool {
        matches!(self, TopicPriority::Urgent | TopicPriority::High)
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Technical
    }
}

impl Default for TopicPriority {
    fn default() -> Self {
        TopicPriority::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub category: Category,
    pub author: String,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub status: PostStatus,
    pub generated_by: String,
    pub generation_source: GenerationSource,

    pub submitted_for_approval_at: Option<DateTime<Utc>>,
    pub submitted_by_user_id: Option<i64>,
    pub approved_by_user_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by_user_id: Option<i64>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approval_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a post is created, before a slug and status exist.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category: Category,
    pub author: String,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub generated_by: String,
    pub generation_source: GenerationSource,
}

/// Public projection of a post without workflow bookkeeping.
#[derive(Debug, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub category: Category,
    pub author: String,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&BlogPost> for PostSummary {
    fn from(post: &BlogPost) -> Self {
        PostSummary {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
            excerpt: post.excerpt.clone(),
            category: post.category,
            author: post.author.clone(),
            tags: post.tags.clone(),
            featured_image: post.featured_image.clone(),
            published_at: post.published_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogTopic {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub research_links: Vec<String>,
    pub research_notes: String,
    pub priority: TopicPriority,
    pub status: TopicStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub blog_post_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewTopic {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub research_links: Vec<String>,
    pub research_notes: String,
    pub priority: TopicPriority,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlogSchedule {
    pub id: i64,
    pub auto_posting_enabled: bool,
    pub max_days_between_posts: i64,
    pub last_post_date: Option<DateTime<Utc>>,
    pub next_auto_post_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_DAYS_BETWEEN_POSTS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login_time: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
