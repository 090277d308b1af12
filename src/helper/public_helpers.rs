use crate::helper::scheduler_helpers::CategoryCount;
use crate::helper::sanitization_helpers::render_content;
use crate::models::db_operations::{posts_db_operations, DbError};
use crate::models::{Category, PostStatus, PostSummary};
use rusqlite::Connection;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Caps a caller-supplied page size.
pub fn page_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostSummary>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// A published post with its body rendered to sanitised HTML.
#[derive(Debug, Serialize)]
pub struct PublicPost {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub content_html: String,
}

pub fn fetch_published_page(
    conn: &Connection,
    category: Option<Category>,
    limit: u32,
    offset: u32,
) -> Result<PostPage, DbError> {
    let posts = posts_db_operations::read_published_paginated(conn, category, limit, offset)?;
    Ok(PostPage {
        posts: posts.iter().map(PostSummary::from).collect(),
        total: posts_db_operations::count_published(conn, category)?,
        limit,
        offset,
    })
}

/// Only published posts are visible by slug.
pub fn fetch_post_by_slug(conn: &Connection, slug: &str) -> Result<Option<PublicPost>, DbError> {
    Ok(posts_db_operations::read_post_by_slug(conn, slug)?
        .filter(|post| post.status == PostStatus::Published)
        .map(|post| PublicPost { summary: PostSummary::from(&post), content_html: render_content(&post.content) }))
}

/// Every category, including ones with no published posts yet.
pub fn fetch_categories(conn: &Connection) -> Result<Vec<CategoryCount>, DbError> {
    let counts = posts_db_operations::published_category_counts(conn)?;
    Ok(Category::ALL
        .iter()
        .map(|category| CategoryCount {
            category: *category,
            count: counts.iter().find(|(c, _)| c == category).map(|(_, n)| *n).unwrap_or(0),
        })
        .collect())
}

pub fn fetch_recent(conn: &Connection, limit: u32) -> Result<Vec<PostSummary>, DbError> {
    let posts = posts_db_operations::read_published_paginated(conn, None, limit, 0)?;
    Ok(posts.iter().map(PostSummary::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::workflow_helpers;
    use crate::models::db_operations::users_db_operations;
    use crate::models::UserRole;
    use crate::test_support::{draft_post, memory_conn, now_micros};
    use pretty_assertions::assert_eq;

    fn published(conn: &mut Connection, title: &str) -> i64 {
        let admin = match users_db_operations::read_user_by_username(conn, "admin").unwrap() {
            Some(user) => user.id,
            None => users_db_operations::create_user(conn, "admin", None, "admin-pass", UserRole::Admin).unwrap(),
        };
        let post = workflow_helpers::create_post(conn, draft_post(title), true, Some(admin), now_micros()).unwrap();
        workflow_helpers::approve(conn, post.id, admin, None, true, now_micros()).unwrap();
        post.id
    }

    #[test]
    fn drafts_are_hidden_from_public_reads() {
        let mut conn = memory_conn();
        published(&mut conn, "Repairs and your rights");
        let draft = workflow_helpers::create_post(&mut conn, draft_post("Unfinished"), false, None, now_micros()).unwrap();

        let page = fetch_published_page(&conn, None, 10, 0).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.posts[0].slug, "repairs-and-your-rights");
        assert!(fetch_post_by_slug(&conn, &draft.slug).unwrap().is_none());

        let post = fetch_post_by_slug(&conn, "repairs-and-your-rights").unwrap().unwrap();
        assert!(post.content_html.contains("<h2>Repairs and your rights</h2>"));
    }

    #[test]
    fn categories_include_empty_ones() {
        let mut conn = memory_conn();
        published(&mut conn, "Security deposits");
        let categories = fetch_categories(&conn).unwrap();
        assert_eq!(categories.len(), Category::ALL.len());
        let technical = categories.iter().find(|c| c.category == Category::Technical).unwrap();
        assert_eq!(technical.count, 1);
        let research = categories.iter().find(|c| c.category == Category::MarketResearch).unwrap();
        assert_eq!(research.count, 0);
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(page_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(500)), MAX_PAGE_SIZE);
    }
}
