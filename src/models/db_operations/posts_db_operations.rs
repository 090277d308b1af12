use super::{format_timestamp, optional_timestamp_column, string_list_column, timestamp_column, DbError};
use crate::models::{BlogPost, Category, NewPost, PostStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, category, author, tags, featured_image, \
    status, generated_by, generation_source, submitted_for_approval_at, submitted_by_user_id, \
    approved_by_user_id, approved_at, rejected_by_user_id, rejected_at, rejection_reason, \
    approval_notes, created_at, updated_at, published_at";

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<BlogPost> {
    Ok(BlogPost {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        category: row.get(5)?,
        author: row.get(6)?,
        tags: string_list_column(row, 7)?,
        featured_image: row.get(8)?,
        status: row.get(9)?,
        generated_by: row.get(10)?,
        generation_source: row.get(11)?,
        submitted_for_approval_at: optional_timestamp_column(row, 12)?,
        submitted_by_user_id: row.get(13)?,
        approved_by_user_id: row.get(14)?,
        approved_at: optional_timestamp_column(row, 15)?,
        rejected_by_user_id: row.get(16)?,
        rejected_at: optional_timestamp_column(row, 17)?,
        rejection_reason: row.get(18)?,
        approval_notes: row.get(19)?,
        created_at: timestamp_column(row, 20)?,
        updated_at: timestamp_column(row, 21)?,
        published_at: optional_timestamp_column(row, 22)?,
    })
}

fn query_posts(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<BlogPost>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_post)?;
    let mut posts = Vec::new();
    for post in rows {
        posts.push(post?);
    }
    Ok(posts)
}

fn query_one_post(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Option<BlogPost>, DbError> {
    Ok(conn.query_row(sql, params, row_to_post).optional()?)
}

fn opt_ts(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(format_timestamp)
}

/// Inserts a new row and returns its id. Slug uniqueness is the caller's job;
/// the UNIQUE constraint is the last line.
pub fn insert_post(
    conn: &Connection,
    new_post: &NewPost,
    slug: &str,
    excerpt: &str,
    status: PostStatus,
    submitted_by_user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<i64, DbError> {
    let tags_json = serde_json::to_string(&new_post.tags)?;
    let now_str = format_timestamp(&now);
    let submitted_at = if status == PostStatus::PendingApproval { Some(now_str.clone()) } else { None };

    conn.execute(
        "INSERT INTO blog_posts (title, slug, content, excerpt, category, author, tags, featured_image, \
         status, generated_by, generation_source, submitted_for_approval_at, submitted_by_user_id, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            new_post.title,
            slug,
            new_post.content,
            excerpt,
            new_post.category,
            new_post.author,
            tags_json,
            new_post.featured_image,
            status,
            new_post.generated_by,
            new_post.generation_source,
            submitted_at,
            submitted_by_user_id,
            now_str,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_post(conn: &Connection, id: i64) -> Result<Option<BlogPost>, DbError> {
    query_one_post(conn, &format!("SELECT {} FROM blog_posts WHERE id = ?1", POST_COLUMNS), [id])
}

pub fn read_post_by_slug(conn: &Connection, slug: &str) -> Result<Option<BlogPost>, DbError> {
    query_one_post(conn, &format!("SELECT {} FROM blog_posts WHERE slug = ?1", POST_COLUMNS), [slug])
}

pub fn slug_exists(conn: &Connection, slug: &str, exclude_id: Option<i64>) -> Result<bool, DbError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM blog_posts WHERE slug = ?1 AND (?2 IS NULL OR id != ?2))",
        params![slug, exclude_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Writes every mutable column of `post` back to its row.
pub fn save_post(conn: &Connection, post: &BlogPost) -> Result<(), DbError> {
    let tags_json = serde_json::to_string(&post.tags)?;
    let updated = conn.execute(
        "UPDATE blog_posts SET title = ?1, slug = ?2, content = ?3, excerpt = ?4, category = ?5, \
         author = ?6, tags = ?7, featured_image = ?8, status = ?9, generated_by = ?10, \
         generation_source = ?11, submitted_for_approval_at = ?12, submitted_by_user_id = ?13, \
         approved_by_user_id = ?14, approved_at = ?15, rejected_by_user_id = ?16, rejected_at = ?17, \
         rejection_reason = ?18, approval_notes = ?19, updated_at = ?20, published_at = ?21 \
         WHERE id = ?22",
        params![
            post.title,
            post.slug,
            post.content,
            post.excerpt,
            post.category,
            post.author,
            tags_json,
            post.featured_image,
            post.status,
            post.generated_by,
            post.generation_source,
            opt_ts(&post.submitted_for_approval_at),
            post.submitted_by_user_id,
            post.approved_by_user_id,
            opt_ts(&post.approved_at),
            post.rejected_by_user_id,
            opt_ts(&post.rejected_at),
            post.rejection_reason,
            post.approval_notes,
            format_timestamp(&post.updated_at),
            opt_ts(&post.published_at),
            post.id,
        ],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("blog post {}", post.id)));
    }
    Ok(())
}

pub fn delete_post(conn: &Connection, id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM blog_posts WHERE id = ?1", [id])?)
}

/// Admin listing, newest first, optionally restricted to one status.
pub fn read_posts_paginated(
    conn: &Connection,
    status: Option<PostStatus>,
    limit: u32,
    offset: u32,
) -> Result<Vec<BlogPost>, DbError> {
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            POST_COLUMNS
        ),
        params![status, limit, offset],
    )
}

/// The approval queue, oldest submission first.
pub fn read_pending_oldest_first(conn: &Connection) -> Result<Vec<BlogPost>, DbError> {
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE status = 'pending_approval' \
             ORDER BY submitted_for_approval_at IS NULL, submitted_for_approval_at ASC, id ASC",
            POST_COLUMNS
        ),
        [],
    )
}

pub fn count_by_status(conn: &Connection, status: PostStatus) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM blog_posts WHERE status = ?1", [status], |row| row.get(0))?)
}

/// The most recent post that is currently published, by `published_at`.
pub fn read_latest_published(conn: &Connection) -> Result<Option<BlogPost>, DbError> {
    query_one_post(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE status = 'published' AND published_at IS NOT NULL \
             ORDER BY published_at DESC LIMIT 1",
            POST_COLUMNS
        ),
        [],
    )
}

pub fn read_recent_approvals(conn: &Connection, limit: u32) -> Result<Vec<BlogPost>, DbError> {
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE status IN ('approved', 'published') AND approved_at IS NOT NULL \
             ORDER BY approved_at DESC LIMIT ?1",
            POST_COLUMNS
        ),
        [limit],
    )
}

pub fn read_recent_rejections(conn: &Connection, limit: u32) -> Result<Vec<BlogPost>, DbError> {
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE status = 'rejected' ORDER BY rejected_at DESC LIMIT ?1",
            POST_COLUMNS
        ),
        [limit],
    )
}

pub fn read_published_paginated(
    conn: &Connection,
    category: Option<Category>,
    limit: u32,
    offset: u32,
) -> Result<Vec<BlogPost>, DbError> {
    query_posts(
        conn,
        &format!(
            "SELECT {} FROM blog_posts WHERE status = 'published' AND (?1 IS NULL OR category = ?1) \
             ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ?2 OFFSET ?3",
            POST_COLUMNS
        ),
        params![category, limit, offset],
    )
}

pub fn count_published(conn: &Connection, category: Option<Category>) -> Result<i64, DbError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM blog_posts WHERE status = 'published' AND (?1 IS NULL OR category = ?1)",
        params![category],
        |row| row.get(0),
    )?)
}

pub fn published_category_counts(conn: &Connection) -> Result<Vec<(Category, i64)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM blog_posts WHERE status = 'published' GROUP BY category ORDER BY category",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}
