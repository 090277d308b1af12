use super::{format_timestamp, optional_timestamp_column, string_list_column, timestamp_column, DbError};
use crate::models::{BlogTopic, NewTopic, TopicStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TOPIC_COLUMNS: &str = "id, title, description, category, research_links, research_notes, priority, \
    status, created_by, created_at, completed_at, blog_post_id";

fn row_to_topic(row: &Row<'_>) -> rusqlite::Result<BlogTopic> {
    Ok(BlogTopic {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        category: row.get(3)?,
        research_links: string_list_column(row, 4)?,
        research_notes: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        priority: row.get(6)?,
        status: row.get(7)?,
        created_by: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        completed_at: optional_timestamp_column(row, 10)?,
        blog_post_id: row.get(11)?,
    })
}

fn query_topics(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<BlogTopic>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_topic)?;
    let mut topics = Vec::new();
    for topic in rows {
        topics.push(topic?);
    }
    Ok(topics)
}

pub fn insert_topic(conn: &Connection, topic: &NewTopic, now: DateTime<Utc>) -> Result<i64, DbError> {
    let links_json = serde_json::to_string(&topic.research_links)?;
    conn.execute(
        "INSERT INTO blog_topics (title, description, category, research_links, research_notes, priority, \
         status, created_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8)",
        params![
            topic.title,
            topic.description,
            topic.category,
            links_json,
            topic.research_notes,
            topic.priority,
            topic.created_by,
            format_timestamp(&now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_topic(conn: &Connection, id: i64) -> Result<Option<BlogTopic>, DbError> {
    Ok(conn
        .query_row(&format!("SELECT {} FROM blog_topics WHERE id = ?1", TOPIC_COLUMNS), [id], row_to_topic)
        .optional()?)
}

/// Newest first, optionally restricted to one status.
pub fn list_topics(conn: &Connection, status: Option<TopicStatus>) -> Result<Vec<BlogTopic>, DbError> {
    query_topics(
        conn,
        &format!(
            "SELECT {} FROM blog_topics WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, id DESC",
            TOPIC_COLUMNS
        ),
        params![status],
    )
}

/// Pending topics in insertion order. Priority ordering is applied by the scheduler.
pub fn read_pending_topics(conn: &Connection) -> Result<Vec<BlogTopic>, DbError> {
    query_topics(
        conn,
        &format!("SELECT {} FROM blog_topics WHERE status = 'pending' ORDER BY created_at ASC, id ASC", TOPIC_COLUMNS),
        [],
    )
}

pub fn save_topic(conn: &Connection, topic: &BlogTopic) -> Result<(), DbError> {
    let links_json = serde_json::to_string(&topic.research_links)?;
    let updated = conn.execute(
        "UPDATE blog_topics SET title = ?1, description = ?2, category = ?3, research_links = ?4, \
         research_notes = ?5, priority = ?6, status = ?7, completed_at = ?8, blog_post_id = ?9 WHERE id = ?10",
        params![
            topic.title,
            topic.description,
            topic.category,
            links_json,
            topic.research_notes,
            topic.priority,
            topic.status,
            topic.completed_at.as_ref().map(format_timestamp),
            topic.blog_post_id,
            topic.id,
        ],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("blog topic {}", topic.id)));
    }
    Ok(())
}

pub fn delete_topic(conn: &Connection, id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM blog_topics WHERE id = ?1", [id])?)
}

pub fn count_by_status(conn: &Connection, status: TopicStatus) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM blog_topics WHERE status = ?1", [status], |row| row.get(0))?)
}

/// Moves a topic from `pending` to `in_progress`. Returns false when the topic
/// was not pending, so a second trigger can be refused.
pub fn mark_in_progress(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE blog_topics SET status = 'in_progress' WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    Ok(updated == 1)
}

/// Puts an `in_progress` topic back in the queue after a failed generation.
pub fn revert_to_pending(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE blog_topics SET status = 'pending' WHERE id = ?1 AND status = 'in_progress'",
        [id],
    )?;
    Ok(updated == 1)
}

pub fn mark_completed(conn: &Connection, id: i64, blog_post_id: i64, now: DateTime<Utc>) -> Result<(), DbError> {
    let updated = conn.execute(
        "UPDATE blog_topics SET status = 'completed', completed_at = ?1, blog_post_id = ?2 WHERE id = ?3",
        params![format_timestamp(&now), blog_post_id, id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("blog topic {}", id)));
    }
    Ok(())
}
