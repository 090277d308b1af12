use super::{format_timestamp, optional_timestamp_column, timestamp_column, DbError};
use crate::models::{BlogSchedule, DEFAULT_MAX_DAYS_BETWEEN_POSTS};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SCHEDULE_ID: i64 = 1;

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<BlogSchedule> {
    Ok(BlogSchedule {
        id: row.get(0)?,
        auto_posting_enabled: row.get(1)?,
        max_days_between_posts: row.get(2)?,
        last_post_date: optional_timestamp_column(row, 3)?,
        next_auto_post_date: optional_timestamp_column(row, 4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

fn read_schedule(conn: &Connection) -> Result<Option<BlogSchedule>, DbError> {
    Ok(conn
        .query_row(
            "SELECT id, auto_posting_enabled, max_days_between_posts, last_post_date, next_auto_post_date, \
             created_at, updated_at FROM blog_schedule WHERE id = ?1",
            [SCHEDULE_ID],
            row_to_schedule,
        )
        .optional()?)
}

/// Returns the single schedule row, inserting the defaults the first time.
pub fn get_or_create_schedule(conn: &Connection, now: DateTime<Utc>) -> Result<BlogSchedule, DbError> {
    let now_str = format_timestamp(&now);
    conn.execute(
        "INSERT OR IGNORE INTO blog_schedule (id, auto_posting_enabled, max_days_between_posts, created_at, updated_at) \
         VALUES (?1, 1, ?2, ?3, ?3)",
        params![SCHEDULE_ID, DEFAULT_MAX_DAYS_BETWEEN_POSTS, now_str],
    )?;
    read_schedule(conn)?.ok_or_else(|| DbError::NotFound("blog schedule".to_string()))
}

pub fn save_schedule(conn: &Connection, schedule: &BlogSchedule) -> Result<(), DbError> {
    conn.execute(
        "UPDATE blog_schedule SET auto_posting_enabled = ?1, max_days_between_posts = ?2, last_post_date = ?3, \
         next_auto_post_date = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            schedule.auto_posting_enabled,
            schedule.max_days_between_posts,
            schedule.last_post_date.as_ref().map(format_timestamp),
            schedule.next_auto_post_date.as_ref().map(format_timestamp),
            format_timestamp(&schedule.updated_at),
            SCHEDULE_ID,
        ],
    )?;
    Ok(())
}

/// Records a first publication and pushes the next automatic post date out.
pub fn record_publication(conn: &Connection, published_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<BlogSchedule, DbError> {
    let mut schedule = get_or_create_schedule(conn, now)?;
    schedule.last_post_date = Some(published_at);
    schedule.next_auto_post_date = Some(published_at + Duration::days(schedule.max_days_between_posts));
    schedule.updated_at = now;
    save_schedule(conn, &schedule)?;
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_conn;
    use pretty_assertions::assert_eq;

    #[test]
    fn schedule_is_created_once_with_defaults() {
        let conn = memory_conn();
        let now = Utc::now();
        let first = get_or_create_schedule(&conn, now).unwrap();
        assert_eq!(first.id, 1);
        assert!(first.auto_posting_enabled);
        assert_eq!(first.max_days_between_posts, DEFAULT_MAX_DAYS_BETWEEN_POSTS);

        let second = get_or_create_schedule(&conn, now + Duration::hours(1)).unwrap();
        assert_eq!(second, first);
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM blog_schedule", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn publication_moves_next_post_date() {
        let conn = memory_conn();
        let now = Utc::now();
        let schedule = record_publication(&conn, now, now).unwrap();
        assert_eq!(schedule.last_post_date, Some(now));
        assert_eq!(schedule.next_auto_post_date, Some(now + Duration::days(5)));
    }
}
