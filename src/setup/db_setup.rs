use crate::jobs::queue::{JOBS, LEASES, QUEUED_INDEX};
use redb::{CommitError, Database, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

const BLOG_SCHEMA: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            full_name TEXT,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'editor')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_time TEXT
        )",
    ),
    (
        "blog_posts",
        "CREATE TABLE IF NOT EXISTS blog_posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            excerpt TEXT,
            category TEXT NOT NULL CHECK(category IN ('technical', 'market-research')),
            author TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            featured_image TEXT,
            status TEXT NOT NULL DEFAULT 'draft'
                CHECK(status IN ('draft', 'pending_approval', 'approved', 'rejected', 'published')),
            generated_by TEXT NOT NULL DEFAULT 'human',
            generation_source TEXT NOT NULL DEFAULT 'manual',
            submitted_for_approval_at TEXT,
            submitted_by_user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            approved_by_user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            approved_at TEXT,
            rejected_by_user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            rejected_at TEXT,
            rejection_reason TEXT,
            approval_notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT
        )",
    ),
    (
        "idx_blog_posts_status",
        "CREATE INDEX IF NOT EXISTS idx_blog_posts_status ON blog_posts (status, submitted_for_approval_at)",
    ),
    (
        "idx_blog_posts_published_at",
        "CREATE INDEX IF NOT EXISTS idx_blog_posts_published_at ON blog_posts (published_at)",
    ),
    (
        "blog_topics",
        "CREATE TABLE IF NOT EXISTS blog_topics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL CHECK(category IN ('technical', 'market-research')),
            research_links TEXT NOT NULL DEFAULT '[]',
            research_notes TEXT,
            priority TEXT NOT NULL DEFAULT 'normal' CHECK(priority IN ('low', 'normal', 'high', 'urgent')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending', 'in_progress', 'completed', 'cancelled')),
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            blog_post_id INTEGER REFERENCES blog_posts(id) ON DELETE SET NULL
        )",
    ),
    (
        "blog_schedule",
        "CREATE TABLE IF NOT EXISTS blog_schedule (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            auto_posting_enabled INTEGER NOT NULL DEFAULT 1,
            max_days_between_posts INTEGER NOT NULL DEFAULT 5 CHECK(max_days_between_posts > 0),
            last_post_date TEXT,
            next_auto_post_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
];

/// Creates the relational tables. Safe to run repeatedly.
pub fn setup_blog_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    for (name, sql) in BLOG_SCHEMA {
        log::debug!("Ensuring '{}' exists", name);
        tx.execute(sql, [])?;
    }
    tx.commit()?;
    Ok(())
}

/// Creates the job queue tables in the redb file.
pub fn setup_jobs_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        log::debug!("Ensuring redb tables 'jobs', 'queued_index' and 'leases' exist");
        write_txn.open_table(JOBS)?;
        write_txn.open_table(QUEUED_INDEX)?;
        write_txn.open_table(LEASES)?;
    }
    write_txn.commit()?;
    Ok(())
}
