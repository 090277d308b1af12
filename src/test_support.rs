//! Shared fixtures for unit tests.

use crate::jobs::queue::RedbJobQueue;
use crate::llm::{Completion, CompletionRequest, GenerationError, TextGenerator};
use crate::models::{Category, GenerationSource, NewPost, NewTopic, TopicPriority};
use crate::setup::db_setup;
use crate::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::TempDir;

/// In-memory database with the full schema.
pub fn memory_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    db_setup::setup_blog_db(&mut conn).unwrap();
    conn
}

/// File-backed pool, for code that takes connections from a pool.
pub fn temp_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let manager = SqliteConnectionManager::file(dir.path().join("blog.db"))
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = r2d2::Pool::builder().max_size(4).build(manager).unwrap();
    db_setup::setup_blog_db(&mut pool.get().unwrap()).unwrap();
    (dir, pool)
}

pub fn temp_queue() -> (TempDir, RedbJobQueue) {
    let dir = tempfile::tempdir().unwrap();
    let queue = RedbJobQueue::open(dir.path().join("jobs.redb"), chrono::Duration::minutes(15)).unwrap();
    (dir, queue)
}

/// Current time at the precision timestamps are stored with.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn draft_post(title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: format!("## {}\n\nBody text.", title),
        excerpt: None,
        category: Category::Technical,
        author: "Staff Writer".to_string(),
        tags: vec!["tenants".to_string()],
        featured_image: None,
        generated_by: "human".to_string(),
        generation_source: GenerationSource::Manual,
    }
}

pub fn new_topic(title: &str, priority: TopicPriority) -> NewTopic {
    NewTopic {
        title: title.to_string(),
        description: format!("Cover {}", title),
        category: Category::Technical,
        research_links: vec!["https://example.org/source".to_string()],
        research_notes: "Notes".to_string(),
        priority,
        created_by: "admin".to_string(),
    }
}

/// Returns canned responses in order and records every request.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self { responses: Mutex::new(responses.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Transport("no scripted response left".to_string())));
        next.map(|text| Completion { text, provider: "scripted".to_string() })
    }
}
