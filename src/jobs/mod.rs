//! Background jobs: a redb-backed queue, the task bodies, and the worker loop.

pub mod queue;
pub mod tasks;
pub mod worker;

use crate::setup::db_setup::SetupError;
use chrono::{DateTime, Utc};
use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    GenerateBlogPost,
    ReviseBlogPost,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskName::GenerateBlogPost => "generate_blog_post",
            TaskName::ReviseBlogPost => "revise_blog_post",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub task: TaskName,
    pub args: serde_json::Value,
    pub status: JobStatus,
    pub dedup_key: Option<String>,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redb database error: {0}")]
    RedbDatabase(#[from] DatabaseError),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Job store setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("A job for '{key}' is already queued or running ({job_id})")]
    Conflict { key: String, job_id: Uuid },
    #[error("Job {0} not found")]
    NotFound(Uuid),
}

/// The seam between request handlers and background execution.
pub trait JobQueue: Send + Sync {
    /// Queues `task`. With a `dedup_key`, refuses with `QueueError::Conflict`
    /// while another job holding the same key is still active.
    fn enqueue(&self, task: TaskName, args: serde_json::Value, dedup_key: Option<&str>) -> Result<Uuid, QueueError>;

    fn get_status(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError>;

    /// Marks a job failed before it runs and releases its dedup key.
    fn cancel(&self, job_id: Uuid, reason: String) -> Result<(), QueueError>;
}

/// Dedup key for generation work on a topic.
pub fn topic_key(topic_id: i64) -> String {
    format!("topic:{}", topic_id)
}

/// Dedup key for revision work on a post.
pub fn post_key(post_id: i64) -> String {
    format!("post:{}", post_id)
}
