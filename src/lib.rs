use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::jobs::queue::RedbJobQueue;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared by every handler through `web::Data<AppState>`.
pub struct AppState {
    pub scheduler_token: String,
    pub job_queue: Arc<RedbJobQueue>,
    /// Byline used for scheduler and major-update posts.
    pub system_author: String,
}

pub mod config;
pub mod error;
pub mod helper;
pub mod jobs;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

#[cfg(test)]
mod test_support;
