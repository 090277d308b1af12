use super::{JobRecord, TaskName};
use crate::helper::generation_helpers::{self, GenerationRequest};
use crate::helper::workflow_helpers::{self, GeneratedPostOptions, WorkflowError};
use crate::llm::{GenerationError, TextGenerator};
use crate::models::db_operations::{posts_db_operations, topics_db_operations, DbError};
use crate::models::{Category, GenerationSource};
use crate::DbPool;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid job arguments: {0}")]
    Args(#[from] serde_json::Error),
    #[error("Blog post {0} not found")]
    PostNotFound(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePostArgs {
    pub topic: String,
    pub category: Category,
    pub author: String,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub research_notes: String,
    #[serde(default)]
    pub extra_context: String,
    pub provider_index: Option<i64>,
    pub generation_source: GenerationSource,
    pub submit_for_approval: bool,
    pub submitted_by_user_id: Option<i64>,
    pub topic_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisePostArgs {
    pub post_id: i64,
    pub revision_request: String,
    pub provider_index: Option<i64>,
}

/// Shared handles a task body needs.
#[derive(Clone)]
pub struct TaskContext {
    pub pool: DbPool,
    pub generator: Arc<dyn TextGenerator>,
}

pub async fn run_task(ctx: &TaskContext, job: &JobRecord) -> Result<serde_json::Value, TaskError> {
    match job.task {
        TaskName::GenerateBlogPost => {
            let args: GeneratePostArgs = serde_json::from_value(job.args.clone())?;
            generate_blog_post(ctx, args).await
        }
        TaskName::ReviseBlogPost => {
            let args: RevisePostArgs = serde_json::from_value(job.args.clone())?;
            revise_blog_post(ctx, args).await
        }
    }
}

/// Calls the provider and stores the result. On any failure the topic (if
/// any) goes back to `pending` and no post is created.
pub async fn generate_blog_post(ctx: &TaskContext, args: GeneratePostArgs) -> Result<serde_json::Value, TaskError> {
    let outcome = generate_and_store(ctx, &args).await;
    if outcome.is_err() {
        if let Some(topic_id) = args.topic_id {
            release_topic(ctx, topic_id);
        }
    }
    outcome
}

async fn generate_and_store(ctx: &TaskContext, args: &GeneratePostArgs) -> Result<serde_json::Value, TaskError> {
    let request = GenerationRequest {
        topic: args.topic.clone(),
        category: args.category,
        links: args.links.clone(),
        research_notes: args.research_notes.clone(),
        extra_context: args.extra_context.clone(),
        provider_index: args.provider_index,
    };
    let generated = generation_helpers::generate_content(ctx.generator.as_ref(), &request).await?;

    let options = GeneratedPostOptions {
        category: args.category,
        author: args.author.clone(),
        generation_source: args.generation_source,
        submit_for_approval: args.submit_for_approval,
        submitted_by_user_id: args.submitted_by_user_id,
        topic_id: args.topic_id,
    };
    let mut conn = ctx.pool.get()?;
    let post = workflow_helpers::create_generated_post(&mut conn, &generated, &options, Utc::now())?;

    Ok(json!({
        "success": true,
        "post_id": post.id,
        "slug": post.slug,
        "status": post.status,
        "topic_id": args.topic_id,
    }))
}

fn release_topic(ctx: &TaskContext, topic_id: i64) {
    let reverted = ctx
        .pool
        .get()
        .map_err(DbError::from)
        .and_then(|conn| topics_db_operations::revert_to_pending(&conn, topic_id));
    match reverted {
        Ok(true) => log::info!("Topic {} returned to pending after failed generation", topic_id),
        Ok(false) => {}
        Err(e) => log::error!("Failed to return topic {} to pending: {}", topic_id, e),
    }
}

pub async fn revise_blog_post(ctx: &TaskContext, args: RevisePostArgs) -> Result<serde_json::Value, TaskError> {
    let post = {
        let conn = ctx.pool.get()?;
        posts_db_operations::read_post(&conn, args.post_id)?.ok_or(TaskError::PostNotFound(args.post_id))?
    };

    let revised = generation_helpers::revise_content(
        ctx.generator.as_ref(),
        &args.revision_request,
        &post.title,
        &post.content,
        args.provider_index,
    )
    .await?;

    let mut conn = ctx.pool.get()?;
    let post = workflow_helpers::apply_revision(&mut conn, args.post_id, &revised, Utc::now())?;
    Ok(json!({ "success": true, "post_id": post.id, "slug": post.slug }))
}
