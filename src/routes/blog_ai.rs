use crate::error::ApiError;
use crate::helper::topic_helpers::clean_links;
use crate::jobs::tasks::{GeneratePostArgs, RevisePostArgs};
use crate::jobs::{post_key, JobQueue, TaskName};
use crate::middleware::AdminUser;
use crate::models::db_operations::posts_db_operations;
use crate::models::{Category, GenerationSource};
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_JOB_LIST: usize = 20;
const MAX_JOB_LIST: usize = 100;

#[derive(Deserialize)]
pub struct AiGenerateRequest {
    topic: String,
    #[serde(default)]
    category: Category,
    author: Option<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    research_notes: String,
    #[serde(default)]
    extra_context: String,
    provider_index: Option<i64>,
    generation_source: Option<GenerationSource>,
    #[serde(default)]
    submit_for_approval: bool,
}

#[derive(Deserialize)]
pub struct AiReviseRequest {
    revision_request: String,
    provider_index: Option<i64>,
}

#[derive(Deserialize)]
pub struct JobListQuery {
    limit: Option<usize>,
}

/// Generation jobs, mounted under `/api/blog`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/ai-generate", web::post().to(ai_generate))
        .route("/ai-revise/{id}", web::post().to(ai_revise))
        .route("/jobs", web::get().to(list_jobs))
        .route("/jobs/{job_id}", web::get().to(job_status));
}

fn accepted(job_id: Uuid) -> HttpResponse {
    HttpResponse::Accepted().json(json!({ "success": true, "job_id": job_id, "status": "queued" }))
}

async fn ai_generate(
    AdminUser(admin): AdminUser,
    state: web::Data<AppState>,
    body: web::Json<AiGenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let topic = body.topic.trim().to_string();
    if topic.is_empty() {
        return Err(ApiError::Validation("Topic is required".to_string()));
    }
    let generation_source = match body.generation_source {
        None => GenerationSource::AiAssisted,
        Some(source @ (GenerationSource::AiAssisted | GenerationSource::Autonomous)) => source,
        Some(other) => {
            return Err(ApiError::Validation(format!("generation_source '{}' is not allowed here", other)));
        }
    };

    let args = GeneratePostArgs {
        topic,
        category: body.category,
        author: body.author.filter(|a| !a.trim().is_empty()).unwrap_or_else(|| admin.username.clone()),
        links: clean_links(body.links)?,
        research_notes: body.research_notes,
        extra_context: body.extra_context,
        provider_index: body.provider_index,
        generation_source,
        submit_for_approval: body.submit_for_approval,
        submitted_by_user_id: Some(admin.user_id),
        topic_id: None,
    };
    let args = serde_json::to_value(&args).map_err(|e| ApiError::Internal(e.to_string()))?;
    let job_id = state.job_queue.enqueue(TaskName::GenerateBlogPost, args, None)?;
    log::info!("Generation job {} queued by '{}'", job_id, admin.username);
    Ok(accepted(job_id))
}

/// Queues a revision for an existing post. A second request for the same post
/// is refused while the first is queued or running.
fn enqueue_revision(
    conn: &rusqlite::Connection,
    queue: &dyn JobQueue,
    post_id: i64,
    revision_request: String,
    provider_index: Option<i64>,
) -> Result<Uuid, ApiError> {
    if revision_request.trim().is_empty() {
        return Err(ApiError::Validation("revision_request is required".to_string()));
    }
    if posts_db_operations::read_post(conn, post_id)?.is_none() {
        return Err(ApiError::NotFound(format!("Blog post {} not found", post_id)));
    }
    let args = RevisePostArgs { post_id, revision_request, provider_index };
    let args = serde_json::to_value(&args).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(queue.enqueue(TaskName::ReviseBlogPost, args, Some(&post_key(post_id)))?)
}

async fn ai_revise(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    id: web::Path<i64>,
    body: web::Json<AiReviseRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = id.into_inner();
    let body = body.into_inner();
    let conn = pool.get()?;
    let job_id =
        enqueue_revision(&conn, state.job_queue.as_ref(), post_id, body.revision_request, body.provider_index)?;
    log::info!("Revision job {} for post {} queued by '{}'", job_id, post_id, admin.username);
    Ok(accepted(job_id))
}

async fn list_jobs(
    _admin: AdminUser,
    state: web::Data<AppState>,
    query: web::Query<JobListQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_JOB_LIST).clamp(1, MAX_JOB_LIST);
    let jobs = state.job_queue.recent(limit)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "jobs": jobs })))
}

async fn job_status(
    _admin: AdminUser,
    state: web::Data<AppState>,
    job_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let job_id = job_id.into_inner();
    match state.job_queue.get_status(job_id)? {
        Some(job) => Ok(HttpResponse::Ok().json(json!({ "success": true, "job": job }))),
        None => Err(ApiError::NotFound(format!("Job {} not found", job_id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::workflow_helpers;
    use crate::test_support::{draft_post, memory_conn, now_micros, temp_queue};
    use actix_web::{http::StatusCode, ResponseError};
    use pretty_assertions::assert_eq;

    #[test]
    fn second_revision_for_same_post_conflicts_while_first_is_active() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let post = workflow_helpers::create_post(&mut conn, draft_post("Security deposits"), false, None, now_micros())
            .unwrap();
        let other = workflow_helpers::create_post(&mut conn, draft_post("Lease renewals"), false, None, now_micros())
            .unwrap();

        let first = enqueue_revision(&conn, &queue, post.id, "Shorter intro".to_string(), None).unwrap();
        let err = enqueue_revision(&conn, &queue, post.id, "Add a checklist".to_string(), None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        assert!(enqueue_revision(&conn, &queue, other.id, "Shorter intro".to_string(), None).is_ok());

        queue.claim_next().unwrap();
        queue.finish(first, serde_json::json!({ "post_id": post.id })).unwrap();
        assert!(enqueue_revision(&conn, &queue, post.id, "Add a checklist".to_string(), None).is_ok());
    }

    #[test]
    fn revision_of_missing_post_is_not_found() {
        let conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let err = enqueue_revision(&conn, &queue, 404, "Anything".to_string(), None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(queue.recent(10).unwrap().is_empty());
    }
}
