use crate::error::ApiError;
use crate::helper::scheduler_helpers::{self, RunMode, SchedulerOutcome};
use crate::helper::topic_helpers::{self, TopicUpdate};
use crate::middleware::{AdminUser, SchedulerTokenValidation};
use crate::models::db_operations::{schedule_db_operations, topics_db_operations};
use crate::models::{Category, GenerationSource, NewTopic, TopicPriority, TopicStatus};
use crate::{AppState, DbPool};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct TopicQuery {
    status: Option<TopicStatus>,
}

#[derive(Deserialize)]
pub struct CreateTopicRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    research_links: Vec<String>,
    #[serde(default)]
    research_notes: String,
    #[serde(default)]
    priority: TopicPriority,
}

#[derive(Deserialize)]
pub struct UpdateTopicRequest {
    title: Option<String>,
    description: Option<String>,
    category: Option<Category>,
    research_links: Option<Vec<String>>,
    research_notes: Option<String>,
    priority: Option<TopicPriority>,
    status: Option<TopicStatus>,
}

#[derive(Deserialize)]
pub struct MajorUpdateRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    research_links: Vec<String>,
    #[serde(default)]
    research_notes: String,
}

#[derive(Deserialize)]
pub struct ScheduleUpdateRequest {
    auto_posting_enabled: Option<bool>,
    max_days_between_posts: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct SchedulerRunRequest {
    #[serde(default)]
    force: bool,
}

/// Topics, schedule and scheduler trigger, mounted under `/api/blog`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/topics", web::get().to(list_topics))
        .route("/topics", web::post().to(create_topic))
        .route("/topics/major-update", web::post().to(major_update))
        .route("/topics/{id}", web::get().to(get_topic))
        .route("/topics/{id}", web::put().to(update_topic))
        .route("/topics/{id}", web::delete().to(delete_topic))
        .route("/topics/{id}/generate", web::post().to(generate_from_topic))
        .route("/schedule", web::get().to(get_schedule))
        .route("/schedule", web::put().to(update_schedule))
        .route("/analytics", web::get().to(analytics))
        .service(
            web::scope("/scheduler")
                .wrap(SchedulerTokenValidation)
                .route("/run", web::post().to(run_scheduler)),
        );
}

async fn list_topics(
    _admin: AdminUser,
    pool: web::Data<DbPool>,
    query: web::Query<TopicQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let topics = topics_db_operations::list_topics(&conn, query.status)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "topics": topics })))
}

async fn create_topic(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    body: web::Json<CreateTopicRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let new_topic = NewTopic {
        title: body.title,
        description: body.description,
        category: body.category,
        research_links: body.research_links,
        research_notes: body.research_notes,
        priority: body.priority,
        created_by: admin.username,
    };
    let conn = pool.get()?;
    let topic = topic_helpers::create_topic(&conn, new_topic, Utc::now())?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "topic": topic })))
}

async fn get_topic(_admin: AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let id = id.into_inner();
    match topics_db_operations::read_topic(&conn, id)? {
        Some(topic) => Ok(HttpResponse::Ok().json(json!({ "success": true, "topic": topic }))),
        None => Err(ApiError::NotFound(format!("Blog topic {} not found", id))),
    }
}

async fn update_topic(
    _admin: AdminUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    body: web::Json<UpdateTopicRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let update = TopicUpdate {
        title: body.title,
        description: body.description,
        category: body.category,
        research_links: body.research_links,
        research_notes: body.research_notes,
        priority: body.priority,
        status: body.status,
    };
    let conn = pool.get()?;
    let topic = topic_helpers::update_topic(&conn, id.into_inner(), update, Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "topic": topic })))
}

async fn delete_topic(_admin: AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    topic_helpers::delete_topic(&conn, id.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn generate_from_topic(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let mut conn = pool.get()?;
    let topic_id = id.into_inner();
    let job_id = scheduler_helpers::enqueue_topic_generation(
        &mut conn,
        state.job_queue.as_ref(),
        topic_id,
        &state.system_author,
        GenerationSource::TopicSuggestion,
        Some(admin.user_id),
    )?;
    Ok(HttpResponse::Accepted().json(json!({ "success": true, "topic_id": topic_id, "job_id": job_id })))
}

async fn major_update(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<MajorUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    let new_topic = NewTopic {
        title: body.title.trim().to_string(),
        description: body.description,
        category: Category::Technical,
        research_links: topic_helpers::clean_links(body.research_links)?,
        research_notes: body.research_notes,
        priority: TopicPriority::Urgent,
        created_by: admin.username.clone(),
    };
    let mut conn = pool.get()?;
    let (topic, job_id) = scheduler_helpers::queue_major_update(
        &mut conn,
        state.job_queue.as_ref(),
        new_topic,
        &state.system_author,
        Some(admin.user_id),
        Utc::now(),
    )?;
    log::info!("Major update topic {} queued by '{}'", topic.id, admin.username);
    Ok(HttpResponse::Accepted().json(json!({ "success": true, "topic": topic, "job_id": job_id })))
}

async fn get_schedule(_admin: AdminUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let schedule = schedule_db_operations::get_or_create_schedule(&conn, Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "schedule": schedule })))
}

async fn update_schedule(
    _admin: AdminUser,
    pool: web::Data<DbPool>,
    body: web::Json<ScheduleUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let schedule =
        scheduler_helpers::update_schedule(&conn, body.auto_posting_enabled, body.max_days_between_posts, Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "schedule": schedule })))
}

async fn analytics(_admin: AdminUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "analytics": scheduler_helpers::analytics(&conn, Utc::now())? })))
}

/// Token-guarded by the scope middleware.
async fn run_scheduler(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: Option<web::Json<SchedulerRunRequest>>,
) -> Result<HttpResponse, ApiError> {
    let force = body.map(web::Json::into_inner).unwrap_or_default().force;
    let mode = if force { RunMode::Forced } else { RunMode::Scheduled };
    let mut conn = pool.get()?;
    let outcome = scheduler_helpers::check_and_generate(
        &mut conn,
        state.job_queue.as_ref(),
        &state.system_author,
        mode,
        Utc::now(),
    )?;
    let response = match &outcome {
        SchedulerOutcome::Enqueued { .. } => HttpResponse::Accepted().json(&outcome),
        _ => HttpResponse::Ok().json(&outcome),
    };
    Ok(response)
}
