use crate::error::ApiError;
use crate::helper::{approval_helpers, workflow_helpers};
use crate::middleware::{AdminOrScheduler, AdminUser};
use crate::DbPool;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    notes: Option<String>,
    #[serde(default = "default_true")]
    publish_immediately: bool,
}

impl Default for ApproveRequest {
    fn default() -> Self {
        ApproveRequest { notes: None, publish_immediately: true }
    }
}

#[derive(Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
pub struct BulkApproveRequest {
    post_ids: Vec<i64>,
    notes: Option<String>,
    #[serde(default = "default_true")]
    publish_immediately: bool,
}

/// Approval queue, mounted under `/api/blog`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/approval")
            .route("/pending", web::get().to(list_pending))
            .route("/pending/{id}", web::get().to(get_pending))
            .route("/approve/{id}", web::post().to(approve))
            .route("/reject/{id}", web::post().to(reject))
            .route("/bulk-approve", web::post().to(bulk_approve))
            .route("/statistics", web::get().to(statistics)),
    );
}

async fn list_pending(caller: AdminOrScheduler, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    if let AdminOrScheduler::Scheduler = caller {
        log::debug!("Pending approval list requested with scheduler token");
    }
    let conn = pool.get()?;
    let posts = approval_helpers::list_pending(&conn)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "count": posts.len(), "posts": posts })))
}

async fn get_pending(_admin: AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let post = approval_helpers::get_pending(&conn, id.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn approve(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    body: Option<web::Json<ApproveRequest>>,
) -> Result<HttpResponse, ApiError> {
    let req = body.map(web::Json::into_inner).unwrap_or_default();
    let mut conn = pool.get()?;
    let post = workflow_helpers::approve(
        &mut conn,
        id.into_inner(),
        admin.user_id,
        req.notes.as_deref(),
        req.publish_immediately,
        Utc::now(),
    )?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn reject(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    body: web::Json<RejectRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut conn = pool.get()?;
    let post = workflow_helpers::reject(&mut conn, id.into_inner(), admin.user_id, &body.reason, Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn bulk_approve(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    body: web::Json<BulkApproveRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.post_ids.is_empty() {
        return Err(ApiError::Validation("post_ids must not be empty".to_string()));
    }
    let mut conn = pool.get()?;
    let result = workflow_helpers::bulk_approve(
        &mut conn,
        &body.post_ids,
        admin.user_id,
        body.notes.as_deref(),
        body.publish_immediately,
        Utc::now(),
    );
    log::info!(
        "Bulk approval by '{}': {} approved, {} errors",
        admin.username,
        result.approved_count,
        result.errors.len()
    );
    Ok(HttpResponse::Ok().json(json!({ "success": true, "result": result })))
}

async fn statistics(_admin: AdminUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "statistics": approval_helpers::statistics(&conn)? })))
}
