use crate::error::ApiError;
use crate::helper::admin_helpers;
use crate::middleware::AdminUser;
use crate::models::UserRole;
use crate::DbPool;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    username: String,
    full_name: Option<String>,
    password: String,
    role: UserRole,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    full_name: Option<String>,
    role: UserRole,
    is_active: bool,
    new_password: Option<String>,
}

/// User management, mounted under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/users")
            .route("", web::get().to(list_users))
            .route("", web::post().to(create_user))
            .route("/{id}", web::put().to(update_user))
            .route("/{id}", web::delete().to(delete_user)),
    );
}

async fn list_users(_admin: AdminUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let users = admin_helpers::fetch_all_users(&pool)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "users": users })))
}

async fn create_user(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let pool = pool.into_inner();
    let user = web::block(move || {
        admin_helpers::create_user(&pool, &body.username, body.full_name.as_deref(), &body.password, body.role)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    log::info!("User '{}' created by '{}'", user.username, admin.username);
    Ok(HttpResponse::Created().json(json!({ "success": true, "user": user })))
}

async fn update_user(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = id.into_inner();
    let body = body.into_inner();
    if user_id == admin.user_id && (body.role != UserRole::Admin || !body.is_active) {
        return Err(ApiError::Validation("You cannot demote or deactivate your own account.".to_string()));
    }
    let pool = pool.into_inner();
    let user = web::block(move || {
        admin_helpers::update_user(
            &pool,
            user_id,
            body.full_name.as_deref(),
            body.role,
            body.is_active,
            body.new_password.as_deref(),
        )
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}

async fn delete_user(AdminUser(admin): AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let user_id = id.into_inner();
    admin_helpers::delete_user(&pool, user_id, admin.user_id)?;
    log::info!("User {} deleted by '{}'", user_id, admin.username);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
