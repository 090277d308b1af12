use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::users_db_operations;
use crate::DbPool;
use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/me", web::get().to(me)),
    );
}

async fn login(
    session: Session,
    pool: web::Data<DbPool>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { username, password } = body.into_inner();
    let pool = pool.into_inner();

    // bcrypt runs on the blocking pool.
    let user = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        let user = users_db_operations::verify_credentials(&conn, username.trim(), &password)?;
        if let Some(user) = &user {
            users_db_operations::update_last_login_time(&conn, user.id)?;
        }
        Ok(user)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Login task failed: {}", e)))??;

    let user = match user {
        Some(user) => user,
        None => {
            log::warn!("Failed login attempt");
            return Err(ApiError::Unauthorized("Invalid username or password.".to_string()));
        }
    };

    AuthenticatedUser { user_id: user.id, username: user.username.clone(), role: user.role }.store(&session)?;
    log::info!("User '{}' logged in", user.username);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}

async fn logout(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::Ok().json(json!({ "success": true }))
}

async fn me(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "user": user }))
}
