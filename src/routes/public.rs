use crate::error::ApiError;
use crate::helper::public_helpers;
use crate::helper::scheduler_helpers;
use crate::models::Category;
use crate::DbPool;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct PostListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    category: Option<Category>,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    limit: Option<u32>,
}

/// Unauthenticated reads, mounted under `/api/blog`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_published_posts))
        .route("/posts/{slug}", web::get().to(get_post_by_slug))
        .route("/categories", web::get().to(list_categories))
        .route("/recent", web::get().to(recent_posts))
        .route("/schedule/check", web::get().to(schedule_check));
}

async fn list_published_posts(
    pool: web::Data<DbPool>,
    query: web::Query<PostListQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let limit = public_helpers::page_limit(query.limit);
    let page = public_helpers::fetch_published_page(&conn, query.category, limit, query.offset.unwrap_or(0))?;
    Ok(HttpResponse::Ok().json(page))
}

async fn get_post_by_slug(pool: web::Data<DbPool>, slug: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    match public_helpers::fetch_post_by_slug(&conn, &slug)? {
        Some(post) => Ok(HttpResponse::Ok().json(post)),
        None => Err(ApiError::NotFound("Post not found".to_string())),
    }
}

async fn list_categories(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(HttpResponse::Ok().json(json!({ "categories": public_helpers::fetch_categories(&conn)? })))
}

async fn recent_posts(pool: web::Data<DbPool>, query: web::Query<RecentQuery>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let limit = query.limit.unwrap_or(5).clamp(1, public_helpers::MAX_PAGE_SIZE);
    Ok(HttpResponse::Ok().json(json!({ "posts": public_helpers::fetch_recent(&conn, limit)? })))
}

async fn schedule_check(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    Ok(HttpResponse::Ok().json(scheduler_helpers::check_schedule(&conn, Utc::now())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_pool;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn unknown_slug_is_404_json() {
        let (_dir, pool) = temp_pool();
        let app = test::init_service(
            App::new().app_data(web::Data::new(pool)).service(web::scope("/api/blog").configure(config_api)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/blog/posts/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn schedule_check_is_public() {
        let (_dir, pool) = temp_pool();
        let app = test::init_service(
            App::new().app_data(web::Data::new(pool)).service(web::scope("/api/blog").configure(config_api)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/blog/schedule/check").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["should_post"], true);
        assert_eq!(body["max_days_between_posts"], 5);
    }
}
