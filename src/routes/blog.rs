use crate::error::ApiError;
use crate::helper::generation_helpers::split_tag_string;
use crate::helper::public_helpers;
use crate::helper::workflow_helpers::{self, PostUpdate};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::db_operations::posts_db_operations;
use crate::models::{Category, GenerationSource, NewPost, PostStatus};
use crate::DbPool;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::json;

/// Accepts tags as a JSON list or a comma-separated string.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    Ok(Option::<StringOrVec>::deserialize(deserializer)?.map(|tags| match tags {
        StringOrVec::String(s) => split_tag_string(&s),
        StringOrVec::Vec(v) => v.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(),
    }))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    title: String,
    content: String,
    excerpt: Option<String>,
    #[serde(default)]
    category: Category,
    author: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Option<Vec<String>>,
    featured_image: Option<String>,
    #[serde(default)]
    submit_for_approval: bool,
}

impl CreatePostRequest {
    fn into_new_post(self, fallback_author: &str) -> (NewPost, bool) {
        let author = self.author.filter(|a| !a.trim().is_empty()).unwrap_or_else(|| fallback_author.to_string());
        let new_post = NewPost {
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            category: self.category,
            author,
            tags: self.tags.unwrap_or_default(),
            featured_image: self.featured_image.filter(|f| !f.trim().is_empty()),
            generated_by: "human".to_string(),
            generation_source: GenerationSource::Manual,
        };
        (new_post, self.submit_for_approval)
    }
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    title: Option<String>,
    content: Option<String>,
    excerpt: Option<String>,
    category: Option<Category>,
    author: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Option<Vec<String>>,
    featured_image: Option<String>,
    status: Option<PostStatus>,
    #[serde(default)]
    force_status: bool,
}

impl From<UpdatePostRequest> for PostUpdate {
    fn from(req: UpdatePostRequest) -> Self {
        PostUpdate {
            title: req.title,
            content: req.content,
            excerpt: req.excerpt,
            category: req.category,
            author: req.author,
            tags: req.tags,
            featured_image: req.featured_image,
            status: req.status,
            force_status: req.force_status,
        }
    }
}

#[derive(Deserialize)]
pub struct AdminPostQuery {
    status: Option<PostStatus>,
    limit: Option<u32>,
    offset: Option<u32>,
}

/// Post management, mounted under `/api/blog`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts/create-and-submit", web::post().to(create_and_submit))
        .route("/posts/{id}/submit-for-approval", web::post().to(submit_for_approval))
        .route("/admin/posts", web::get().to(list_posts))
        .route("/admin/posts", web::post().to(create_post))
        .route("/admin/posts/{id}", web::get().to(get_post))
        .route("/admin/posts/{id}", web::put().to(update_post))
        .route("/admin/posts/{id}", web::delete().to(delete_post));
}

async fn create_and_submit(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let (new_post, _) = body.into_inner().into_new_post(&user.username);
    let mut conn = pool.get()?;
    let post = workflow_helpers::create_post(&mut conn, new_post, true, Some(user.user_id), Utc::now())?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "post": post })))
}

async fn submit_for_approval(
    user: AuthenticatedUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let mut conn = pool.get()?;
    let post = workflow_helpers::submit_for_approval(&mut conn, id.into_inner(), Some(user.user_id), Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn list_posts(
    _admin: AdminUser,
    pool: web::Data<DbPool>,
    query: web::Query<AdminPostQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let limit = public_helpers::page_limit(query.limit);
    let offset = query.offset.unwrap_or(0);
    let posts = posts_db_operations::read_posts_paginated(&conn, query.status, limit, offset)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "posts": posts, "limit": limit, "offset": offset })))
}

async fn create_post(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    body: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let (new_post, submit) = body.into_inner().into_new_post(&admin.username);
    let mut conn = pool.get()?;
    let post = workflow_helpers::create_post(&mut conn, new_post, submit, Some(admin.user_id), Utc::now())?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "post": post })))
}

async fn get_post(_admin: AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let id = id.into_inner();
    match posts_db_operations::read_post(&conn, id)? {
        Some(post) => Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post }))),
        None => Err(ApiError::NotFound(format!("Blog post {} not found", id))),
    }
}

async fn update_post(
    AdminUser(admin): AdminUser,
    pool: web::Data<DbPool>,
    id: web::Path<i64>,
    body: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut conn = pool.get()?;
    let post =
        workflow_helpers::update_post(&mut conn, id.into_inner(), body.into_inner().into(), &admin.username, Utc::now())?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "post": post })))
}

async fn delete_post(AdminUser(admin): AdminUser, pool: web::Data<DbPool>, id: web::Path<i64>) -> Result<HttpResponse, ApiError> {
    let mut conn = pool.get()?;
    let id = id.into_inner();
    workflow_helpers::delete_post(&mut conn, id)?;
    log::info!("Blog post {} deleted by '{}'", id, admin.username);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
