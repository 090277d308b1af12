//! Guarded post workflow operations. Each public function runs in its own
//! SQLite transaction and only changes status through `post_state`.

use crate::helper::generation_helpers::{GeneratedContent, RevisedContent};
use crate::helper::sanitization_helpers::{strip_all_html, unique_slug};
use crate::models::db_operations::{posts_db_operations, schedule_db_operations, topics_db_operations, DbError};
use crate::models::post_state::{PublishOutcome, TransitionError};
use crate::models::{BlogPost, Category, GenerationSource, NewPost, PostStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Blog post {0} not found")]
    PostNotFound(i64),
    #[error("Blog topic {0} not found")]
    TopicNotFound(i64),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Validation(String),
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        WorkflowError::Db(DbError::Rusqlite(e))
    }
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>, WorkflowError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn load_post(conn: &Connection, id: i64) -> Result<BlogPost, WorkflowError> {
    posts_db_operations::read_post(conn, id)?.ok_or(WorkflowError::PostNotFound(id))
}

fn clean_title(title: &str) -> Result<String, WorkflowError> {
    let title = strip_all_html(title).trim().to_string();
    if title.is_empty() {
        return Err(WorkflowError::Validation("Title is required".to_string()));
    }
    Ok(title)
}

fn require_content(content: &str) -> Result<(), WorkflowError> {
    if content.trim().is_empty() {
        return Err(WorkflowError::Validation("Content is required".to_string()));
    }
    Ok(())
}

fn insert_new_post(
    tx: &Transaction<'_>,
    mut new_post: NewPost,
    submit_for_approval: bool,
    submitted_by_user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    new_post.title = clean_title(&new_post.title)?;
    require_content(&new_post.content)?;
    let excerpt = new_post.excerpt.as_deref().map(strip_all_html).unwrap_or_default();
    let slug = unique_slug(tx, &new_post.title, None)?;
    let status = if submit_for_approval { PostStatus::PendingApproval } else { PostStatus::Draft };
    let submitter = if submit_for_approval { submitted_by_user_id } else { None };

    let id = posts_db_operations::insert_post(tx, &new_post, &slug, &excerpt, status, submitter, now)?;
    load_post(tx, id)
}

/// Creates a post as a draft, or straight into the approval queue.
pub fn create_post(
    conn: &mut Connection,
    new_post: NewPost,
    submit_for_approval: bool,
    submitted_by_user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let post = insert_new_post(&tx, new_post, submit_for_approval, submitted_by_user_id, now)?;
    tx.commit()?;
    log::info!("Created blog post {} '{}' with status {}", post.id, post.slug, post.status);
    Ok(post)
}

/// Options a generation job carries into post creation.
#[derive(Debug, Clone)]
pub struct GeneratedPostOptions {
    pub category: Category,
    pub author: String,
    pub generation_source: GenerationSource,
    pub submit_for_approval: bool,
    pub submitted_by_user_id: Option<i64>,
    pub topic_id: Option<i64>,
}

/// Inserts a generated post and, when it came from a topic, completes that
/// topic in the same transaction.
pub fn create_generated_post(
    conn: &mut Connection,
    generated: &GeneratedContent,
    options: &GeneratedPostOptions,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    if let Some(topic_id) = options.topic_id {
        if topics_db_operations::read_topic(&tx, topic_id)?.is_none() {
            return Err(WorkflowError::TopicNotFound(topic_id));
        }
    }

    let new_post = NewPost {
        title: generated.title.clone(),
        content: generated.content.clone(),
        excerpt: Some(generated.excerpt.clone()),
        category: options.category,
        author: options.author.clone(),
        tags: generated.tags.clone(),
        featured_image: None,
        generated_by: generated.generated_by.clone(),
        generation_source: options.generation_source,
    };
    let post = insert_new_post(&tx, new_post, options.submit_for_approval, options.submitted_by_user_id, now)?;

    if let Some(topic_id) = options.topic_id {
        topics_db_operations::mark_completed(&tx, topic_id, post.id, now)?;
    }
    tx.commit()?;
    log::info!(
        "Generated blog post {} '{}' ({}) with status {}",
        post.id,
        post.slug,
        post.generation_source,
        post.status
    );
    Ok(post)
}

pub fn submit_for_approval(
    conn: &mut Connection,
    id: i64,
    user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;
    post.submit_for_approval(user_id, now)?;
    posts_db_operations::save_post(&tx, &post)?;
    tx.commit()?;
    log::info!("Blog post {} submitted for approval", id);
    Ok(post)
}

fn after_publish(tx: &Transaction<'_>, post: &BlogPost, outcome: PublishOutcome, now: DateTime<Utc>) -> Result<(), WorkflowError> {
    if outcome == PublishOutcome::Published {
        if let Some(published_at) = post.published_at {
            schedule_db_operations::record_publication(tx, published_at, now)?;
        }
        log::info!("Blog post {} '{}' published", post.id, post.slug);
    }
    Ok(())
}

pub fn approve(
    conn: &mut Connection,
    id: i64,
    admin_id: i64,
    notes: Option<&str>,
    publish_immediately: bool,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;
    let outcome = post.approve(admin_id, notes, publish_immediately, now)?;
    posts_db_operations::save_post(&tx, &post)?;
    if let Some(outcome) = outcome {
        after_publish(&tx, &post, outcome, now)?;
    }
    tx.commit()?;
    log::info!("Blog post {} approved by user {}", id, admin_id);
    Ok(post)
}

pub fn reject(
    conn: &mut Connection,
    id: i64,
    admin_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;
    post.reject(admin_id, reason, now)?;
    posts_db_operations::save_post(&tx, &post)?;
    tx.commit()?;
    log::info!("Blog post {} rejected by user {}", id, admin_id);
    Ok(post)
}

pub fn publish(conn: &mut Connection, id: i64, now: DateTime<Utc>) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;
    let outcome = post.publish(now)?;
    if outcome == PublishOutcome::Published {
        posts_db_operations::save_post(&tx, &post)?;
    }
    after_publish(&tx, &post, outcome, now)?;
    tx.commit()?;
    Ok(post)
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct BulkApproveResult {
    pub approved_count: usize,
    pub approved_ids: Vec<i64>,
    pub errors: Vec<String>,
}

/// Approves each id independently; one failure never stops the batch.
pub fn bulk_approve(
    conn: &mut Connection,
    ids: &[i64],
    admin_id: i64,
    notes: Option<&str>,
    publish_immediately: bool,
    now: DateTime<Utc>,
) -> BulkApproveResult {
    let mut result = BulkApproveResult::default();
    for &id in ids {
        match approve(conn, id, admin_id, notes, publish_immediately, now) {
            Ok(_) => result.approved_ids.push(id),
            Err(e) => result.errors.push(format!("Post {}: {}", id, e)),
        }
    }
    result.approved_count = result.approved_ids.len();
    result
}

/// Field changes accepted by the generic update path. `status` is only
/// honoured together with `force_status`.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<Category>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub status: Option<PostStatus>,
    pub force_status: bool,
}

pub fn update_post(
    conn: &mut Connection,
    id: i64,
    update: PostUpdate,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    if update.status.is_some() && !update.force_status {
        return Err(WorkflowError::Validation(
            "Status changes go through the approval workflow; set force_status to override".to_string(),
        ));
    }

    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;

    if let Some(title) = update.title {
        let title = clean_title(&title)?;
        if title != post.title {
            post.slug = unique_slug(&tx, &title, Some(id))?;
            post.title = title;
        }
    }
    if let Some(content) = update.content {
        require_content(&content)?;
        post.content = content;
    }
    if let Some(excerpt) = update.excerpt {
        post.excerpt = strip_all_html(&excerpt);
    }
    if let Some(category) = update.category {
        post.category = category;
    }
    if let Some(author) = update.author {
        post.author = author;
    }
    if let Some(tags) = update.tags {
        post.tags = tags;
    }
    if let Some(featured_image) = update.featured_image {
        post.featured_image = Some(featured_image).filter(|f| !f.trim().is_empty());
    }

    let mut first_publication = false;
    if let Some(status) = update.status {
        if status != post.status {
            log::warn!(
                "Forced status change on blog post {} from {} to {} by {}",
                id,
                post.status,
                status,
                actor
            );
            post.status = status;
            if status == PostStatus::Published && post.published_at.is_none() {
                post.published_at = Some(now);
                first_publication = true;
            }
        }
    }

    post.updated_at = now;
    posts_db_operations::save_post(&tx, &post)?;
    if first_publication {
        after_publish(&tx, &post, PublishOutcome::Published, now)?;
    }
    tx.commit()?;
    Ok(post)
}

/// Applies a provider revision. A changed title regenerates the slug.
pub fn apply_revision(
    conn: &mut Connection,
    id: i64,
    revised: &RevisedContent,
    now: DateTime<Utc>,
) -> Result<BlogPost, WorkflowError> {
    let tx = begin(conn)?;
    let mut post = load_post(&tx, id)?;

    if let Some(title) = revised.title.as_deref() {
        let title = clean_title(title)?;
        if title != post.title {
            post.slug = unique_slug(&tx, &title, Some(id))?;
            post.title = title;
        }
    }
    require_content(&revised.content)?;
    post.content = revised.content.clone();
    if let Some(excerpt) = revised.excerpt.as_deref() {
        post.excerpt = strip_all_html(excerpt);
    }
    post.updated_at = now;

    posts_db_operations::save_post(&tx, &post)?;
    tx.commit()?;
    log::info!("Blog post {} revised", id);
    Ok(post)
}

pub fn delete_post(conn: &mut Connection, id: i64) -> Result<(), WorkflowError> {
    let tx = begin(conn)?;
    if posts_db_operations::delete_post(&tx, id)? == 0 {
        return Err(WorkflowError::PostNotFound(id));
    }
    tx.commit()?;
    log::info!("Blog post {} deleted", id);
    Ok(())
}
