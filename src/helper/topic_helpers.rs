use crate::helper::sanitization_helpers::strip_all_html;
use crate::models::db_operations::{topics_db_operations, DbError};
use crate::models::{BlogTopic, Category, NewTopic, TopicPriority, TopicStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopicError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Blog topic {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Validation(String),
}

/// Partial topic edit; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TopicUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub research_links: Option<Vec<String>>,
    pub research_notes: Option<String>,
    pub priority: Option<TopicPriority>,
    pub status: Option<TopicStatus>,
}

fn clean_topic_title(title: &str) -> Result<String, TopicError> {
    let title = strip_all_html(title).trim().to_string();
    if title.is_empty() {
        return Err(TopicError::Validation("Topic title is required".to_string()));
    }
    Ok(title)
}

/// Trims research links and requires each to be an absolute http(s) URL.
pub fn clean_links(links: Vec<String>) -> Result<Vec<String>, TopicError> {
    let mut cleaned = Vec::with_capacity(links.len());
    for link in links.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        match url::Url::parse(link) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => cleaned.push(link.to_string()),
            _ => return Err(TopicError::Validation(format!("Invalid research link '{}'", link))),
        }
    }
    Ok(cleaned)
}

pub fn create_topic(conn: &Connection, mut topic: NewTopic, now: DateTime<Utc>) -> Result<BlogTopic, TopicError> {
    topic.title = clean_topic_title(&topic.title)?;
    topic.research_links = clean_links(topic.research_links)?;
    let id = topics_db_operations::insert_topic(conn, &topic, now)?;
    log::info!("Created blog topic {} '{}' ({} priority)", id, topic.title, topic.priority);
    topics_db_operations::read_topic(conn, id)?.ok_or(TopicError::NotFound(id))
}

/// Marking a topic completed stamps `completed_at` once.
pub fn update_topic(
    conn: &Connection,
    id: i64,
    update: TopicUpdate,
    now: DateTime<Utc>,
) -> Result<BlogTopic, TopicError> {
    let mut topic = topics_db_operations::read_topic(conn, id)?.ok_or(TopicError::NotFound(id))?;

    if let Some(title) = update.title {
        topic.title = clean_topic_title(&title)?;
    }
    if let Some(description) = update.description {
        topic.description = description;
    }
    if let Some(category) = update.category {
        topic.category = category;
    }
    if let Some(links) = update.research_links {
        topic.research_links = clean_links(links)?;
    }
    if let Some(notes) = update.research_notes {
        topic.research_notes = notes;
    }
    if let Some(priority) = update.priority {
        topic.priority = priority;
    }
    if let Some(status) = update.status {
        if status == TopicStatus::Completed && topic.completed_at.is_none() {
            topic.completed_at = Some(now);
        }
        topic.status = status;
    }

    topics_db_operations::save_topic(conn, &topic)?;
    Ok(topic)
}

pub fn delete_topic(conn: &Connection, id: i64) -> Result<(), TopicError> {
    match topics_db_operations::delete_topic(conn, id)? {
        0 => Err(TopicError::NotFound(id)),
        _ => {
            log::info!("Deleted blog topic {}", id);
            Ok(())
        }
    }
}
