use crate::jobs::tasks::GeneratePostArgs;
use crate::jobs::{topic_key, JobQueue, QueueError, TaskName};
use crate::models::db_operations::{
    posts_db_operations, schedule_db_operations, topics_db_operations, DbError,
};
use crate::models::{BlogSchedule, BlogTopic, Category, GenerationSource, NewTopic, PostStatus, TopicPriority, TopicStatus};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Blog topic {0} not found")]
    TopicNotFound(i64),
    #[error("Blog topic {id} is {status}, only pending topics can be generated")]
    TopicNotPending { id: i64, status: TopicStatus },
    #[error("{0}")]
    Validation(String),
}

impl From<rusqlite::Error> for SchedulerError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulerError::Db(DbError::Rusqlite(e))
    }
}

/// Urgent first, then high, normal, low; ties by age, then id.
pub fn sort_topics_by_priority(topics: &mut [BlogTopic]) {
    topics.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleCheck {
    pub should_post: bool,
    pub reason: String,
    pub days_since_last_post: Option<i64>,
    pub max_days_between_posts: i64,
    pub last_post_date: Option<DateTime<Utc>>,
    pub auto_posting_enabled: bool,
}

/// Whole days since the latest published post, rounded down.
pub fn days_since_last_post(conn: &Connection, now: DateTime<Utc>) -> Result<Option<(i64, DateTime<Utc>)>, DbError> {
    let latest = posts_db_operations::read_latest_published(conn)?;
    Ok(latest.and_then(|post| post.published_at).map(|at| ((now - at).num_days(), at)))
}

pub fn check_schedule(conn: &Connection, now: DateTime<Utc>) -> Result<ScheduleCheck, DbError> {
    let schedule = schedule_db_operations::get_or_create_schedule(conn, now)?;
    let max_days = schedule.max_days_between_posts;
    let since = days_since_last_post(conn, now)?;

    let (should_post, reason) = match (schedule.auto_posting_enabled, since) {
        (false, _) => (false, "Auto-posting is disabled".to_string()),
        (true, None) => (true, "No published posts yet".to_string()),
        (true, Some((days, _))) if days >= max_days => {
            (true, format!("Last post was {} days ago (max: {})", days, max_days))
        }
        (true, Some((days, _))) => (false, format!("Last post was {} days ago (max: {})", days, max_days)),
    };

    Ok(ScheduleCheck {
        should_post,
        reason,
        days_since_last_post: since.map(|(days, _)| days),
        max_days_between_posts: max_days,
        last_post_date: since.map(|(_, at)| at),
        auto_posting_enabled: schedule.auto_posting_enabled,
    })
}

/// Admin edit of the schedule singleton. Changing the interval moves
/// `next_auto_post_date` relative to the last post.
pub fn update_schedule(
    conn: &Connection,
    auto_posting_enabled: Option<bool>,
    max_days_between_posts: Option<i64>,
    now: DateTime<Utc>,
) -> Result<BlogSchedule, SchedulerError> {
    let mut schedule = schedule_db_operations::get_or_create_schedule(conn, now)?;
    if let Some(enabled) = auto_posting_enabled {
        schedule.auto_posting_enabled = enabled;
    }
    if let Some(days) = max_days_between_posts {
        if !(1..=365).contains(&days) {
            return Err(SchedulerError::Validation(
                "max_days_between_posts must be between 1 and 365".to_string(),
            ));
        }
        schedule.max_days_between_posts = days;
        schedule.next_auto_post_date = schedule.last_post_date.map(|last| last + chrono::Duration::days(days));
    }
    schedule.updated_at = now;
    schedule_db_operations::save_schedule(conn, &schedule)?;
    log::info!(
        "Blog schedule updated: auto_posting_enabled={}, max_days_between_posts={}",
        schedule.auto_posting_enabled,
        schedule.max_days_between_posts
    );
    Ok(schedule)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Respect the posting interval.
    Scheduled,
    /// Generate from the top topic even when no post is due.
    Forced,
}

impl RunMode {
    /// Forced runs are admin or operator invoked and tag their posts as major updates.
    pub fn generation_source(&self) -> GenerationSource {
        match self {
            RunMode::Scheduled => GenerationSource::TopicSuggestion,
            RunMode::Forced => GenerationSource::MajorUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchedulerOutcome {
    Disabled,
    NotDue { reason: String },
    NoPendingTopics { reason: String, suggested_category: Category },
    Enqueued { topic_id: i64, topic_title: String, job_id: Uuid, reason: String },
}

/// Enqueues generation for one pending topic. The topic is marked
/// `in_progress` in a transaction that only commits if the enqueue passes
/// the queue's dedup lease.
pub fn enqueue_topic_generation(
    conn: &mut Connection,
    queue: &dyn JobQueue,
    topic_id: i64,
    author: &str,
    generation_source: GenerationSource,
    submitted_by_user_id: Option<i64>,
) -> Result<Uuid, SchedulerError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let topic = topics_db_operations::read_topic(&tx, topic_id)?.ok_or(SchedulerError::TopicNotFound(topic_id))?;
    if !topics_db_operations::mark_in_progress(&tx, topic_id)? {
        return Err(SchedulerError::TopicNotPending { id: topic_id, status: topic.status });
    }

    let args = GeneratePostArgs {
        topic: topic.title.clone(),
        category: topic.category,
        author: author.to_string(),
        links: topic.research_links.clone(),
        research_notes: topic.research_notes.clone(),
        extra_context: topic.description.clone(),
        provider_index: None,
        generation_source,
        submit_for_approval: true,
        submitted_by_user_id,
        topic_id: Some(topic_id),
    };
    let job_id = queue.enqueue(TaskName::GenerateBlogPost, serde_json::to_value(&args)?, Some(&topic_key(topic_id)))?;
    // The job is already committed in the queue store; withdraw it if the topic update cannot follow.
    if let Err(e) = tx.commit() {
        log::error!("Topic {} could not be marked in progress, cancelling job {}: {}", topic_id, job_id, e);
        if let Err(cancel_err) = queue.cancel(job_id, format!("Topic {} was not marked in progress: {}", topic_id, e)) {
            log::error!("Failed to cancel job {}: {}", job_id, cancel_err);
        }
        return Err(e.into());
    }

    log::info!("Queued generation job {} for topic {} '{}'", job_id, topic_id, topic.title);
    Ok(job_id)
}

/// Category with fewer published posts, used when there is nothing queued.
fn underserved_category(conn: &Connection) -> Result<Category, DbError> {
    let technical = posts_db_operations::count_published(conn, Some(Category::Technical))?;
    let research = posts_db_operations::count_published(conn, Some(Category::MarketResearch))?;
    Ok(if technical <= research { Category::Technical } else { Category::MarketResearch })
}

/// One scheduler pass: decides whether a post is due and, if so, queues the
/// highest priority pending topic.
pub fn check_and_generate(
    conn: &mut Connection,
    queue: &dyn JobQueue,
    system_author: &str,
    mode: RunMode,
    now: DateTime<Utc>,
) -> Result<SchedulerOutcome, SchedulerError> {
    let check = check_schedule(conn, now)?;
    if !check.auto_posting_enabled {
        log::info!("Auto-posting is disabled, scheduler pass skipped");
        return Ok(SchedulerOutcome::Disabled);
    }

    let mut pending = topics_db_operations::read_pending_topics(conn)?;
    sort_topics_by_priority(&mut pending);
    let top = pending.first();

    let reason = match (top, mode) {
        (Some(topic), _) if topic.priority.preempts_schedule() => {
            format!("Topic '{}' has {} priority", topic.title, topic.priority)
        }
        (_, RunMode::Forced) => format!("Forced run. {}", check.reason),
        _ if check.should_post => check.reason.clone(),
        _ => {
            log::info!("No post needed: {}", check.reason);
            return Ok(SchedulerOutcome::NotDue { reason: check.reason });
        }
    };

    let topic = match top {
        Some(topic) => topic,
        None => {
            let suggested_category = underserved_category(conn)?;
            log::info!(
                "Post due ({}) but no pending topics; {} has the fewest published posts",
                reason,
                suggested_category
            );
            return Ok(SchedulerOutcome::NoPendingTopics { reason, suggested_category });
        }
    };

    log::info!("Generating post for topic {} '{}': {}", topic.id, topic.title, reason);
    let job_id = enqueue_topic_generation(conn, queue, topic.id, system_author, mode.generation_source(), None)?;
    Ok(SchedulerOutcome::Enqueued { topic_id: topic.id, topic_title: topic.title.clone(), job_id, reason })
}

/// Creates an urgent technical topic and queues it straight away.
pub fn queue_major_update(
    conn: &mut Connection,
    queue: &dyn JobQueue,
    new_topic: NewTopic,
    system_author: &str,
    requested_by_user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(BlogTopic, Uuid), SchedulerError> {
    let new_topic = NewTopic { priority: TopicPriority::Urgent, category: Category::Technical, ..new_topic };
    let topic_id = topics_db_operations::insert_topic(conn, &new_topic, now)?;
    let job_id = enqueue_topic_generation(
        conn,
        queue,
        topic_id,
        system_author,
        GenerationSource::MajorUpdate,
        requested_by_user_id,
    )?;
    let topic = topics_db_operations::read_topic(conn, topic_id)?.ok_or(SchedulerError::TopicNotFound(topic_id))?;
    Ok((topic, job_id))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BlogAnalytics {
    pub published_posts: i64,
    pub draft_posts: i64,
    pub pending_approval_posts: i64,
    pub category_counts: Vec<CategoryCount>,
    pub pending_topics: i64,
    pub in_progress_topics: i64,
    pub days_since_last_post: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CategoryCount {
    pub category: Category,
    pub count: i64,
}

pub fn analytics(conn: &Connection, now: DateTime<Utc>) -> Result<BlogAnalytics, DbError> {
    Ok(BlogAnalytics {
        published_posts: posts_db_operations::count_by_status(conn, PostStatus::Published)?,
        draft_posts: posts_db_operations::count_by_status(conn, PostStatus::Draft)?,
        pending_approval_posts: posts_db_operations::count_by_status(conn, PostStatus::PendingApproval)?,
        category_counts: posts_db_operations::published_category_counts(conn)?
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect(),
        pending_topics: topics_db_operations::count_by_status(conn, TopicStatus::Pending)?,
        in_progress_topics: topics_db_operations::count_by_status(conn, TopicStatus::InProgress)?,
        days_since_last_post: days_since_last_post(conn, now)?.map(|(days, _)| days),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::workflow_helpers;
    use crate::jobs::JobStatus;
    use crate::test_support::{draft_post, memory_conn, new_topic, now_micros, temp_queue};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    const AUTHOR: &str = "TenantGuard Editorial";

    fn publish_at(conn: &mut Connection, title: &str, at: DateTime<Utc>) {
        let post = workflow_helpers::create_post(conn, draft_post(title), true, None, at).unwrap();
        workflow_helpers::approve(conn, post.id, 1, None, true, at).unwrap();
    }

    fn seed_admin(conn: &Connection) {
        crate::models::db_operations::users_db_operations::create_user(
            conn,
            "admin",
            None,
            "admin-pass",
            crate::models::UserRole::Admin,
        )
        .unwrap();
    }

    #[test]
    fn priority_sort_orders_by_rank_then_age() {
        let now = now_micros();
        let mut topics = vec![
            BlogTopic { id: 1, priority: TopicPriority::Low, created_at: now, ..sample_topic() },
            BlogTopic { id: 2, priority: TopicPriority::Urgent, created_at: now, ..sample_topic() },
            BlogTopic { id: 3, priority: TopicPriority::Normal, created_at: now - Duration::days(1), ..sample_topic() },
            BlogTopic { id: 4, priority: TopicPriority::Normal, created_at: now - Duration::days(2), ..sample_topic() },
            BlogTopic { id: 5, priority: TopicPriority::High, created_at: now, ..sample_topic() },
        ];
        sort_topics_by_priority(&mut topics);
        assert_eq!(topics.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 5, 4, 3, 1]);
    }

    fn sample_topic() -> BlogTopic {
        BlogTopic {
            id: 0,
            title: "t".to_string(),
            description: String::new(),
            category: Category::Technical,
            research_links: vec![],
            research_notes: String::new(),
            priority: TopicPriority::Normal,
            status: TopicStatus::Pending,
            created_by: "admin".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            blog_post_id: None,
        }
    }

    #[test]
    fn five_days_is_due_four_is_not() {
        let mut conn = memory_conn();
        seed_admin(&conn);
        let now = now_micros();
        publish_at(&mut conn, "Old news", now - Duration::days(5));

        let check = check_schedule(&conn, now).unwrap();
        assert!(check.should_post);
        assert_eq!(check.days_since_last_post, Some(5));

        publish_at(&mut conn, "Newer news", now - Duration::days(4));
        let check = check_schedule(&conn, now).unwrap();
        assert!(!check.should_post);
        assert_eq!(check.days_since_last_post, Some(4));
    }

    #[test]
    fn no_published_posts_means_due() {
        let conn = memory_conn();
        let check = check_schedule(&conn, now_micros()).unwrap();
        assert!(check.should_post);
        assert_eq!(check.days_since_last_post, None);
    }

    #[test]
    fn disabled_schedule_stops_the_pass() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let now = now_micros();
        let mut schedule = schedule_db_operations::get_or_create_schedule(&conn, now).unwrap();
        schedule.auto_posting_enabled = false;
        schedule_db_operations::save_schedule(&conn, &schedule).unwrap();
        topics_db_operations::insert_topic(&conn, &new_topic("Urgent", TopicPriority::Urgent), now).unwrap();

        let outcome = check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Forced, now).unwrap();
        assert_eq!(outcome, SchedulerOutcome::Disabled);
    }

    #[test]
    fn urgent_topic_preempts_interval_and_normal_topics() {
        let mut conn = memory_conn();
        seed_admin(&conn);
        let (_dir, queue) = temp_queue();
        let now = now_micros();
        publish_at(&mut conn, "Yesterday", now - Duration::days(1));

        let normal = topics_db_operations::insert_topic(&conn, &new_topic("Normal", TopicPriority::Normal), now - Duration::days(3))
            .unwrap();
        let urgent = topics_db_operations::insert_topic(&conn, &new_topic("Urgent", TopicPriority::Urgent), now).unwrap();

        let outcome = check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Scheduled, now).unwrap();
        match outcome {
            SchedulerOutcome::Enqueued { topic_id, job_id, .. } => {
                assert_eq!(topic_id, urgent);
                let job = queue.get_status(job_id).unwrap().unwrap();
                assert_eq!(job.status, JobStatus::Queued);
                let args: GeneratePostArgs = serde_json::from_value(job.args).unwrap();
                assert_eq!(args.topic, "Urgent");
                assert_eq!(args.author, AUTHOR);
                assert!(args.submit_for_approval);
                assert_eq!(args.generation_source, GenerationSource::TopicSuggestion);
            }
            other => panic!("expected enqueue, got {:?}", other),
        }

        let normal_topic = topics_db_operations::read_topic(&conn, normal).unwrap().unwrap();
        assert_eq!(normal_topic.status, TopicStatus::Pending);
        let urgent_topic = topics_db_operations::read_topic(&conn, urgent).unwrap().unwrap();
        assert_eq!(urgent_topic.status, TopicStatus::InProgress);

        // Only the normal topic is left and the last post is one day old.
        let outcome = check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Scheduled, now).unwrap();
        assert!(matches!(outcome, SchedulerOutcome::NotDue { .. }));
    }

    #[test]
    fn due_without_topics_reports_category() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let outcome = check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Scheduled, now_micros()).unwrap();
        assert!(matches!(
            outcome,
            SchedulerOutcome::NoPendingTopics { suggested_category: Category::Technical, .. }
        ));
    }

    #[test]
    fn second_trigger_for_same_topic_conflicts() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let now = now_micros();
        let first = topics_db_operations::insert_topic(&conn, &new_topic("A", TopicPriority::Normal), now).unwrap();
        let second = topics_db_operations::insert_topic(&conn, &new_topic("B", TopicPriority::Normal), now).unwrap();

        enqueue_topic_generation(&mut conn, &queue, first, AUTHOR, GenerationSource::TopicSuggestion, None).unwrap();

        // Force the topic back to pending so the queue lease is what refuses.
        topics_db_operations::revert_to_pending(&conn, first).unwrap();
        let err = enqueue_topic_generation(&mut conn, &queue, first, AUTHOR, GenerationSource::TopicSuggestion, None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Queue(QueueError::Conflict { .. })));
        // The refused trigger rolled back its status change.
        assert_eq!(topics_db_operations::read_topic(&conn, first).unwrap().unwrap().status, TopicStatus::Pending);

        assert!(enqueue_topic_generation(&mut conn, &queue, second, AUTHOR, GenerationSource::TopicSuggestion, None)
            .is_ok());
    }

    #[test]
    fn in_progress_topic_is_refused() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let id = topics_db_operations::insert_topic(&conn, &new_topic("A", TopicPriority::Normal), now_micros()).unwrap();
        enqueue_topic_generation(&mut conn, &queue, id, AUTHOR, GenerationSource::TopicSuggestion, None).unwrap();
        let err = enqueue_topic_generation(&mut conn, &queue, id, AUTHOR, GenerationSource::TopicSuggestion, None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TopicNotPending { status: TopicStatus::InProgress, .. }));
    }

    #[test]
    fn major_update_is_urgent_technical() {
        let mut conn = memory_conn();
        let (_dir, queue) = temp_queue();
        let mut topic = new_topic("New eviction law", TopicPriority::Low);
        topic.category = Category::MarketResearch;
        let (created, job_id) = queue_major_update(&mut conn, &queue, topic, AUTHOR, None, now_micros()).unwrap();

        assert_eq!(created.priority, TopicPriority::Urgent);
        assert_eq!(created.category, Category::Technical);
        assert_eq!(created.status, TopicStatus::InProgress);
        let args: GeneratePostArgs =
            serde_json::from_value(queue.get_status(job_id).unwrap().unwrap().args).unwrap();
        assert_eq!(args.generation_source, GenerationSource::MajorUpdate);
    }

    #[test]
    fn forced_run_tags_job_as_major_update() {
        let mut conn = memory_conn();
        seed_admin(&conn);
        let now = now_micros();
        publish_at(&mut conn, "Yesterday", now - Duration::days(1));
        update_schedule(&conn, None, Some(365), now).unwrap();
        topics_db_operations::insert_topic(&conn, &new_topic("Rent caps", TopicPriority::Normal), now).unwrap();

        let (_dir, queue) = temp_queue();
        let outcome = check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Scheduled, now).unwrap();
        assert!(matches!(outcome, SchedulerOutcome::NotDue { .. }));

        let job_id = match check_and_generate(&mut conn, &queue, AUTHOR, RunMode::Forced, now).unwrap() {
            SchedulerOutcome::Enqueued { job_id, .. } => job_id,
            other => panic!("expected enqueue, got {:?}", other),
        };
        let args: GeneratePostArgs = serde_json::from_value(queue.get_status(job_id).unwrap().unwrap().args).unwrap();
        assert_eq!(args.generation_source, GenerationSource::MajorUpdate);
    }

    #[test]
    fn analytics_counts() {
        let mut conn = memory_conn();
        seed_admin(&conn);
        let now = now_micros();
        publish_at(&mut conn, "Published", now - Duration::days(2));
        workflow_helpers::create_post(&mut conn, draft_post("Draft"), false, None, now).unwrap();
        topics_db_operations::insert_topic(&conn, &new_topic("Pending", TopicPriority::Normal), now).unwrap();

        let stats = analytics(&conn, now).unwrap();
        assert_eq!(stats.published_posts, 1);
        assert_eq!(stats.draft_posts, 1);
        assert_eq!(stats.pending_topics, 1);
        assert_eq!(stats.days_since_last_post, Some(2));
        assert_eq!(stats.category_counts, vec![CategoryCount { category: Category::Technical, count: 1 }]);
    }

    #[test]
    fn changing_interval_moves_next_post_date() {
        let mut conn = memory_conn();
        seed_admin(&conn);
        let now = now_micros();
        publish_at(&mut conn, "Baseline", now - Duration::days(1));

        let schedule = update_schedule(&conn, Some(false), Some(3), now).unwrap();
        assert!(!schedule.auto_posting_enabled);
        assert_eq!(schedule.max_days_between_posts, 3);
        assert_eq!(schedule.next_auto_post_date, Some(now - Duration::days(1) + Duration::days(3)));

        assert!(matches!(update_schedule(&conn, None, Some(0), now), Err(SchedulerError::Validation(_))));
    }
}
