use super::queue::RedbJobQueue;
use super::tasks::{self, TaskContext};
use super::QueueError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pulls jobs off the queue and runs them one at a time.
#[derive(Clone)]
pub struct JobWorker {
    queue: Arc<RedbJobQueue>,
    ctx: TaskContext,
    poll_interval: Duration,
}

impl JobWorker {
    pub fn new(queue: Arc<RedbJobQueue>, ctx: TaskContext, poll_interval: Duration) -> Self {
        Self { queue, ctx, poll_interval }
    }

    /// Runs at most one job. Returns its id, or `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<Uuid>, QueueError> {
        let job = match self.queue.claim_next()? {
            Some(job) => job,
            None => return Ok(None),
        };

        log::info!("Running job {} ({}), attempt {}", job.id, job.task, job.attempts);
        match tasks::run_task(&self.ctx, &job).await {
            Ok(result) => {
                self.queue.finish(job.id, result)?;
                log::info!("Job {} finished", job.id);
            }
            Err(e) => {
                log::error!("Job {} ({}) failed: {}", job.id, job.task, e);
                self.queue.fail(job.id, e.to_string())?;
            }
        }
        Ok(Some(job.id))
    }

    /// Loops forever on the current runtime, sleeping while the queue is empty.
    pub async fn run(self) {
        loop {
            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => log::error!("Job worker error: {}", e),
            }
            actix_web::rt::time::sleep(self.poll_interval).await;
        }
    }

    pub fn spawn(self, workers: usize) {
        for n in 0..workers.max(1) {
            log::info!("Starting job worker {}", n);
            actix_web::rt::spawn(self.clone().run());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::scheduler_helpers::{self, RunMode, SchedulerOutcome};
    use crate::jobs::{JobQueue, JobStatus};
    use crate::models::db_operations::{posts_db_operations, topics_db_operations};
    use crate::models::{GenerationSource, PostStatus, TopicPriority, TopicStatus};
    use crate::test_support::{new_topic, now_micros, temp_pool, temp_queue, ScriptedGenerator};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn worker_with(
        responses: Vec<Result<String, crate::llm::GenerationError>>,
    ) -> (Vec<tempfile::TempDir>, JobWorker, Arc<RedbJobQueue>, crate::DbPool) {
        let (pool_dir, pool) = temp_pool();
        let (queue_dir, queue) = temp_queue();
        let queue = Arc::new(queue);
        let ctx = TaskContext { pool: pool.clone(), generator: Arc::new(ScriptedGenerator::new(responses)) };
        let worker = JobWorker::new(queue.clone(), ctx, Duration::from_millis(10));
        (vec![pool_dir, queue_dir], worker, queue, pool)
    }

    #[actix_web::test]
    async fn topic_flows_through_scheduler_and_worker_to_pending_post() {
        let response = json!({
            "title": "Withholding rent legally",
            "excerpt": "When tenants may withhold rent.",
            "content": "## Withholding rent\n\nBody",
            "suggested_tags": ["rent", "repairs"]
        });
        let (_dirs, worker, queue, pool) = worker_with(vec![Ok(response.to_string())]);

        let topic_id = {
            let conn = pool.get().unwrap();
            topics_db_operations::insert_topic(&conn, &new_topic("Rent withholding", TopicPriority::High), now_micros())
                .unwrap()
        };

        let outcome = {
            let mut conn = pool.get().unwrap();
            scheduler_helpers::check_and_generate(&mut conn, queue.as_ref(), "TenantGuard Editorial", RunMode::Scheduled, now_micros())
                .unwrap()
        };
        let job_id = match outcome {
            SchedulerOutcome::Enqueued { job_id, .. } => job_id,
            other => panic!("expected enqueue, got {:?}", other),
        };

        assert_eq!(worker.run_once().await.unwrap(), Some(job_id));
        let job = queue.get_status(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Finished);

        let conn = pool.get().unwrap();
        let topic = topics_db_operations::read_topic(&conn, topic_id).unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Completed);
        let post_id = topic.blog_post_id.unwrap();
        let post = posts_db_operations::read_post(&conn, post_id).unwrap().unwrap();
        assert_eq!(post.status, PostStatus::PendingApproval);
        assert_eq!(post.title, "Withholding rent legally");
        assert_eq!(post.author, "TenantGuard Editorial");
        assert_eq!(post.generation_source, GenerationSource::TopicSuggestion);
        assert_eq!(post.generated_by, "scripted");
        assert_eq!(post.tags, vec!["rent".to_string(), "repairs".to_string()]);
        assert!(post.submitted_for_approval_at.is_some());

        assert_eq!(worker.run_once().await.unwrap(), None);
    }

    #[actix_web::test]
    async fn malformed_response_fails_job_without_creating_post() {
        let (_dirs, worker, queue, pool) = worker_with(vec![Ok("I cannot help with that.".to_string())]);

        let topic_id = {
            let conn = pool.get().unwrap();
            topics_db_operations::insert_topic(&conn, &new_topic("Deposits", TopicPriority::Normal), now_micros())
                .unwrap()
        };
        let job_id = {
            let mut conn = pool.get().unwrap();
            scheduler_helpers::enqueue_topic_generation(
                &mut conn,
                queue.as_ref(),
                topic_id,
                "TenantGuard Editorial",
                GenerationSource::TopicSuggestion,
                None,
            )
            .unwrap()
        };

        worker.run_once().await.unwrap();
        let job = queue.get_status(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("parse"));

        let conn = pool.get().unwrap();
        let posts: i64 = conn.query_row("SELECT COUNT(*) FROM blog_posts", [], |r| r.get(0)).unwrap();
        assert_eq!(posts, 0);
        let topic = topics_db_operations::read_topic(&conn, topic_id).unwrap().unwrap();
        assert_eq!(topic.status, TopicStatus::Pending);
        assert_eq!(topic.blog_post_id, None);
    }

    #[actix_web::test]
    async fn revision_updates_content_and_slug() {
        let response = json!({ "title": "Sharper title", "content": "Revised body" });
        let (_dirs, worker, queue, pool) = worker_with(vec![Ok(response.to_string())]);

        let post = {
            let mut conn = pool.get().unwrap();
            crate::helper::workflow_helpers::create_post(
                &mut conn,
                crate::test_support::draft_post("Dull title"),
                false,
                None,
                now_micros(),
            )
            .unwrap()
        };
        let args = json!({ "post_id": post.id, "revision_request": "Punchier", "provider_index": null });
        let job_id = queue.enqueue(crate::jobs::TaskName::ReviseBlogPost, args, Some(&crate::jobs::post_key(post.id))).unwrap();

        worker.run_once().await.unwrap();
        assert_eq!(queue.get_status(job_id).unwrap().unwrap().status, JobStatus::Finished);

        let conn = pool.get().unwrap();
        let revised = posts_db_operations::read_post(&conn, post.id).unwrap().unwrap();
        assert_eq!(revised.title, "Sharper title");
        assert_eq!(revised.slug, "sharper-title");
        assert_eq!(revised.content, "Revised body");
        assert_eq!(revised.status, PostStatus::Draft);
    }
}
