use super::{JobQueue, JobRecord, JobStatus, QueueError, TaskName};
use crate::setup::db_setup;
use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const JOBS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("jobs");
/// Queued jobs keyed by (created_at micros, id) so iteration is oldest first.
pub const QUEUED_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("queued_index");
/// Entity key (e.g. `topic:7`) -> lease JSON.
pub const LEASES: TableDefinition<&str, &str> = TableDefinition::new("leases");

#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    job_id: Uuid,
    expires_at: DateTime<Utc>,
}

pub struct RedbJobQueue {
    db: Database,
    lease_ttl: Duration,
}

fn read_job(table: &impl ReadableTable<&'static [u8; 16], &'static str>, id: &Uuid) -> Result<Option<JobRecord>, QueueError> {
    match table.get(id.as_bytes())? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

fn write_job(table: &mut Table<'_, '_, &'static [u8; 16], &'static str>, job: &JobRecord) -> Result<(), QueueError> {
    let json = serde_json::to_string(job)?;
    table.insert(job.id.as_bytes(), json.as_str())?;
    Ok(())
}

fn queue_position(job: &JobRecord) -> i64 {
    job.created_at.timestamp_micros()
}

impl RedbJobQueue {
    /// Opens (or creates) the queue file and makes sure its tables exist.
    pub fn open(path: impl AsRef<Path>, lease_ttl: Duration) -> Result<Self, QueueError> {
        let db = Database::create(path)?;
        db_setup::setup_jobs_db(&db)?;
        Ok(Self { db, lease_ttl })
    }

    fn enqueue_at(
        &self,
        task: TaskName,
        args: serde_json::Value,
        dedup_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, QueueError> {
        let job = JobRecord {
            id: Uuid::new_v4(),
            task,
            args,
            status: JobStatus::Queued,
            dedup_key: dedup_key.map(str::to_string),
            attempts: 0,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        };

        // The lease check and the insert share one write transaction, so two
        // triggers for the same key cannot both pass the check.
        let write_txn = self.db.begin_write()?;
        {
            let mut jobs = write_txn.open_table(JOBS)?;
            let mut queued = write_txn.open_table(QUEUED_INDEX)?;
            let mut leases = write_txn.open_table(LEASES)?;

            if let Some(key) = dedup_key {
                let existing: Option<Lease> = match leases.get(key)? {
                    Some(guard) => Some(serde_json::from_str(guard.value())?),
                    None => None,
                };
                if let Some(lease) = existing {
                    let holder = read_job(&jobs, &lease.job_id)?;
                    let held = match holder {
                        Some(holder) => holder.status.is_active(),
                        None => lease.expires_at > now,
                    };
                    if held {
                        return Err(QueueError::Conflict { key: key.to_string(), job_id: lease.job_id });
                    }
                }
                let lease = Lease { job_id: job.id, expires_at: now + self.lease_ttl };
                let lease_json = serde_json::to_string(&lease)?;
                leases.insert(key, lease_json.as_str())?;
            }

            write_job(&mut jobs, &job)?;
            queued.insert((queue_position(&job), job.id.as_bytes()), ())?;
        }
        write_txn.commit()?;

        log::info!("Enqueued job {} ({})", job.id, job.task);
        Ok(job.id)
    }

    /// Moves the oldest queued job to `running` and returns it.
    pub fn claim_next(&self) -> Result<Option<JobRecord>, QueueError> {
        let write_txn = self.db.begin_write()?;
        let claimed = {
            let mut jobs = write_txn.open_table(JOBS)?;
            let mut queued = write_txn.open_table(QUEUED_INDEX)?;

            let next = match queued.iter()?.next() {
                Some(entry) => {
                    let (key, _) = entry?;
                    let (position, id) = key.value();
                    Some((position, *id))
                }
                None => None,
            };

            match next {
                None => None,
                Some((position, id_bytes)) => {
                    queued.remove((position, &id_bytes))?;
                    let id = Uuid::from_bytes(id_bytes);
                    match read_job(&jobs, &id)? {
                        Some(mut job) => {
                            job.status = JobStatus::Running;
                            job.attempts += 1;
                            job.started_at = Some(Utc::now());
                            write_job(&mut jobs, &job)?;
                            Some(job)
                        }
                        None => {
                            log::warn!("Queued index referenced missing job {}", id);
                            None
                        }
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(claimed)
    }

    fn complete(&self, id: Uuid, outcome: Result<serde_json::Value, String>) -> Result<JobRecord, QueueError> {
        let write_txn = self.db.begin_write()?;
        let job = {
            let mut jobs = write_txn.open_table(JOBS)?;
            let mut queued = write_txn.open_table(QUEUED_INDEX)?;
            let mut leases = write_txn.open_table(LEASES)?;
            let mut job = read_job(&jobs, &id)?.ok_or(QueueError::NotFound(id))?;
            if job.status == JobStatus::Queued {
                queued.remove((queue_position(&job), job.id.as_bytes()))?;
            }

            match outcome {
                Ok(result) => {
                    job.status = JobStatus::Finished;
                    job.result = Some(result);
                    job.error = None;
                }
                Err(error) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(error);
                }
            }
            job.finished_at = Some(Utc::now());
            write_job(&mut jobs, &job)?;

            if let Some(key) = job.dedup_key.as_deref() {
                let owned_by_job = match leases.get(key)? {
                    Some(guard) => serde_json::from_str::<Lease>(guard.value())?.job_id == id,
                    None => false,
                };
                if owned_by_job {
                    leases.remove(key)?;
                }
            }
            job
        };
        write_txn.commit()?;
        Ok(job)
    }

    pub fn finish(&self, id: Uuid, result: serde_json::Value) -> Result<JobRecord, QueueError> {
        self.complete(id, Ok(result))
    }

    pub fn fail(&self, id: Uuid, error: String) -> Result<JobRecord, QueueError> {
        self.complete(id, Err(error))
    }

    /// Puts jobs left `running` by a previous process back in the queue.
    pub fn requeue_stale(&self) -> Result<usize, QueueError> {
        let write_txn = self.db.begin_write()?;
        let count = {
            let mut jobs = write_txn.open_table(JOBS)?;
            let mut queued = write_txn.open_table(QUEUED_INDEX)?;

            let mut stale = Vec::new();
            for entry in jobs.iter()? {
                let (_, value) = entry?;
                let job: JobRecord = serde_json::from_str(value.value())?;
                if job.status == JobStatus::Running {
                    stale.push(job);
                }
            }

            for job in stale.iter_mut() {
                job.status = JobStatus::Queued;
                job.started_at = None;
                write_job(&mut jobs, job)?;
                queued.insert((queue_position(job), job.id.as_bytes()), ())?;
                log::warn!("Re-queued job {} ({}) left running by a previous run", job.id, job.task);
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(count)
    }

    /// Most recently created jobs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<JobRecord>, QueueError> {
        let read_txn = self.db.begin_read()?;
        let jobs = read_txn.open_table(JOBS)?;
        let mut records = Vec::new();
        for entry in jobs.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_str::<JobRecord>(value.value())?);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

impl JobQueue for RedbJobQueue {
    fn enqueue(&self, task: TaskName, args: serde_json::Value, dedup_key: Option<&str>) -> Result<Uuid, QueueError> {
        self.enqueue_at(task, args, dedup_key, Utc::now())
    }

    fn get_status(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        let read_txn = self.db.begin_read()?;
        let jobs = read_txn.open_table(JOBS)?;
        read_job(&jobs, &job_id)
    }

    fn cancel(&self, job_id: Uuid, reason: String) -> Result<(), QueueError> {
        let job = self.complete(job_id, Err(reason))?;
        log::warn!("Cancelled job {} ({})", job.id, job.task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::topic_key;
    use crate::test_support::temp_queue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn duplicate_enqueue_conflicts_until_job_completes() {
        let (_dir, queue) = temp_queue();
        let key = topic_key(7);
        let first = queue.enqueue(TaskName::GenerateBlogPost, json!({"topic_id": 7}), Some(&key)).unwrap();

        match queue.enqueue(TaskName::GenerateBlogPost, json!({"topic_id": 7}), Some(&key)) {
            Err(QueueError::Conflict { job_id, .. }) => assert_eq!(job_id, first),
            other => panic!("expected conflict, got {:?}", other),
        }

        let other_topic = queue.enqueue(TaskName::GenerateBlogPost, json!({"topic_id": 8}), Some(&topic_key(8)));
        assert!(other_topic.is_ok());

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert!(matches!(
            queue.enqueue(TaskName::GenerateBlogPost, json!({}), Some(&key)),
            Err(QueueError::Conflict { .. })
        ));

        queue.fail(first, "provider down".to_string()).unwrap();
        assert!(queue.enqueue(TaskName::GenerateBlogPost, json!({}), Some(&key)).is_ok());
    }

    #[test]
    fn claims_oldest_first_and_records_outcome() {
        let (_dir, queue) = temp_queue();
        let now = Utc::now();
        let older = queue.enqueue_at(TaskName::ReviseBlogPost, json!({"n": 1}), None, now).unwrap();
        let newer = queue
            .enqueue_at(TaskName::ReviseBlogPost, json!({"n": 2}), None, now + Duration::seconds(1))
            .unwrap();

        let job = queue.claim_next().unwrap().unwrap();
        assert_eq!(job.id, older);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);

        queue.finish(older, json!({"post_id": 3})).unwrap();
        let status = queue.get_status(older).unwrap().unwrap();
        assert_eq!(status.status, JobStatus::Finished);
        assert_eq!(status.result, Some(json!({"post_id": 3})));

        assert_eq!(queue.claim_next().unwrap().unwrap().id, newer);
        assert!(queue.claim_next().unwrap().is_none());

        let recent = queue.recent(10).unwrap();
        assert_eq!(recent.iter().map(|j| j.id).collect::<Vec<_>>(), vec![newer, older]);
    }

    #[test]
    fn running_jobs_are_requeued() {
        let (_dir, queue) = temp_queue();
        let id = queue.enqueue(TaskName::GenerateBlogPost, json!({}), None).unwrap();
        queue.claim_next().unwrap();

        assert_eq!(queue.requeue_stale().unwrap(), 1);
        let job = queue.claim_next().unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn cancelled_job_is_never_claimed_and_frees_its_key() {
        let (_dir, queue) = temp_queue();
        let key = topic_key(3);
        let id = queue.enqueue(TaskName::GenerateBlogPost, json!({"topic_id": 3}), Some(&key)).unwrap();

        queue.cancel(id, "topic update rolled back".to_string()).unwrap();
        let job = queue.get_status(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("topic update rolled back"));

        assert!(queue.claim_next().unwrap().is_none());
        assert!(queue.enqueue(TaskName::GenerateBlogPost, json!({"topic_id": 3}), Some(&key)).is_ok());
    }

    #[test]
    fn unknown_job_has_no_status() {
        let (_dir, queue) = temp_queue();
        assert_eq!(queue.get_status(Uuid::new_v4()).unwrap(), None);
    }
}
