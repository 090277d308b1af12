use crate::helper::workflow_helpers::WorkflowError;
use crate::models::db_operations::{posts_db_operations, DbError};
use crate::models::{BlogPost, PostStatus};
use serde::Serialize;

const RECENT_ACTIVITY_LIMIT: u32 = 5;

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusCounts {
    pub draft: i64,
    pub pending_approval: i64,
    pub approved: i64,
    pub rejected: i64,
    pub published: i64,
}

#[derive(Debug, Serialize)]
pub struct ApprovalStatistics {
    pub counts: StatusCounts,
    pub oldest_pending: Option<BlogPost>,
    pub recent_approvals: Vec<BlogPost>,
    pub recent_rejections: Vec<BlogPost>,
}

pub fn list_pending(conn: &rusqlite::Connection) -> Result<Vec<BlogPost>, DbError> {
    posts_db_operations::read_pending_oldest_first(conn)
}

/// Returns the post only while it is awaiting approval.
pub fn get_pending(conn: &rusqlite::Connection, id: i64) -> Result<BlogPost, WorkflowError> {
    let post = posts_db_operations::read_post(conn, id)?.ok_or(WorkflowError::PostNotFound(id))?;
    if post.status != PostStatus::PendingApproval {
        return Err(WorkflowError::Validation(format!(
            "Post {} is not pending approval (status '{}')",
            id, post.status
        )));
    }
    Ok(post)
}

pub fn statistics(conn: &rusqlite::Connection) -> Result<ApprovalStatistics, DbError> {
    let count = |status| posts_db_operations::count_by_status(conn, status);
    let counts = StatusCounts {
        draft: count(PostStatus::Draft)?,
        pending_approval: count(PostStatus::PendingApproval)?,
        approved: count(PostStatus::Approved)?,
        rejected: count(PostStatus::Rejected)?,
        published: count(PostStatus::Published)?,
    };

    Ok(ApprovalStatistics {
        counts,
        oldest_pending: posts_db_operations::read_pending_oldest_first(conn)?.into_iter().next(),
        recent_approvals: posts_db_operations::read_recent_approvals(conn, RECENT_ACTIVITY_LIMIT)?,
        recent_rejections: posts_db_operations::read_recent_rejections(conn, RECENT_ACTIVITY_LIMIT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::workflow_helpers;
    use crate::models::db_operations::users_db_operations;
    use crate::models::UserRole;
    use crate::test_support::{draft_post, memory_conn, now_micros};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn pending_queue_is_oldest_first_and_stats_add_up() {
        let mut conn = memory_conn();
        let admin = users_db_operations::create_user(&conn, "admin", None, "admin-pass", UserRole::Admin).unwrap();
        let now = now_micros();

        let newer = workflow_helpers::create_post(&mut conn, draft_post("Newer"), true, None, now).unwrap();
        let older =
            workflow_helpers::create_post(&mut conn, draft_post("Older"), true, None, now - Duration::hours(3)).unwrap();
        let to_reject = workflow_helpers::create_post(&mut conn, draft_post("Reject me"), true, None, now).unwrap();
        let to_approve = workflow_helpers::create_post(&mut conn, draft_post("Approve me"), true, None, now).unwrap();
        workflow_helpers::create_post(&mut conn, draft_post("Still a draft"), false, None, now).unwrap();

        workflow_helpers::reject(&mut conn, to_reject.id, admin, "Off topic", now).unwrap();
        workflow_helpers::approve(&mut conn, to_approve.id, admin, None, true, now).unwrap();

        let pending: Vec<i64> = list_pending(&conn).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(pending, vec![older.id, newer.id]);

        assert_eq!(get_pending(&conn, older.id).unwrap().id, older.id);
        assert!(matches!(get_pending(&conn, to_reject.id), Err(WorkflowError::Validation(_))));
        assert!(matches!(get_pending(&conn, 9999), Err(WorkflowError::PostNotFound(9999))));

        let stats = statistics(&conn).unwrap();
        assert_eq!(
            stats.counts,
            StatusCounts { draft: 1, pending_approval: 2, approved: 0, rejected: 1, published: 1 }
        );
        assert_eq!(stats.oldest_pending.map(|p| p.id), Some(older.id));
        assert_eq!(stats.recent_approvals.iter().map(|p| p.id).collect::<Vec<_>>(), vec![to_approve.id]);
        assert_eq!(stats.recent_rejections.iter().map(|p| p.id).collect::<Vec<_>>(), vec![to_reject.id]);
    }
}
