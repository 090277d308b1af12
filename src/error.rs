use crate::helper::admin_helpers::AdminHelperError;
use crate::helper::scheduler_helpers::SchedulerError;
use crate::helper::topic_helpers::TopicError;
use crate::helper::workflow_helpers::WorkflowError;
use crate::jobs::QueueError;
use crate::models::db_operations::DbError;
use crate::models::post_state::TransitionError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Error returned by every JSON handler.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Internal(detail) => {
                log::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "success": false, "error": message }))
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        ApiError::Internal(format!("Database pool error: {}", e))
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::MissingReason | TransitionError::InvalidTransition { .. } => {
                ApiError::Validation(e.to_string())
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Db(db) => db.into(),
            WorkflowError::PostNotFound(_) | WorkflowError::TopicNotFound(_) => ApiError::NotFound(e.to_string()),
            WorkflowError::Transition(t) => t.into(),
            WorkflowError::Validation(msg) => ApiError::Validation(msg),
        }
    }
}

impl From<TopicError> for ApiError {
    fn from(e: TopicError) -> Self {
        match e {
            TopicError::Db(db) => db.into(),
            TopicError::NotFound(_) => ApiError::NotFound(e.to_string()),
            TopicError::Validation(msg) => ApiError::Validation(msg),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            QueueError::NotFound(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Db(db) => db.into(),
            SchedulerError::Queue(q) => q.into(),
            SchedulerError::TopicNotFound(_) => ApiError::NotFound(e.to_string()),
            SchedulerError::TopicNotPending { .. } => ApiError::Conflict(e.to_string()),
            SchedulerError::Validation(msg) => ApiError::Validation(msg),
            SchedulerError::SerdeJson(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AdminHelperError> for ApiError {
    fn from(e: AdminHelperError) -> Self {
        match e {
            AdminHelperError::NotFound => ApiError::NotFound(e.to_string()),
            AdminHelperError::UsernameTaken(_) => ApiError::Conflict(e.to_string()),
            AdminHelperError::Validation(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostStatus;

    #[test]
    fn workflow_errors_map_to_taxonomy() {
        let invalid = WorkflowError::Transition(TransitionError::InvalidTransition {
            from: PostStatus::Published,
            action: "reject",
        });
        assert_eq!(ApiError::from(invalid).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(WorkflowError::Transition(TransitionError::MissingReason)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(WorkflowError::PostNotFound(4)).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(TopicError::NotFound(4)).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(TopicError::Validation("bad link".to_string())).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejecting_a_draft_is_a_bad_request() {
        let mut conn = crate::test_support::memory_conn();
        let admin = crate::models::db_operations::users_db_operations::create_user(
            &conn,
            "admin",
            None,
            "admin-pass",
            crate::models::UserRole::Admin,
        )
        .unwrap();
        let now = crate::test_support::now_micros();
        let draft = crate::helper::workflow_helpers::create_post(
            &mut conn,
            crate::test_support::draft_post("Not yet submitted"),
            false,
            None,
            now,
        )
        .unwrap();

        let err = crate::helper::workflow_helpers::reject(&mut conn, draft.id, admin, "Off topic", now).unwrap_err();
        assert_eq!(ApiError::from(err).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_job_is_conflict() {
        let err = QueueError::Conflict { key: "topic:1".to_string(), job_id: uuid::Uuid::nil() };
        assert_eq!(ApiError::from(SchedulerError::Queue(err)).status_code(), StatusCode::CONFLICT);
    }
}
