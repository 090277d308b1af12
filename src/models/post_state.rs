//! The blog post state machine.
//!
//! Every workflow change to `BlogPost::status` goes through one of the named
//! methods below, which consult a single transition table. Request handlers
//! never assign the status field themselves; the only other writer is the
//! explicit forced override in `workflow_helpers::update_post`.

use super::{BlogPost, PostStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEvent {
    Submit,
    Approve,
    Reject,
    Publish,
}

impl PostEvent {
    fn verb(&self) -> &'static str {
        match self {
            PostEvent::Submit => "submit for approval",
            PostEvent::Approve => "approve",
            PostEvent::Reject => "reject",
            PostEvent::Publish => "publish",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Cannot {action} a post with status '{from}'")]
    InvalidTransition { from: PostStatus, action: &'static str },
    #[error("Rejection reason is required")]
    MissingReason,
}

/// The transition table. `None` means the event is not allowed from `from`.
pub fn next_status(from: PostStatus, event: PostEvent) -> Option<PostStatus> {
    use PostStatus::*;
    match (from, event) {
        (Draft, PostEvent::Submit) => Some(PendingApproval),
        (PendingApproval, PostEvent::Approve) => Some(Approved),
        (PendingApproval, PostEvent::Reject) => Some(Rejected),
        (Approved, PostEvent::Publish) => Some(Published),
        (Published, PostEvent::Publish) => Some(Published),
        _ => None,
    }
}

fn guard(post: &BlogPost, event: PostEvent) -> Result<PostStatus, TransitionError> {
    next_status(post.status, event).ok_or(TransitionError::InvalidTransition {
        from: post.status,
        action: event.verb(),
    })
}

/// Result of a publish attempt, so callers can tell a first publication from
/// an idempotent repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    AlreadyPublished,
}

impl BlogPost {
    pub fn submit_for_approval(
        &mut self,
        user_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let next = guard(self, PostEvent::Submit)?;
        self.status = next;
        self.submitted_for_approval_at = Some(now);
        if user_id.is_some() {
            self.submitted_by_user_id = user_id;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Approves a pending post and, when asked, publishes it in the same step.
    pub fn approve(
        &mut self,
        admin_id: i64,
        notes: Option<&str>,
        publish_immediately: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishOutcome>, TransitionError> {
        let next = guard(self, PostEvent::Approve)?;
        self.status = next;
        self.approved_by_user_id = Some(admin_id);
        self.approved_at = Some(now);
        if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            self.approval_notes = Some(notes.to_string());
        }
        self.updated_at = now;

        if publish_immediately {
            return self.publish(now).map(Some);
        }
        Ok(None)
    }

    pub fn reject(
        &mut self,
        admin_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TransitionError::MissingReason);
        }
        let next = guard(self, PostEvent::Reject)?;
        self.status = next;
        self.rejected_by_user_id = Some(admin_id);
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<PublishOutcome, TransitionError> {
        let next = guard(self, PostEvent::Publish)?;
        if self.status == PostStatus::Published {
            return Ok(PublishOutcome::AlreadyPublished);
        }
        self.status = next;
        if self.published_at.is_none() {
            self.published_at = Some(now);
        }
        self.updated_at = now;
        Ok(PublishOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, GenerationSource};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn post_with_status(status: PostStatus) -> BlogPost {
        let now = Utc::now();
        BlogPost {
            id: 1,
            title: "Know your rights".to_string(),
            slug: "know-your-rights".to_string(),
            content: "Body".to_string(),
            excerpt: "Excerpt".to_string(),
            category: Category::Technical,
            author: "Staff".to_string(),
            tags: vec![],
            featured_image: None,
            status,
            generated_by: "human".to_string(),
            generation_source: GenerationSource::Manual,
            submitted_for_approval_at: None,
            submitted_by_user_id: None,
            approved_by_user_id: None,
            approved_at: None,
            rejected_by_user_id: None,
            rejected_at: None,
            rejection_reason: None,
            approval_notes: None,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    #[test]
    fn submit_only_allowed_from_draft() {
        for status in PostStatus::ALL {
            let mut post = post_with_status(*status);
            let before = post.clone();
            let result = post.submit_for_approval(Some(7), Utc::now());
            if *status == PostStatus::Draft {
                assert!(result.is_ok());
                assert_eq!(post.status, PostStatus::PendingApproval);
                assert_eq!(post.submitted_by_user_id, Some(7));
                assert!(post.submitted_for_approval_at.is_some());
            } else {
                assert!(result.is_err(), "submit should fail from {status}");
                assert_eq!(post, before);
            }
        }
    }

    #[test]
    fn approve_with_publish_sets_published_at_once() {
        let mut post = post_with_status(PostStatus::PendingApproval);
        let first = Utc::now() - Duration::days(2);
        let outcome = post.approve(3, Some("looks good"), true, first).unwrap();

        assert_eq!(outcome, Some(PublishOutcome::Published));
        assert_eq!(post.status, PostStatus::Published);
        assert_eq!(post.published_at, Some(first));
        assert_eq!(post.approval_notes.as_deref(), Some("looks good"));

        let again = post.publish(Utc::now()).unwrap();
        assert_eq!(again, PublishOutcome::AlreadyPublished);
        assert_eq!(post.published_at, Some(first));
    }

    #[test]
    fn approve_without_publish_stops_at_approved() {
        let mut post = post_with_status(PostStatus::PendingApproval);
        let outcome = post.approve(3, None, false, Utc::now()).unwrap();
        assert_eq!(outcome, None);
        assert_eq!(post.status, PostStatus::Approved);
        assert!(post.published_at.is_none());
    }

    #[test]
    fn republish_keeps_sticky_published_at() {
        let mut post = post_with_status(PostStatus::Approved);
        let original = Utc::now() - Duration::days(30);
        post.published_at = Some(original);
        post.publish(Utc::now()).unwrap();
        assert_eq!(post.published_at, Some(original));
    }

    #[test]
    fn reject_requires_reason() {
        let mut post = post_with_status(PostStatus::PendingApproval);
        assert_eq!(post.reject(1, "   ", Utc::now()), Err(TransitionError::MissingReason));
        assert_eq!(post.status, PostStatus::PendingApproval);

        post.reject(1, "Needs sources", Utc::now()).unwrap();
        assert_eq!(post.status, PostStatus::Rejected);
        assert_eq!(post.rejection_reason.as_deref(), Some("Needs sources"));
        assert!(post.rejected_at.is_some());
    }

    #[test]
    fn published_post_cannot_be_rejected() {
        let mut post = post_with_status(PostStatus::Published);
        let err = post.reject(1, "too late", Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition { from: PostStatus::Published, action: "reject" }
        );
    }

    #[test]
    fn publish_requires_approval() {
        for status in [PostStatus::Draft, PostStatus::PendingApproval, PostStatus::Rejected] {
            let mut post = post_with_status(status);
            assert!(post.publish(Utc::now()).is_err());
            assert!(post.published_at.is_none());
        }
    }
}
