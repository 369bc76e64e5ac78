//! The `PublishTask`: one scheduled publication derived from one bot task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LifecycleStatus;

/// One scheduled, not-yet-materialized post awaiting its publish time.
///
/// Created by the generation poller with a deferred `scheduled_at` (a fixed
/// delay after generation, to avoid bursty publication); mutated and
/// terminated solely by the publish poller once the task becomes due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTask {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// The avatar that will author the post.
    pub avatar_id: String,
    /// The generated post body.
    pub content: String,
    /// The task becomes due once `scheduled_at <= now`.
    pub scheduled_at: DateTime<Utc>,
    /// Target post if the originating bot task was a reply.
    pub reply_target_post_id: Option<Uuid>,
    /// The bot task this publication was derived from.
    pub bot_task_id: Option<Uuid>,
    /// Coarse claim-control status.
    pub status: LifecycleStatus,
    /// The persisted post, set on success.
    pub result_post_id: Option<Uuid>,
    /// Terminal failure description, if any.
    pub error_message: Option<String>,
    /// When this task was created.
    pub created_at: DateTime<Utc>,
    /// When this task was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl PublishTask {
    /// Creates a new claimable publish task scheduled at `scheduled_at`.
    pub fn new(
        avatar_id: impl Into<String>,
        content: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        bot_task_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            avatar_id: avatar_id.into(),
            content: content.into(),
            scheduled_at,
            reply_target_post_id: None,
            bot_task_id,
            status: LifecycleStatus::Pending,
            result_post_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the reply target.
    pub fn with_reply_target(mut self, target_post_id: Uuid) -> Self {
        self.reply_target_post_id = Some(target_post_id);
        self
    }

    /// Whether this task is eligible for claiming at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }

    /// Terminal success: records the persisted post id.
    pub fn mark_completed(&mut self, post_id: Uuid) {
        self.result_post_id = Some(post_id);
        self.status = LifecycleStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Terminal failure. Never retried.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.status = LifecycleStatus::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_due_once_scheduled_time_passes() {
        let now = Utc::now();
        let task = PublishTask::new("bot-1", "hello", now + Duration::minutes(5), None);

        assert!(!task.is_due(now));
        assert!(task.is_due(now + Duration::minutes(5)));
        assert!(task.is_due(now + Duration::minutes(6)));
    }

    #[test]
    fn test_reply_target_builder() {
        let target = Uuid::new_v4();
        let task =
            PublishTask::new("bot-1", "hello", Utc::now(), None).with_reply_target(target);

        assert_eq!(task.reply_target_post_id, Some(target));
    }

    #[test]
    fn test_mark_completed_records_post_id() {
        let mut task = PublishTask::new("bot-1", "hello", Utc::now(), None);
        let post_id = Uuid::new_v4();
        task.mark_completed(post_id);

        assert_eq!(task.status, LifecycleStatus::Completed);
        assert_eq!(task.result_post_id, Some(post_id));
    }

    #[test]
    fn test_mark_failed_records_error() {
        let mut task = PublishTask::new("bot-1", "hello", Utc::now(), None);
        task.mark_failed("PublishError: reply target was deleted");

        assert_eq!(task.status, LifecycleStatus::Failed);
        assert!(task.result_post_id.is_none());
        assert!(task
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("PublishError")));
    }
}
