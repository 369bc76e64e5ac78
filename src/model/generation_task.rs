//! The `GenerationTask`: one text-generation request derived from one bot task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LifecycleStatus;

/// One request/response cycle with the text-generation backend.
///
/// Created by the bot-task poller; mutated and terminated solely by the
/// generation poller. At most one live generation task references a given
/// bot task at a time (the parent records the link in `generation_task_id`
/// the moment this row is created).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// The avatar whose voice the prompt encodes.
    pub avatar_id: String,
    /// The fully composed prompt (persona + kind-specific instructions).
    pub prompt: String,
    /// The bot task this generation was derived from.
    pub bot_task_id: Option<Uuid>,
    /// Coarse claim-control status.
    pub status: LifecycleStatus,
    /// Priority inherited from the originating bot task.
    pub priority: i32,
    /// The generated text, set on success.
    pub response: Option<String>,
    /// Terminal failure description, if any.
    pub error_message: Option<String>,
    /// When this task was created.
    pub created_at: DateTime<Utc>,
    /// When this task was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl GenerationTask {
    /// Creates a new claimable generation task.
    pub fn new(
        avatar_id: impl Into<String>,
        prompt: impl Into<String>,
        bot_task_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            avatar_id: avatar_id.into(),
            prompt: prompt.into(),
            bot_task_id,
            status: LifecycleStatus::Pending,
            priority: 0,
            response: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Terminal success: records the generated text.
    pub fn mark_completed(&mut self, response: impl Into<String>) {
        self.response = Some(response.into());
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

    #[test]
    fn test_new_generation_task_is_pending() {
        let parent = Uuid::new_v4();
        let task = GenerationTask::new("bot-1", "say something", Some(parent));

        assert_eq!(task.status, LifecycleStatus::Pending);
        assert_eq!(task.bot_task_id, Some(parent));
        assert!(task.response.is_none());
    }

    #[test]
    fn test_mark_completed_records_response() {
        let mut task = GenerationTask::new("bot-1", "say something", None);
        task.mark_completed("hello world");

        assert_eq!(task.status, LifecycleStatus::Completed);
        assert_eq!(task.response.as_deref(), Some("hello world"));
        assert!(task.error_message.is_none());
    }

    #[test]
    fn test_mark_failed_records_error() {
        let mut task = GenerationTask::new("bot-1", "say something", None);
        task.mark_failed("GenerationError: API error (500): upstream down");

        assert_eq!(task.status, LifecycleStatus::Failed);
        assert!(task.response.is_none());
        assert!(task
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("GenerationError")));
    }
}
