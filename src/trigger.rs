//! Trigger surface: the only place bot tasks enter the pipeline.
//!
//! Two entry points mirror the two task kinds: a schedule firing for an
//! avatar enqueues an original-post task, and a fresh post by anyone fans
//! out one reply task per bot-enabled follower of the author.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{BotTask, TaskKind};
use crate::repo::BotTaskRepo;
use crate::social::{FollowerLookup, SocialError};

/// Errors that can occur while triggering bot tasks.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Follower discovery failed.
    #[error("follower lookup failed: {0}")]
    FollowerLookup(#[from] SocialError),

    /// The task queue rejected the new row.
    #[error("failed to enqueue bot task: {0}")]
    Enqueue(#[from] RepoError),
}

/// Enqueues bot tasks in response to external events.
pub struct TriggerService {
    bot_tasks: Arc<dyn BotTaskRepo>,
    followers: Arc<dyn FollowerLookup>,
}

impl TriggerService {
    /// Creates a new trigger service.
    pub fn new(bot_tasks: Arc<dyn BotTaskRepo>, followers: Arc<dyn FollowerLookup>) -> Self {
        Self {
            bot_tasks,
            followers,
        }
    }

    /// An avatar's posting schedule fired: enqueue one original-post task.
    ///
    /// Returns the id of the enqueued task.
    pub async fn original_post_due(&self, avatar_id: &str) -> Result<Uuid, TriggerError> {
        let task = BotTask::new(avatar_id, TaskKind::Original);
        let task_id = task.id;
        self.bot_tasks.enqueue(task).await?;
        info!(avatar_id = %avatar_id, task_id = %task_id, "Original post task enqueued");
        Ok(task_id)
    }

    /// A post was published: enqueue one reply task per bot-enabled follower
    /// of the author.
    ///
    /// Enqueue failures are isolated per follower; the fan-out continues and
    /// the count of successfully enqueued tasks is returned. Only follower
    /// discovery failure aborts the fan-out.
    pub async fn post_published(
        &self,
        author_avatar_id: &str,
        post_id: Uuid,
    ) -> Result<usize, TriggerError> {
        let followers = self.followers.bot_followers(author_avatar_id).await?;

        let mut created = 0;
        for follower in followers {
            let task = BotTask::new(
                &follower,
                TaskKind::Reply {
                    target_post_id: post_id,
                },
            );
            let task_id = task.id;
            match self.bot_tasks.enqueue(task).await {
                Ok(()) => {
                    info!(
                        avatar_id = %follower,
                        task_id = %task_id,
                        target_post_id = %post_id,
                        "Reply task enqueued"
                    );
                    created += 1;
                }
                Err(e) => {
                    error!(avatar_id = %follower, target_post_id = %post_id, error = %e, "Failed to enqueue reply task");
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LifecycleStatus, TaskStage};
    use crate::repo::MemoryBotTaskRepo;
    use crate::social::MemoryDirectory;

    fn service() -> (Arc<MemoryBotTaskRepo>, Arc<MemoryDirectory>, TriggerService) {
        let bot_tasks = Arc::new(MemoryBotTaskRepo::new());
        let directory = Arc::new(MemoryDirectory::new());
        let service = TriggerService::new(bot_tasks.clone(), directory.clone());
        (bot_tasks, directory, service)
    }

    #[tokio::test]
    async fn test_original_post_due_enqueues_pending_created_task() {
        let (bot_tasks, _, service) = service();

        let task_id = service.original_post_due("bot-1").await.unwrap();

        let task = bot_tasks.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.avatar_id, "bot-1");
        assert_eq!(task.kind, TaskKind::Original);
        assert_eq!(task.status, LifecycleStatus::Pending);
        assert_eq!(task.stage, TaskStage::Created);
    }

    #[tokio::test]
    async fn test_post_published_fans_out_to_bot_followers() {
        let (bot_tasks, directory, service) = service();
        directory.add_bot_follower("alice", "bot-1").await;
        directory.add_bot_follower("alice", "bot-2").await;
        let post_id = Uuid::new_v4();

        let created = service.post_published("alice", post_id).await.unwrap();
        assert_eq!(created, 2);

        let tasks = bot_tasks.all().await;
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            assert_eq!(task.kind, TaskKind::Reply { target_post_id: post_id });
            assert_eq!(task.stage, TaskStage::Created);
        }
        let mut avatars: Vec<_> = tasks.iter().map(|t| t.avatar_id.clone()).collect();
        avatars.sort();
        assert_eq!(avatars, vec!["bot-1", "bot-2"]);
    }

    #[tokio::test]
    async fn test_post_published_with_no_bot_followers_is_a_no_op() {
        let (bot_tasks, _, service) = service();

        let created = service
            .post_published("nobody-follows-me", Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(created, 0);
        assert!(bot_tasks.all().await.is_empty());
    }
}
