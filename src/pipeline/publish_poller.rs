//! Publish stage: persists due publish tasks as posts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use tracing::{debug, error, info, warn};

use crate::error::{RepoError, TaskError};
use crate::model::{BotTask, LifecycleStatus, PublishTask};
use crate::repo::{BotTaskRepo, PublishTaskRepo};
use crate::social::{NewPost, PostCreate};

use super::{PollSummary, StagePoller};

/// Claims due publish tasks and persists their content through the post
/// store, closing out the originating bot task on success.
///
/// Only tasks whose `scheduled_at` has passed are claimable; a task scheduled
/// in the future is invisible to this poller until its time comes. Post
/// creation failure is terminal for the task and its parent.
pub struct PublishPoller {
    publish_tasks: Arc<dyn PublishTaskRepo>,
    bot_tasks: Arc<dyn BotTaskRepo>,
    posts: Arc<dyn PostCreate>,
}

impl PublishPoller {
    /// Creates a new poller over the given queue, parent queue, and post
    /// store.
    pub fn new(
        publish_tasks: Arc<dyn PublishTaskRepo>,
        bot_tasks: Arc<dyn BotTaskRepo>,
        posts: Arc<dyn PostCreate>,
    ) -> Self {
        Self {
            publish_tasks,
            bot_tasks,
            posts,
        }
    }

    async fn load_parent(&self, task: &PublishTask) -> Option<BotTask> {
        let parent_id = task.bot_task_id?;
        match self.bot_tasks.get(parent_id).await {
            Ok(Some(parent)) => Some(parent),
            Ok(None) => {
                debug!(
                    task_id = %task.id,
                    bot_task_id = %parent_id,
                    "Parent bot task not found, proceeding without bookkeeping"
                );
                None
            }
            Err(e) => {
                warn!(task_id = %task.id, bot_task_id = %parent_id, error = %e, "Failed to load parent bot task");
                None
            }
        }
    }

    async fn store_parent(&self, parent: &BotTask) {
        if let Err(e) = self.bot_tasks.update(parent).await {
            error!(bot_task_id = %parent.id, error = %e, "Failed to update parent bot task");
        }
    }

    async fn run_one(&self, mut task: PublishTask) -> bool {
        let mut parent = self.load_parent(&task).await;

        if let Some(ref mut parent) = parent {
            parent.mark_publishing();
            self.store_parent(parent).await;
        }

        let created = self
            .posts
            .create_post(NewPost {
                content: task.content.clone(),
                author_avatar_id: task.avatar_id.clone(),
                reply_target_post_id: task.reply_target_post_id,
            })
            .await;

        match created {
            Ok(created) => {
                task.mark_completed(created.id);
                if let Err(e) = self.publish_tasks.update(&task).await {
                    error!(task_id = %task.id, error = %e, "Failed to record publish result");
                }
                if let Some(ref mut parent) = parent {
                    parent.mark_published(created.id);
                    self.store_parent(parent).await;
                }
                info!(
                    task_id = %task.id,
                    avatar_id = %task.avatar_id,
                    post_id = %created.id,
                    "Post published"
                );
                true
            }
            Err(e) => {
                let err = TaskError::Publish(e.to_string());
                warn!(task_id = %task.id, avatar_id = %task.avatar_id, error = %err, "Publish failed");
                let message = err.to_string();
                task.mark_failed(&message);
                if let Err(update_err) = self.publish_tasks.update(&task).await {
                    error!(task_id = %task.id, error = %update_err, "Failed to record publish failure");
                }
                if let Some(ref mut parent) = parent {
                    parent.mark_failed(&message);
                    self.store_parent(parent).await;
                }
                false
            }
        }
    }
}

#[async_trait]
impl StagePoller for PublishPoller {
    fn stage_name(&self) -> &'static str {
        "publish"
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        self.publish_tasks.claimed_count().await
    }

    async fn poll(&self, available_slots: usize) -> PollSummary {
        let mut summary = PollSummary::default();
        if available_slots == 0 {
            return summary;
        }

        let candidates = match self.publish_tasks.claimable(available_slots, Utc::now()).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to list claimable publish tasks");
                return summary;
            }
        };

        let mut claimed = Vec::new();
        for task in candidates {
            match self.publish_tasks.try_claim(task.id).await {
                Ok(true) => {
                    let mut task = task;
                    task.status = LifecycleStatus::Claimed;
                    claimed.push(task);
                }
                Ok(false) => {}
                Err(e) => error!(task_id = %task.id, error = %e, "Failed to claim publish task"),
            }
        }

        summary.claimed = claimed.len();
        let results = future::join_all(claimed.into_iter().map(|task| self.run_one(task))).await;
        for advanced in results {
            if advanced {
                summary.advanced += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}
