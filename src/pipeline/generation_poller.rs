//! Generation stage: runs claimed generation tasks against the backend and
//! schedules publication.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use tracing::{debug, error, info, warn};

use crate::error::{GenerationError, RepoError, TaskError};
use crate::llm::GenerationClient;
use crate::model::{BotTask, GenerationTask, LifecycleStatus, PublishTask};
use crate::repo::{BotTaskRepo, GenerationTaskRepo, PublishTaskRepo};

use super::{PollSummary, StagePoller};

/// Claims pending generation tasks, calls the text-generation backend, and on
/// success enqueues a publish task deferred by the configured delay.
///
/// One poll claims at most `min(available_slots, batch_cap)` tasks; the batch
/// cap bounds backend fan-out independently of slot accounting. A failed
/// backend call is terminal for both the generation task and its parent bot
/// task, and no publish task is created.
pub struct GenerationPoller {
    generation_tasks: Arc<dyn GenerationTaskRepo>,
    publish_tasks: Arc<dyn PublishTaskRepo>,
    bot_tasks: Arc<dyn BotTaskRepo>,
    client: Arc<dyn GenerationClient>,
    generation_timeout: Duration,
    publish_delay: Duration,
    batch_cap: usize,
}

impl GenerationPoller {
    /// Creates a new poller over the given queues, backend client, and
    /// timing settings.
    pub fn new(
        generation_tasks: Arc<dyn GenerationTaskRepo>,
        publish_tasks: Arc<dyn PublishTaskRepo>,
        bot_tasks: Arc<dyn BotTaskRepo>,
        client: Arc<dyn GenerationClient>,
        generation_timeout: Duration,
        publish_delay: Duration,
        batch_cap: usize,
    ) -> Self {
        Self {
            generation_tasks,
            publish_tasks,
            bot_tasks,
            client,
            generation_timeout,
            publish_delay,
            batch_cap,
        }
    }

    /// Loads the parent bot task for bookkeeping. A missing parent is not
    /// fatal: the generation task still runs, it just has nowhere to report.
    async fn load_parent(&self, task: &GenerationTask) -> Option<BotTask> {
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

    async fn run_one(&self, mut task: GenerationTask) -> bool {
        let mut parent = self.load_parent(&task).await;

        if let Some(ref mut parent) = parent {
            parent.mark_generating();
            self.store_parent(parent).await;
        }

        let outcome = match tokio::time::timeout(
            self.generation_timeout,
            self.client.generate(&task.prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.generation_timeout)),
        };

        match outcome {
            Ok(text) => self.complete(task, parent, text).await,
            Err(e) => {
                let err = TaskError::Generation(e);
                warn!(task_id = %task.id, avatar_id = %task.avatar_id, error = %err, "Generation failed");
                self.fail(&mut task, parent.as_mut(), &err).await;
                false
            }
        }
    }

    /// Records the response, schedules publication, and links the parent.
    async fn complete(
        &self,
        mut task: GenerationTask,
        mut parent: Option<BotTask>,
        text: String,
    ) -> bool {
        task.mark_completed(text.clone());
        if let Err(e) = self.generation_tasks.update(&task).await {
            error!(task_id = %task.id, error = %e, "Failed to record generation result");
            let err = TaskError::Unexpected(e.to_string());
            self.fail(&mut task, parent.as_mut(), &err).await;
            return false;
        }

        let delay = chrono::Duration::milliseconds(self.publish_delay.as_millis() as i64);
        let scheduled_at = Utc::now() + delay;
        let mut publish = PublishTask::new(&task.avatar_id, text, scheduled_at, task.bot_task_id);
        if let Some(target) = parent.as_ref().and_then(|p| p.reply_target()) {
            publish = publish.with_reply_target(target);
        }
        let publish_id = publish.id;

        // The parent row must record the child link before the child becomes
        // claimable: the publish stage runs on its own timer and, with a
        // short delay, may claim the child and finish the parent the instant
        // it is enqueued. Writing the parent afterwards would clobber that
        // terminal state with this stale copy.
        if let Some(ref mut parent) = parent {
            parent.begin_publish(publish_id);
            self.store_parent(parent).await;
        }

        if let Err(e) = self.publish_tasks.enqueue(publish).await {
            error!(task_id = %task.id, error = %e, "Failed to enqueue publish task");
            let err = TaskError::Unexpected(e.to_string());
            self.fail(&mut task, parent.as_mut(), &err).await;
            return false;
        }

        info!(
            task_id = %task.id,
            avatar_id = %task.avatar_id,
            publish_task_id = %publish_id,
            scheduled_at = %scheduled_at,
            "Generation completed, publication scheduled"
        );
        true
    }

    /// Terminal failure: recorded on the generation task and propagated to
    /// the parent bot task. Nothing is retried.
    async fn fail(&self, task: &mut GenerationTask, parent: Option<&mut BotTask>, err: &TaskError) {
        let message = err.to_string();
        task.mark_failed(&message);
        if let Err(update_err) = self.generation_tasks.update(task).await {
            error!(task_id = %task.id, error = %update_err, "Failed to record generation failure");
        }
        if let Some(parent) = parent {
            parent.mark_failed(&message);
            self.store_parent(parent).await;
        }
    }
}

#[async_trait]
impl StagePoller for GenerationPoller {
    fn stage_name(&self) -> &'static str {
        "generation"
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        self.generation_tasks.claimed_count().await
    }

    async fn poll(&self, available_slots: usize) -> PollSummary {
        let mut summary = PollSummary::default();
        let limit = available_slots.min(self.batch_cap);
        if limit == 0 {
            return summary;
        }

        let candidates = match self.generation_tasks.claimable(limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to list claimable generation tasks");
                return summary;
            }
        };

        let mut claimed = Vec::new();
        for task in candidates {
            match self.generation_tasks.try_claim(task.id).await {
                Ok(true) => {
                    let mut task = task;
                    task.status = LifecycleStatus::Claimed;
                    claimed.push(task);
                }
                Ok(false) => {}
                Err(e) => error!(task_id = %task.id, error = %e, "Failed to claim generation task"),
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
