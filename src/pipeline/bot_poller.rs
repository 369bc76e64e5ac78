//! Bot-task stage: turns claimable bot tasks into generation tasks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use tracing::{debug, error, info, warn};

use crate::error::{RepoError, TaskError};
use crate::model::{BotTask, GenerationTask, LifecycleStatus, TaskKind, TaskStage};
use crate::prompts::{compose_original_prompt, compose_reply_prompt};
use crate::repo::{BotTaskRepo, GenerationTaskRepo};
use crate::social::{PersonaLookup, PostLookup};

use super::{PollSummary, StagePoller};

/// Claims pending bot tasks, resolves personas, composes prompts, and
/// enqueues generation tasks.
///
/// Exactly one generation task is created per successfully processed bot
/// task. The bot task's claim status stays `Claimed` afterwards (never back
/// to `Pending`), so the row cannot be reclaimed while its child is in
/// flight.
pub struct BotTaskPoller {
    bot_tasks: Arc<dyn BotTaskRepo>,
    generation_tasks: Arc<dyn GenerationTaskRepo>,
    personas: Arc<dyn PersonaLookup>,
    posts: Arc<dyn PostLookup>,
}

impl BotTaskPoller {
    /// Creates a new poller over the given queues and collaborators.
    pub fn new(
        bot_tasks: Arc<dyn BotTaskRepo>,
        generation_tasks: Arc<dyn GenerationTaskRepo>,
        personas: Arc<dyn PersonaLookup>,
        posts: Arc<dyn PostLookup>,
    ) -> Self {
        Self {
            bot_tasks,
            generation_tasks,
            personas,
            posts,
        }
    }

    /// Processes one claimed task, recording terminal failure on error.
    /// Returns whether the task advanced.
    async fn run_one(&self, mut task: BotTask) -> bool {
        match self.process(&mut task).await {
            Ok(()) => {
                info!(
                    task_id = %task.id,
                    avatar_id = %task.avatar_id,
                    generation_task_id = ?task.generation_task_id,
                    "Bot task advanced to generation"
                );
                true
            }
            Err(e) => {
                warn!(task_id = %task.id, avatar_id = %task.avatar_id, error = %e, "Bot task failed");
                task.mark_failed(e.to_string());
                if let Err(update_err) = self.bot_tasks.update(&task).await {
                    error!(task_id = %task.id, error = %update_err, "Failed to record bot task failure");
                }
                false
            }
        }
    }

    async fn process(&self, task: &mut BotTask) -> Result<(), TaskError> {
        let prompt = self.compose_prompt(task).await?;

        let generation =
            GenerationTask::new(&task.avatar_id, prompt, Some(task.id)).with_priority(task.priority);

        // The parent row must record the child link before the child becomes
        // claimable: the generation stage runs on its own timer and may pick
        // the child up the instant it is enqueued.
        task.begin_generation(generation.id);
        self.bot_tasks.update(task).await?;
        self.generation_tasks.enqueue(generation).await?;
        Ok(())
    }

    /// Combines the avatar's persona with kind-specific instructions.
    async fn compose_prompt(&self, task: &BotTask) -> Result<String, TaskError> {
        let persona = self
            .personas
            .persona_prompt(&task.avatar_id)
            .await?
            .ok_or_else(|| TaskError::ConfigMissing(task.avatar_id.clone()))?;

        match task.kind {
            TaskKind::Original => Ok(compose_original_prompt(&persona)),
            TaskKind::Reply { target_post_id } => {
                let target = self
                    .posts
                    .post_content(target_post_id)
                    .await?
                    .ok_or(TaskError::TargetNotFound(target_post_id))?;
                Ok(compose_reply_prompt(&persona, &target))
            }
        }
    }
}

#[async_trait]
impl StagePoller for BotTaskPoller {
    fn stage_name(&self) -> &'static str {
        "bot_task"
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        self.bot_tasks.claimed_count().await
    }

    async fn poll(&self, available_slots: usize) -> PollSummary {
        let mut summary = PollSummary::default();
        if available_slots == 0 {
            return summary;
        }

        let candidates = match self.bot_tasks.claimable(available_slots).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to list claimable bot tasks");
                return summary;
            }
        };

        let mut claimed = Vec::new();
        for task in candidates {
            // A pending task past the created stage is mid-flight in a
            // downstream stage; it must never be reprocessed here.
            if task.stage != TaskStage::Created {
                debug!(task_id = %task.id, stage = %task.stage, "Skipping bot task past the created stage");
                continue;
            }
            match self.bot_tasks.try_claim(task.id).await {
                Ok(true) => {
                    let mut task = task;
                    task.status = LifecycleStatus::Claimed;
                    claimed.push(task);
                }
                Ok(false) => {} // lost the claim race
                Err(e) => error!(task_id = %task.id, error = %e, "Failed to claim bot task"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryBotTaskRepo, MemoryGenerationTaskRepo};
    use crate::social::{MemoryDirectory, SocialError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Fixture {
        bot_tasks: Arc<MemoryBotTaskRepo>,
        generation_tasks: Arc<MemoryGenerationTaskRepo>,
        directory: Arc<MemoryDirectory>,
        poller: BotTaskPoller,
    }

    fn fixture() -> Fixture {
        let bot_tasks = Arc::new(MemoryBotTaskRepo::new());
        let generation_tasks = Arc::new(MemoryGenerationTaskRepo::new());
        let directory = Arc::new(MemoryDirectory::new());
        let poller = BotTaskPoller::new(
            bot_tasks.clone(),
            generation_tasks.clone(),
            directory.clone(),
            directory.clone(),
        );
        Fixture {
            bot_tasks,
            generation_tasks,
            directory,
            poller,
        }
    }

    #[tokio::test]
    async fn test_original_task_advances_to_awaiting_generation() {
        let fx = fixture();
        fx.directory.set_persona("A", "You are avatar A.").await;

        let task = BotTask::new("A", TaskKind::Original);
        let id = task.id;
        fx.bot_tasks.enqueue(task).await.unwrap();

        let summary = fx.poller.poll(5).await;
        assert_eq!(summary, PollSummary { claimed: 1, advanced: 1, failed: 0 });

        let task = fx.bot_tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.stage, TaskStage::AwaitingGeneration);
        assert_eq!(task.status, LifecycleStatus::Claimed);
        assert!(task.links_consistent());

        let children = fx.generation_tasks.all().await;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].bot_task_id, Some(id));
        assert_eq!(children[0].id, task.generation_task_id.unwrap());
        assert!(children[0].prompt.starts_with("You are avatar A."));
    }

    #[tokio::test]
    async fn test_missing_persona_is_terminal_with_no_child() {
        let fx = fixture();

        let task = BotTask::new("bot-1", TaskKind::Original);
        let id = task.id;
        fx.bot_tasks.enqueue(task).await.unwrap();

        let summary = fx.poller.poll(5).await;
        assert_eq!(summary.failed, 1);

        let task = fx.bot_tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.stage, TaskStage::Failed);
        assert_eq!(task.status, LifecycleStatus::Failed);
        assert!(task
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("ConfigMissing")));
        assert!(fx.generation_tasks.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_reply_target_is_terminal_with_no_child() {
        let fx = fixture();
        fx.directory.set_persona("bot-1", "You are bot one.").await;
        let target = fx.directory.insert_post("alice", "hot take").await;
        fx.directory.delete_post(target).await;

        let task = BotTask::new("bot-1", TaskKind::Reply { target_post_id: target });
        let id = task.id;
        fx.bot_tasks.enqueue(task).await.unwrap();

        fx.poller.poll(5).await;

        let task = fx.bot_tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.stage, TaskStage::Failed);
        assert!(task
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("TargetNotFound") && m.contains(&target.to_string())));
        assert!(fx.generation_tasks.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_prompt_quotes_target_content() {
        let fx = fixture();
        fx.directory.set_persona("bot-1", "You are bot one.").await;
        let target = fx.directory.insert_post("alice", "I love mondays").await;

        let task = BotTask::new("bot-1", TaskKind::Reply { target_post_id: target });
        fx.bot_tasks.enqueue(task).await.unwrap();

        fx.poller.poll(5).await;

        let children = fx.generation_tasks.all().await;
        assert_eq!(children.len(), 1);
        assert!(children[0].prompt.contains("I love mondays"));
    }

    #[tokio::test]
    async fn test_pending_task_past_created_stage_is_skipped() {
        let fx = fixture();
        fx.directory.set_persona("A", "persona").await;

        let mut task = BotTask::new("A", TaskKind::Original);
        task.stage = TaskStage::AwaitingPublish;
        task.generation_task_id = Some(Uuid::new_v4());
        task.publish_task_id = Some(Uuid::new_v4());
        let id = task.id;
        fx.bot_tasks.enqueue(task).await.unwrap();

        let summary = fx.poller.poll(5).await;
        assert_eq!(summary, PollSummary::default());

        // Untouched: still pending, no extra child created.
        let task = fx.bot_tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, LifecycleStatus::Pending);
        assert!(fx.generation_tasks.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_claims_at_most_available_slots_in_priority_order() {
        let fx = fixture();
        fx.directory.set_persona("A", "persona").await;

        let urgent = BotTask::new("A", TaskKind::Original).with_priority(10);
        let urgent_id = urgent.id;
        fx.bot_tasks.enqueue(urgent).await.unwrap();
        for _ in 0..3 {
            fx.bot_tasks
                .enqueue(BotTask::new("A", TaskKind::Original))
                .await
                .unwrap();
        }

        let summary = fx.poller.poll(2).await;
        assert_eq!(summary.claimed, 2);

        let urgent = fx.bot_tasks.get(urgent_id).await.unwrap().unwrap();
        assert_eq!(urgent.stage, TaskStage::AwaitingGeneration);
        assert_eq!(fx.bot_tasks.claimable(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let fx = fixture();
        fx.directory.set_persona("with-persona", "persona").await;

        let broken = BotTask::new("no-persona", TaskKind::Original);
        let healthy = BotTask::new("with-persona", TaskKind::Original);
        let (broken_id, healthy_id) = (broken.id, healthy.id);
        fx.bot_tasks.enqueue(broken).await.unwrap();
        fx.bot_tasks.enqueue(healthy).await.unwrap();

        let summary = fx.poller.poll(5).await;
        assert_eq!(summary, PollSummary { claimed: 2, advanced: 1, failed: 1 });

        let broken = fx.bot_tasks.get(broken_id).await.unwrap().unwrap();
        let healthy = fx.bot_tasks.get(healthy_id).await.unwrap().unwrap();
        assert_eq!(broken.stage, TaskStage::Failed);
        assert_eq!(healthy.stage, TaskStage::AwaitingGeneration);
    }

    /// Backend stub for driving a real generation poll inside the handoff.
    struct EchoClient;

    #[async_trait]
    impl crate::llm::GenerationClient for EchoClient {
        async fn generate(
            &self,
            _prompt: &str,
        ) -> Result<String, crate::error::GenerationError> {
            Ok("generated".to_string())
        }
    }

    /// Generation repo that runs a full generation poll inside `enqueue`,
    /// simulating the generation timer firing the instant the child row
    /// becomes visible.
    struct GenerationTickOnEnqueue {
        inner: Arc<MemoryGenerationTaskRepo>,
        poller: crate::pipeline::GenerationPoller,
    }

    #[async_trait]
    impl GenerationTaskRepo for GenerationTickOnEnqueue {
        async fn enqueue(&self, task: GenerationTask) -> Result<(), RepoError> {
            self.inner.enqueue(task).await?;
            self.poller.poll(5).await;
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<GenerationTask>, RepoError> {
            self.inner.get(id).await
        }

        async fn claimable(&self, limit: usize) -> Result<Vec<GenerationTask>, RepoError> {
            self.inner.claimable(limit).await
        }

        async fn claimed_count(&self) -> Result<usize, RepoError> {
            self.inner.claimed_count().await
        }

        async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError> {
            self.inner.try_claim(id).await
        }

        async fn update(&self, task: &GenerationTask) -> Result<(), RepoError> {
            self.inner.update(task).await
        }
    }

    #[tokio::test]
    async fn test_generation_tick_during_handoff_sees_linked_parent() {
        let bot_tasks = Arc::new(MemoryBotTaskRepo::new());
        let inner_generation = Arc::new(MemoryGenerationTaskRepo::new());
        let publish_tasks = Arc::new(crate::repo::MemoryPublishTaskRepo::new());
        let directory = Arc::new(MemoryDirectory::new());
        directory.set_persona("bot-1", "persona").await;

        let generation_poller = crate::pipeline::GenerationPoller::new(
            inner_generation.clone(),
            publish_tasks.clone(),
            bot_tasks.clone(),
            Arc::new(EchoClient),
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(300),
            10,
        );
        let generation_tasks = Arc::new(GenerationTickOnEnqueue {
            inner: inner_generation.clone(),
            poller: generation_poller,
        });

        let poller = BotTaskPoller::new(
            bot_tasks.clone(),
            generation_tasks,
            directory.clone(),
            directory.clone(),
        );

        let task = BotTask::new("bot-1", TaskKind::Original);
        let id = task.id;
        bot_tasks.enqueue(task).await.unwrap();

        let summary = poller.poll(5).await;
        assert_eq!(summary.advanced, 1);

        // The generation tick inside the handoff saw a parent already
        // linked to its child and advanced it to awaiting-publish; no stale
        // write from this poller may undo those links afterwards.
        let task = bot_tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.stage, TaskStage::AwaitingPublish);
        assert!(task.generation_task_id.is_some());
        assert!(task.publish_task_id.is_some());
        assert!(task.links_consistent());
    }

    /// PersonaLookup that counts calls, for the no-op idempotence check.
    struct CountingPersonas(AtomicUsize);

    #[async_trait]
    impl PersonaLookup for CountingPersonas {
        async fn persona_prompt(&self, _avatar_id: &str) -> Result<Option<String>, SocialError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some("persona".to_string()))
        }
    }

    #[tokio::test]
    async fn test_poll_with_no_pending_rows_calls_no_collaborators() {
        let bot_tasks = Arc::new(MemoryBotTaskRepo::new());
        let generation_tasks = Arc::new(MemoryGenerationTaskRepo::new());
        let directory = Arc::new(MemoryDirectory::new());
        let personas = Arc::new(CountingPersonas(AtomicUsize::new(0)));
        let poller = BotTaskPoller::new(
            bot_tasks.clone(),
            generation_tasks.clone(),
            personas.clone(),
            directory,
        );

        let summary = poller.poll(5).await;
        assert_eq!(summary, PollSummary::default());
        assert_eq!(personas.0.load(Ordering::SeqCst), 0);
        assert!(generation_tasks.all().await.is_empty());
    }
}
