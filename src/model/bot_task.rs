//! The `BotTask`: one unit of autonomous authoring work for one avatar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LifecycleStatus;

/// Default priority for bot tasks (0 is normal priority).
const DEFAULT_PRIORITY: i32 = 0;

/// What kind of post this task should author.
///
/// Represented as a sum type so every poller matches exhaustively; an invalid
/// combination (a reply without a target) cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// A standalone post in the avatar's own voice.
    Original,
    /// A reply to another avatar's post.
    Reply { target_post_id: Uuid },
}

impl TaskKind {
    /// The reply target, if this is a reply task.
    pub fn reply_target(&self) -> Option<Uuid> {
        match self {
            TaskKind::Original => None,
            TaskKind::Reply { target_post_id } => Some(*target_post_id),
        }
    }
}

/// Fine-grained progress marker for a bot task.
///
/// The stage indicates which child entity currently owns the task:
/// `AwaitingGeneration`/`Generating` while a `GenerationTask` is live,
/// `AwaitingPublish`/`Publishing` while a `PublishTask` is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    /// Freshly created by a trigger; no child exists yet.
    Created,
    /// A generation task has been enqueued.
    AwaitingGeneration,
    /// The generation poller is working on the child.
    Generating,
    /// Generation succeeded; a publish task has been enqueued.
    AwaitingPublish,
    /// The publish poller is working on the child.
    Publishing,
    /// Terminal: the post exists.
    Published,
    /// Terminal: the pipeline stopped here. Never retried.
    Failed,
}

impl TaskStage {
    /// Is this a terminal stage?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStage::Published | TaskStage::Failed)
    }

    /// Stages in which a generation task has been created for this bot task.
    pub fn has_generation_child(self) -> bool {
        matches!(
            self,
            TaskStage::AwaitingGeneration
                | TaskStage::Generating
                | TaskStage::AwaitingPublish
                | TaskStage::Publishing
                | TaskStage::Published
        )
    }

    /// Stages in which a publish task has been created for this bot task.
    pub fn has_publish_child(self) -> bool {
        matches!(
            self,
            TaskStage::AwaitingPublish | TaskStage::Publishing | TaskStage::Published
        )
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStage::Created => write!(f, "created"),
            TaskStage::AwaitingGeneration => write!(f, "awaiting_generation"),
            TaskStage::Generating => write!(f, "generating"),
            TaskStage::AwaitingPublish => write!(f, "awaiting_publish"),
            TaskStage::Publishing => write!(f, "publishing"),
            TaskStage::Published => write!(f, "published"),
            TaskStage::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of autonomous authoring work for one avatar.
///
/// Created by an external trigger with `status = Pending`, `stage = Created`,
/// then mutated exclusively by the three pollers. The claim status leaves
/// `Pending` the instant the bot-task poller claims the row and never returns
/// to it; downstream pollers advance the stage through the parent/child
/// linkage fields until a terminal state is reached. Bot tasks are never
/// deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotTask {
    /// Unique identifier for this task.
    pub id: Uuid,
    /// The avatar doing the authoring.
    pub avatar_id: String,
    /// What kind of post to author.
    pub kind: TaskKind,
    /// Coarse claim-control status.
    pub status: LifecycleStatus,
    /// Fine-grained progress marker.
    pub stage: TaskStage,
    /// Priority (higher values are claimed sooner).
    pub priority: i32,
    /// Set once the generation child exists.
    pub generation_task_id: Option<Uuid>,
    /// Set once the publish child exists.
    pub publish_task_id: Option<Uuid>,
    /// Set once the post has been persisted.
    pub result_post_id: Option<Uuid>,
    /// Terminal failure description, if any.
    pub error_message: Option<String>,
    /// When this task was created.
    pub created_at: DateTime<Utc>,
    /// When this task was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl BotTask {
    /// Creates a new claimable task at the start of the pipeline.
    pub fn new(avatar_id: impl Into<String>, kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            avatar_id: avatar_id.into(),
            kind,
            status: LifecycleStatus::Pending,
            stage: TaskStage::Created,
            priority: DEFAULT_PRIORITY,
            generation_task_id: None,
            publish_task_id: None,
            result_post_id: None,
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

    /// Records the freshly created generation child and advances the stage.
    ///
    /// The claim status stays `Claimed` so this task is never reclaimed while
    /// the child is in flight.
    pub fn begin_generation(&mut self, generation_task_id: Uuid) {
        self.generation_task_id = Some(generation_task_id);
        self.stage = TaskStage::AwaitingGeneration;
        self.touch();
    }

    /// Marks the generation child as actively running.
    pub fn mark_generating(&mut self) {
        self.stage = TaskStage::Generating;
        self.touch();
    }

    /// Records the freshly created publish child and advances the stage.
    pub fn begin_publish(&mut self, publish_task_id: Uuid) {
        self.publish_task_id = Some(publish_task_id);
        self.stage = TaskStage::AwaitingPublish;
        self.touch();
    }

    /// Marks the publish child as actively running.
    pub fn mark_publishing(&mut self) {
        self.stage = TaskStage::Publishing;
        self.touch();
    }

    /// Terminal success: the post exists.
    pub fn mark_published(&mut self, post_id: Uuid) {
        self.result_post_id = Some(post_id);
        self.stage = TaskStage::Published;
        self.status = LifecycleStatus::Completed;
        self.touch();
    }

    /// Terminal failure. Closes out the whole pipeline for this task.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.stage = TaskStage::Failed;
        self.status = LifecycleStatus::Failed;
        self.touch();
    }

    /// The reply target, if this is a reply task.
    pub fn reply_target(&self) -> Option<Uuid> {
        self.kind.reply_target()
    }

    /// Checks the link-field invariants:
    ///
    /// - `generation_task_id` is set iff the stage has a generation child
    /// - `publish_task_id` is set iff the stage has a publish child
    /// - `result_post_id` is set iff the stage is `Published`
    ///
    /// A `Failed` task keeps whatever links it had accumulated, so only the
    /// positive direction is checked for failed tasks.
    pub fn links_consistent(&self) -> bool {
        if self.stage == TaskStage::Failed {
            return true;
        }
        self.generation_task_id.is_some() == self.stage.has_generation_child()
            && self.publish_task_id.is_some() == self.stage.has_publish_child()
            && self.result_post_id.is_some() == (self.stage == TaskStage::Published)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
