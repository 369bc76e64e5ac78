//! The three-stage bot task pipeline.
//!
//! # Pipeline Flow
//!
//! 1. **Bot-task stage**: an external trigger has enqueued a `BotTask`. The
//!    [`BotTaskPoller`] claims it, resolves the avatar's persona, composes
//!    the prompt, and enqueues a `GenerationTask` linked back to it.
//! 2. **Generation stage**: the [`GenerationPoller`] claims the
//!    `GenerationTask`, calls the text-generation backend, and on success
//!    enqueues a `PublishTask` scheduled a fixed delay in the future.
//! 3. **Publish stage**: once the `PublishTask` is due, the
//!    [`PublishPoller`] claims it and persists the post through the post
//!    store, recording the post id back onto the originating `BotTask`.
//!
//! Each stage runs on its own timer (see [`crate::scheduler`]); a bot task is
//! advanced *eventually* by the next stage's tick, never immediately.
//!
//! # Failure Semantics
//!
//! Failure anywhere is terminal for the owning `BotTask`: the error is
//! recorded on the failing child entity and propagated to the parent's
//! `stage = Failed` / `status = Failed` / `error_message`, and the pipeline
//! does not proceed further for that task. Nothing is retried. Within a
//! batch, failures are isolated per task: one task's error never aborts its
//! siblings.

pub mod bot_poller;
pub mod generation_poller;
pub mod publish_poller;

pub use bot_poller::BotTaskPoller;
pub use generation_poller::GenerationPoller;
pub use publish_poller::PublishPoller;

use async_trait::async_trait;

use crate::error::RepoError;

/// What one poll invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Rows claimed this poll.
    pub claimed: usize,
    /// Claimed rows that advanced to the next stage.
    pub advanced: usize,
    /// Claimed rows that ended terminally failed.
    pub failed: usize,
}

/// One stage's poller, as driven by the scheduler.
///
/// The scheduler computes `available_slots` from `claimed_count` before each
/// poll and skips the poll entirely (no queue read) when no slots are free;
/// `poll` itself never fails the stage loop: infrastructure errors are
/// logged and surface as an empty summary.
#[async_trait]
pub trait StagePoller: Send + Sync {
    /// Stable stage name, used in logs and stats.
    fn stage_name(&self) -> &'static str;

    /// Number of rows this stage currently holds claimed.
    async fn claimed_count(&self) -> Result<usize, RepoError>;

    /// Claims up to `available_slots` rows and processes them concurrently.
    async fn poll(&self, available_slots: usize) -> PollSummary;
}
