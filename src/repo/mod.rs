//! Queue repositories for the three pipeline entities.
//!
//! Persistence of the stage queues is owned by the surrounding application;
//! the pipeline only sees these narrow contracts. Each repository exposes:
//!
//! - `enqueue` / `get`: row creation and point lookup
//! - `claimable(limit)`: the next claim candidates, in claim order
//! - `claimed_count`: how many rows are currently claimed (drives the
//!   scheduler's slot accounting)
//! - `try_claim`: the single atomic conditional `Pending -> Claimed` update
//!   that is the pipeline's only concurrency primitive
//! - `update`: a full-row write, valid only for the poller that owns the
//!   claimed row
//!
//! The in-memory implementations in [`memory`] back the dev runner and the
//! test suite. A single pipeline instance is assumed: the claim is a
//! conditional status update, not a distributed lock.

pub mod memory;

pub use memory::{MemoryBotTaskRepo, MemoryGenerationTaskRepo, MemoryPublishTaskRepo};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{BotTask, GenerationTask, PublishTask};

/// Queue repository for [`BotTask`] rows.
///
/// Claim order is priority (descending) then creation time (ascending).
#[async_trait]
pub trait BotTaskRepo: Send + Sync {
    /// Inserts a new row.
    async fn enqueue(&self, task: BotTask) -> Result<(), RepoError>;

    /// Point lookup by id.
    async fn get(&self, id: Uuid) -> Result<Option<BotTask>, RepoError>;

    /// Up to `limit` pending rows in claim order.
    async fn claimable(&self, limit: usize) -> Result<Vec<BotTask>, RepoError>;

    /// Number of rows whose status is `Claimed`.
    async fn claimed_count(&self) -> Result<usize, RepoError>;

    /// Atomically transitions the row `Pending -> Claimed`.
    ///
    /// Returns `false` if the row is no longer pending (already claimed by a
    /// concurrent poll, or terminal).
    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Writes the full row. Only the poller owning the claim may call this.
    async fn update(&self, task: &BotTask) -> Result<(), RepoError>;
}

/// Queue repository for [`GenerationTask`] rows.
///
/// Claim order is priority (descending) then creation time (ascending).
#[async_trait]
pub trait GenerationTaskRepo: Send + Sync {
    /// Inserts a new row.
    async fn enqueue(&self, task: GenerationTask) -> Result<(), RepoError>;

    /// Point lookup by id.
    async fn get(&self, id: Uuid) -> Result<Option<GenerationTask>, RepoError>;

    /// Up to `limit` pending rows in claim order.
    async fn claimable(&self, limit: usize) -> Result<Vec<GenerationTask>, RepoError>;

    /// Number of rows whose status is `Claimed`.
    async fn claimed_count(&self) -> Result<usize, RepoError>;

    /// Atomically transitions the row `Pending -> Claimed`.
    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Writes the full row. Only the poller owning the claim may call this.
    async fn update(&self, task: &GenerationTask) -> Result<(), RepoError>;
}

/// Queue repository for [`PublishTask`] rows.
///
/// Only rows whose `scheduled_at` has passed are claimable; claim order is
/// `scheduled_at` ascending.
#[async_trait]
pub trait PublishTaskRepo: Send + Sync {
    /// Inserts a new row.
    async fn enqueue(&self, task: PublishTask) -> Result<(), RepoError>;

    /// Point lookup by id.
    async fn get(&self, id: Uuid) -> Result<Option<PublishTask>, RepoError>;

    /// Up to `limit` pending rows due at `now`, earliest first.
    async fn claimable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PublishTask>, RepoError>;

    /// Number of rows whose status is `Claimed`.
    async fn claimed_count(&self) -> Result<usize, RepoError>;

    /// Atomically transitions the row `Pending -> Claimed`.
    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Writes the full row. Only the poller owning the claim may call this.
    async fn update(&self, task: &PublishTask) -> Result<(), RepoError>;
}
