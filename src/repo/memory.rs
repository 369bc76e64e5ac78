//! In-memory queue repositories.
//!
//! Back the dev runner and the test suite. Each repository is a `HashMap`
//! behind a tokio `Mutex`; `try_claim` performs the conditional
//! `Pending -> Claimed` update while holding the lock, which makes it atomic
//! with respect to every other repository operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{BotTask, GenerationTask, LifecycleStatus, PublishTask};

use super::{BotTaskRepo, GenerationTaskRepo, PublishTaskRepo};

/// In-memory [`BotTaskRepo`].
#[derive(Default)]
pub struct MemoryBotTaskRepo {
    rows: Mutex<HashMap<Uuid, BotTask>>,
}

impl MemoryBotTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for status reporting and assertions.
    pub async fn all(&self) -> Vec<BotTask> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl BotTaskRepo for MemoryBotTaskRepo {
    async fn enqueue(&self, task: BotTask) -> Result<(), RepoError> {
        self.rows.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BotTask>, RepoError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn claimable(&self, limit: usize) -> Result<Vec<BotTask>, RepoError> {
        let rows = self.rows.lock().await;
        let mut pending: Vec<BotTask> = rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Claimed)
            .count())
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().await;
        let task = rows.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        if task.status != LifecycleStatus::Pending {
            return Ok(false);
        }
        task.status = LifecycleStatus::Claimed;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn update(&self, task: &BotTask) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().await;
        if !rows.contains_key(&task.id) {
            return Err(RepoError::NotFound(task.id));
        }
        rows.insert(task.id, task.clone());
        Ok(())
    }
}

/// In-memory [`GenerationTaskRepo`].
#[derive(Default)]
pub struct MemoryGenerationTaskRepo {
    rows: Mutex<HashMap<Uuid, GenerationTask>>,
}

impl MemoryGenerationTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for status reporting and assertions.
    pub async fn all(&self) -> Vec<GenerationTask> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl GenerationTaskRepo for MemoryGenerationTaskRepo {
    async fn enqueue(&self, task: GenerationTask) -> Result<(), RepoError> {
        self.rows.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationTask>, RepoError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn claimable(&self, limit: usize) -> Result<Vec<GenerationTask>, RepoError> {
        let rows = self.rows.lock().await;
        let mut pending: Vec<GenerationTask> = rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Claimed)
            .count())
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().await;
        let task = rows.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        if task.status != LifecycleStatus::Pending {
            return Ok(false);
        }
        task.status = LifecycleStatus::Claimed;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn update(&self, task: &GenerationTask) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().await;
        if !rows.contains_key(&task.id) {
            return Err(RepoError::NotFound(task.id));
        }
        rows.insert(task.id, task.clone());
        Ok(())
    }
}

/// In-memory [`PublishTaskRepo`].
#[derive(Default)]
pub struct MemoryPublishTaskRepo {
    rows: Mutex<HashMap<Uuid, PublishTask>>,
}

impl MemoryPublishTaskRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for status reporting and assertions.
    pub async fn all(&self) -> Vec<PublishTask> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl PublishTaskRepo for MemoryPublishTaskRepo {
    async fn enqueue(&self, task: PublishTask) -> Result<(), RepoError> {
        self.rows.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PublishTask>, RepoError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn claimable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PublishTask>, RepoError> {
        let rows = self.rows.lock().await;
        let mut due: Vec<PublishTask> = rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Pending && t.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn claimed_count(&self) -> Result<usize, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|t| t.status == LifecycleStatus::Claimed)
            .count())
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().await;
        let task = rows.get_mut(&id).ok_or(RepoError::NotFound(id))?;
        if task.status != LifecycleStatus::Pending {
            return Ok(false);
        }
        task.status = LifecycleStatus::Claimed;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn update(&self, task: &PublishTask) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().await;
        if !rows.contains_key(&task.id) {
            return Err(RepoError::NotFound(task.id));
        }
        rows.insert(task.id, task.clone());
        Ok(())
    }
}
