//! Data model for the bot task pipeline.
//!
//! Three entities, one per stage queue:
//!
//! - [`BotTask`]: the unit of autonomous authoring work, tracking the whole
//!   pipeline's progress for one avatar
//! - [`GenerationTask`]: one request/response cycle with the text-generation
//!   backend, derived from exactly one `BotTask`
//! - [`PublishTask`]: one scheduled, not-yet-materialized post awaiting its
//!   publish time
//!
//! All three share the coarse [`LifecycleStatus`] claim-control status; the
//! `BotTask` additionally carries the fine-grained [`TaskStage`] progress
//! marker indicating which child entity currently owns it.

pub mod bot_task;
pub mod generation_task;
pub mod publish_task;

pub use bot_task::{BotTask, TaskKind, TaskStage};
pub use generation_task::GenerationTask;
pub use publish_task::PublishTask;

use serde::{Deserialize, Serialize};

/// Coarse claim-control status shared by all queue entities.
///
/// Only `Pending` rows are eligible for claiming. Transitioning a row away
/// from `Pending` with a single conditional update is the pipeline's sole
/// concurrency-control mechanism: the claiming poller then exclusively owns
/// the row until it reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStatus {
    /// Eligible for claiming.
    Pending,
    /// Exclusively owned by a poller.
    Claimed,
    /// Terminal: the work succeeded.
    Completed,
    /// Terminal: the work failed. Never retried.
    Failed,
}

impl LifecycleStatus {
    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleStatus::Completed | LifecycleStatus::Failed)
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Pending => write!(f, "pending"),
            LifecycleStatus::Claimed => write!(f, "claimed"),
            LifecycleStatus::Completed => write!(f, "completed"),
            LifecycleStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_status_terminality() {
        assert!(!LifecycleStatus::Pending.is_terminal());
        assert!(!LifecycleStatus::Claimed.is_terminal());
        assert!(LifecycleStatus::Completed.is_terminal());
        assert!(LifecycleStatus::Failed.is_terminal());
    }

    #[test]
    fn test_lifecycle_status_display() {
        assert_eq!(format!("{}", LifecycleStatus::Pending), "pending");
        assert_eq!(format!("{}", LifecycleStatus::Failed), "failed");
    }
}
