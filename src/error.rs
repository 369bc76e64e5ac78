//! Error types for botforge operations.
//!
//! Defines error types for the major subsystems:
//! - Task pipeline failures (the terminal failure taxonomy)
//! - Generation backend interactions
//! - Queue repository access
//!
//! Every pipeline failure is terminal: nothing in this crate retries. A
//! `TaskError` is recorded on the failing child entity and propagated to the
//! owning `BotTask` so a single row answers "why did this bot task die".

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Terminal failure taxonomy for a bot task.
///
/// The `Display` output of each variant is written verbatim into
/// `error_message` fields, so the variant names are kept stable and greppable.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No persona is configured for the avatar.
    #[error("ConfigMissing: no persona configured for avatar '{0}'")]
    ConfigMissing(String),

    /// The reply target post no longer exists.
    #[error("TargetNotFound: reply target post {0} no longer exists")]
    TargetNotFound(Uuid),

    /// The generation backend call failed or timed out.
    #[error("GenerationError: {0}")]
    Generation(#[from] GenerationError),

    /// Post creation failed (e.g. a dangling reply reference).
    #[error("PublishError: {0}")]
    Publish(String),

    /// Anything else.
    #[error("Unexpected: {0}")]
    Unexpected(String),
}

impl From<RepoError> for TaskError {
    fn from(e: RepoError) -> Self {
        TaskError::Unexpected(e.to_string())
    }
}

impl From<crate::social::SocialError> for TaskError {
    fn from(e: crate::social::SocialError) -> Self {
        TaskError::Unexpected(e.to_string())
    }
}

/// Errors that can occur when calling the generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Missing API base URL: `GENERATION_API_BASE` environment variable not set.
    #[error("missing API base URL: GENERATION_API_BASE environment variable not set")]
    MissingApiBase,

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The response could not be parsed into generated text.
    #[error("failed to parse generation response: {0}")]
    ParseError(String),

    /// The backend returned a non-success status code.
    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The call exceeded the caller-supplied timeout.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur during queue repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// No row exists for the given id.
    #[error("task {0} not found")]
    NotFound(Uuid),

    /// The backing store could not be reached.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
}
