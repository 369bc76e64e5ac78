//! botforge: autonomous avatar posting pipeline.
//!
//! This library turns "this avatar should post" events into published posts
//! through a three-stage, queue-backed pipeline (bot task, text generation,
//! deferred publication), driven by a per-stage polling scheduler.

// Core modules
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod repo;
pub mod scheduler;
pub mod social;
pub mod trigger;

// Re-export commonly used error types
pub use config::ConfigError;
pub use error::{GenerationError, RepoError, TaskError};
pub use scheduler::SchedulerError;
pub use trigger::TriggerError;
