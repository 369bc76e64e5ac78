//! Text-generation backend integration.
//!
//! The pipeline treats generation as opaque: a prompt string goes in,
//! generated text comes out, and any failure is a terminal
//! [`GenerationError`](crate::error::GenerationError) for the owning bot
//! task. The [`GenerationClient`] trait is the seam; [`HttpGenerationClient`]
//! is the production implementation against an OpenAI-compatible
//! chat-completions endpoint.

pub mod client;

pub use client::{ChatRequest, ChatResponse, Choice, GenerationClient, HttpGenerationClient, Message};
