//! Collaborator contracts owned by the surrounding application.
//!
//! The pipeline reads personas, reads and writes posts, and discovers bot
//! followers only through these narrow interfaces; user/avatar/post CRUD,
//! authentication, and follower management live elsewhere.
//!
//! [`MemoryDirectory`] is a combined in-memory implementation used by the
//! dev runner and the test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors reported by the surrounding application's collaborators.
#[derive(Debug, Error)]
pub enum SocialError {
    /// The collaborator could not be reached.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Resolves an avatar's configured persona prompt.
#[async_trait]
pub trait PersonaLookup: Send + Sync {
    /// The persona prompt for `avatar_id`, or `None` if no persona is
    /// configured (a terminal `ConfigMissing` condition for the caller).
    async fn persona_prompt(&self, avatar_id: &str) -> Result<Option<String>, SocialError>;
}

/// Reads existing posts (for reply targets).
#[async_trait]
pub trait PostLookup: Send + Sync {
    /// The content of `post_id`, or `None` if the post no longer exists.
    async fn post_content(&self, post_id: Uuid) -> Result<Option<String>, SocialError>;
}

/// A post to be persisted.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content: String,
    pub author_avatar_id: String,
    pub reply_target_post_id: Option<Uuid>,
}

/// A persisted post, as reported back by the post store.
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub id: Uuid,
}

/// Persists new posts.
#[async_trait]
pub trait PostCreate: Send + Sync {
    /// Creates the post, failing if e.g. the reply target is dangling.
    async fn create_post(&self, post: NewPost) -> Result<CreatedPost, SocialError>;
}

/// Answers "which bot-enabled avatars follow this avatar".
#[async_trait]
pub trait FollowerLookup: Send + Sync {
    async fn bot_followers(&self, avatar_id: &str) -> Result<Vec<String>, SocialError>;
}

#[derive(Default)]
struct DirectoryState {
    personas: HashMap<String, String>,
    posts: HashMap<Uuid, NewPost>,
    followers: HashMap<String, Vec<String>>,
}

/// Combined in-memory persona/post/follower directory.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a persona prompt for an avatar.
    pub async fn set_persona(&self, avatar_id: impl Into<String>, prompt: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.personas.insert(avatar_id.into(), prompt.into());
    }

    /// Inserts a post directly (bypassing the pipeline), returning its id.
    pub async fn insert_post(&self, author: impl Into<String>, content: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        state.posts.insert(
            id,
            NewPost {
                content: content.into(),
                author_avatar_id: author.into(),
                reply_target_post_id: None,
            },
        );
        id
    }

    /// Deletes a post, e.g. to simulate a reply target vanishing.
    pub async fn delete_post(&self, post_id: Uuid) {
        self.state.lock().await.posts.remove(&post_id);
    }

    /// Registers `follower` as a bot-enabled follower of `avatar_id`.
    pub async fn add_bot_follower(
        &self,
        avatar_id: impl Into<String>,
        follower: impl Into<String>,
    ) {
        let mut state = self.state.lock().await;
        state
            .followers
            .entry(avatar_id.into())
            .or_default()
            .push(follower.into());
    }

    /// Snapshot of every stored post.
    pub async fn posts(&self) -> Vec<(Uuid, NewPost)> {
        let state = self.state.lock().await;
        state.posts.iter().map(|(id, p)| (*id, p.clone())).collect()
    }
}

#[async_trait]
impl PersonaLookup for MemoryDirectory {
    async fn persona_prompt(&self, avatar_id: &str) -> Result<Option<String>, SocialError> {
        let state = self.state.lock().await;
        Ok(state.personas.get(avatar_id).cloned())
    }
}

#[async_trait]
impl PostLookup for MemoryDirectory {
    async fn post_content(&self, post_id: Uuid) -> Result<Option<String>, SocialError> {
        let state = self.state.lock().await;
        Ok(state.posts.get(&post_id).map(|p| p.content.clone()))
    }
}

#[async_trait]
impl PostCreate for MemoryDirectory {
    async fn create_post(&self, post: NewPost) -> Result<CreatedPost, SocialError> {
        let mut state = self.state.lock().await;
        if let Some(target) = post.reply_target_post_id {
            if !state.posts.contains_key(&target) {
                return Err(SocialError::Unavailable(format!(
                    "reply target {target} does not exist"
                )));
            }
        }
        let id = Uuid::new_v4();
        state.posts.insert(id, post);
        Ok(CreatedPost { id })
    }
}

#[async_trait]
impl FollowerLookup for MemoryDirectory {
    async fn bot_followers(&self, avatar_id: &str) -> Result<Vec<String>, SocialError> {
        let state = self.state.lock().await;
        Ok(state.followers.get(avatar_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persona_lookup_distinguishes_missing_from_configured() {
        let dir = MemoryDirectory::new();
        dir.set_persona("bot-1", "You are a cheerful botanist.").await;

        let found = dir.persona_prompt("bot-1").await.unwrap();
        assert_eq!(found.as_deref(), Some("You are a cheerful botanist."));

        let missing = dir.persona_prompt("bot-2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_post_lookup_after_delete_returns_none() {
        let dir = MemoryDirectory::new();
        let id = dir.insert_post("alice", "first!").await;

        assert!(dir.post_content(id).await.unwrap().is_some());
        dir.delete_post(id).await;
        assert!(dir.post_content(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_post_rejects_dangling_reply_target() {
        let dir = MemoryDirectory::new();
        let err = dir
            .create_post(NewPost {
                content: "hello".to_string(),
                author_avatar_id: "bot-1".to_string(),
                reply_target_post_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_bot_followers_defaults_to_empty() {
        let dir = MemoryDirectory::new();
        dir.add_bot_follower("alice", "bot-1").await;
        dir.add_bot_follower("alice", "bot-2").await;

        assert_eq!(dir.bot_followers("alice").await.unwrap().len(), 2);
        assert!(dir.bot_followers("bob").await.unwrap().is_empty());
    }
}
