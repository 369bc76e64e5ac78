//! Prompt composition for autonomous avatar posts.
//!
//! The bot-task poller combines an avatar's configured persona prompt with
//! kind-specific instructions into the single prompt string handed to the
//! generation backend. Prompt quality is explicitly out of scope; these
//! templates exist to keep the composition in one place.

/// Instructions appended for an original (standalone) post.
pub const ORIGINAL_POST_INSTRUCTIONS: &str = "\
Write a single short social media post in your own voice. \
Do not use hashtags unless they fit your persona. \
Reply with the post text only, no preamble.";

/// Instructions appended for a reply post. `{target}` is replaced with the
/// post being replied to.
pub const REPLY_POST_INSTRUCTIONS: &str = "\
Write a single short reply to the following post, in your own voice. \
Reply with the reply text only, no preamble.\n\nPost you are replying to:\n{target}";

/// Composes the prompt for an original post.
pub fn compose_original_prompt(persona: &str) -> String {
    format!("{persona}\n\n{ORIGINAL_POST_INSTRUCTIONS}")
}

/// Composes the prompt for a reply to `target_content`.
pub fn compose_reply_prompt(persona: &str, target_content: &str) -> String {
    let instructions = REPLY_POST_INSTRUCTIONS.replace("{target}", target_content);
    format!("{persona}\n\n{instructions}")
}
