//! Prompt context: everything sent to the model besides the user's message.
//!
//! | Part | Source |
//! |------|--------|
//! | System prompt | Partner sheet, libraries, host chat, output format |
//! | Window | Partner log, cut at the latest summary marker |

pub mod composer;
pub mod host_chat;
pub mod protocol;
pub mod token;
pub mod window;

pub use composer::{ComposedPrompt, PromptComposer, PromptSources};
pub use window::{ConversationWindow, WindowLimits};
