//! Reply generation for Parlance partners.
//!
//! A turn flows through three steps:
//!
//! 1. **Resolve** the endpoint from fresh settings (partner override first)
//! 2. **Compose** `[system, ...window, user]` for the active scenario
//! 3. **Execute** through the shared resilient executor
//!
//! Composition is pure and deterministic apart from message ids and
//! timestamps; only step 3 touches the network.

pub mod context;
pub mod pipeline;
pub mod scenario;

pub use context::{
    ComposedPrompt, ConversationWindow, PromptComposer, PromptSources, WindowLimits,
};
pub use pipeline::{ChatPipeline, Reply};
pub use scenario::{CallInitiator, Scenario};
