//! # Parlance Core
//!
//! Domain types, traits, and error definitions for the Parlance conversation
//! pipeline. This crate has **no I/O**; it defines the model that the
//! configuration, provider, and composer crates implement against.
//!
//! ## Design Philosophy
//!
//! Collaborators at the edge of the pipeline (completion endpoints, the host
//! chat) are traits here. Implementations live in their respective crates,
//! which keeps them swappable and easy to stub in tests.

pub mod error;
pub mod message;
pub mod partner;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::ProviderError;
pub use message::{Message, Role};
pub use partner::{
    CustomApi, FeatureOverrides, FeatureToggles, HostChat, KnowledgeEntry, KnowledgeScope,
    LogEntry, Partner, PersonaBlock, Sticker,
};
pub use provider::{Provider, ProviderRequest, ProviderResponse, RetryEvent, Usage};
