//! Partner domain types: the character being voiced, its message log, and
//! the libraries (knowledge, personas, stickers) injected into its prompt.
//!
//! All of these are owned by the surrounding application and handed to the
//! pipeline per call; nothing here is cached between requests.

use crate::message::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal prefix of summary marker entries. Any log entry starting with it
/// stays out of the conversation window.
pub const SUMMARY_MARKER_PREFIX: &str = "[[summary]]";

/// Text sent to the model in place of a recalled message.
pub const RECALLED_PLACEHOLDER: &str = "[This message was recalled]";

/// The AI-driven conversation counterpart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partner {
    /// Stable identifier
    pub id: String,

    /// Display and in-prompt name
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub personality: String,

    #[serde(default)]
    pub scenario: String,

    #[serde(default)]
    pub example_dialogue: String,

    /// Full message log, oldest first
    #[serde(default)]
    pub log: Vec<LogEntry>,

    /// Partner-specific endpoint, used only when `enabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_api: Option<CustomApi>,

    /// Per-partner toggle overrides
    #[serde(default)]
    pub overrides: FeatureOverrides,
}

/// One entry of a partner's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub role: Role,

    pub content: String,

    /// The sender withdrew this message
    #[serde(default)]
    pub recalled: bool,

    /// Sentinel separating summarized history from the live window
    #[serde(default)]
    pub summary_marker: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            recalled: false,
            summary_marker: false,
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A summary marker carrying the summary text after the literal prefix.
    pub fn summary_marker(summary: &str) -> Self {
        Self {
            summary_marker: true,
            ..Self::new(Role::System, format!("{SUMMARY_MARKER_PREFIX} {summary}"))
        }
    }

    /// Whether the entry must never reach the model.
    pub fn is_marker_like(&self) -> bool {
        self.summary_marker || self.content.starts_with(SUMMARY_MARKER_PREFIX)
    }

    /// Content as the model should see it.
    pub fn model_content(&self) -> &str {
        if self.recalled {
            RECALLED_PLACEHOLDER
        } else {
            &self.content
        }
    }
}

/// A partner-declared endpoint. Blank fields fall back to the global settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CustomApi {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl std::fmt::Debug for CustomApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomApi")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

/// Partner-level overrides; `None` defers to the global setting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_prefix: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<bool>,
}

/// Feature switches after partner overrides were applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    /// Prepend the creative-writing sandbox preamble
    pub sandbox_prefix: bool,
    /// Offer the sticker catalogue and the sticker tag
    pub stickers: bool,
    /// Allow the music-sharing tag
    pub music: bool,
    /// Allow the partner to start calls
    pub calls: bool,
    /// Inject knowledge-base entries
    pub knowledge: bool,
}

impl FeatureToggles {
    /// Everything off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Toggles used inside a call or co-listening session: no stickers,
    /// music, or call tags.
    pub fn for_scenario(self) -> Self {
        Self {
            stickers: false,
            music: false,
            calls: false,
            ..self
        }
    }
}

/// A reusable fact or lore snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    pub content: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub scope: KnowledgeScope,
}

fn default_true() -> bool {
    true
}

/// Who a knowledge entry applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnowledgeScope {
    /// Shared by every partner
    #[default]
    Global,
    /// Bound to one partner, by id and/or name
    Character {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner_name: Option<String>,
    },
}

impl KnowledgeEntry {
    /// Character-scoped entries match by id first, then by name.
    pub fn applies_to(&self, partner: &Partner) -> bool {
        match &self.scope {
            KnowledgeScope::Global => true,
            KnowledgeScope::Character {
                partner_id,
                partner_name,
            } => {
                if partner_id.as_deref().is_some_and(|id| !id.is_empty() && id == partner.id) {
                    return true;
                }
                partner_name.as_deref().is_some_and(|name| {
                    let name = name.trim();
                    !name.is_empty() && name.eq_ignore_ascii_case(partner.name.trim())
                })
            }
        }
    }

    pub fn is_character_scoped(&self) -> bool {
        matches!(self.scope, KnowledgeScope::Character { .. })
    }
}

/// A user-persona block: who the user is, from the partner's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaBlock {
    pub name: String,

    #[serde(default)]
    pub content: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A sticker the partner may send by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sticker {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Accessor for the host application's own running conversation.
pub trait HostChat: Send + Sync {
    /// The last `layers` messages of the host conversation, oldest first.
    fn recent_messages(&self, layers: usize) -> Vec<String>;
}

impl HostChat for Vec<String> {
    fn recent_messages(&self, layers: usize) -> Vec<String> {
        let start = self.len().saturating_sub(layers);
        self[start..].to_vec()
    }
}
