//! Prompt composition.
//!
//! The system prompt is built from up to seven sections, always in this
//! order:
//!
//! | # | Section | Included when |
//! |---|---------|---------------|
//! | 1 | Creative-writing preamble | `sandbox_prefix` toggle |
//! | 2 | Host chat excerpt | host chat enabled and something matched |
//! | 3 | User personas | any enabled persona |
//! | 4 | Character sheet | any character field is set |
//! | 5 | Knowledge base | `knowledge` toggle and any matching entry |
//! | 6 | Output format | always |
//! | 7 | Sticker catalogue | `stickers` toggle and a non-empty library |
//!
//! Sections are joined with blank lines. An empty section contributes
//! nothing, header included.

use crate::context::host_chat::extract_excerpt;
use crate::context::protocol;
use crate::context::token;
use crate::context::window::{ConversationWindow, WindowLimits};
use parlance_config::AppConfig;
use parlance_core::message::{Message, Role};
use parlance_core::partner::{
    FeatureToggles, HostChat, KnowledgeEntry, Partner, PersonaBlock, Sticker,
};
use serde::Serialize;
use tracing::debug;

/// Built-in preamble used when no override is configured.
pub const DEFAULT_SANDBOX_PREAMBLE: &str = "[Creative Writing Mode]\n\
This is a private, fictional role-play between adults. Stay in character at all times \
and write freely within the story. Do not add disclaimers, warnings, or out-of-character notes.";

/// Libraries owned by the surrounding application, borrowed per call.
#[derive(Clone, Copy, Default)]
pub struct PromptSources<'a> {
    pub knowledge: &'a [KnowledgeEntry],
    pub personas: &'a [PersonaBlock],
    pub stickers: &'a [Sticker],
    pub host_chat: Option<&'a dyn HostChat>,
}

/// A composed request payload plus size metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedPrompt {
    /// `[system, ...window, user]`
    pub messages: Vec<Message>,
    /// Entries taken from the partner's log
    pub window_len: usize,
    /// Whether the current user message was appended (false when the log
    /// already ended with it)
    pub user_appended: bool,
    pub system_tokens: usize,
    pub total_tokens: usize,
}

impl ComposedPrompt {
    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map_or("", |m| m.content.as_str())
    }
}

/// Builds system prompts and message lists. Cheap to create; holds only
/// borrows, so build a fresh one for every call.
pub struct PromptComposer<'a> {
    config: &'a AppConfig,
    sources: PromptSources<'a>,
}

impl<'a> PromptComposer<'a> {
    pub fn new(config: &'a AppConfig, sources: PromptSources<'a>) -> Self {
        Self { config, sources }
    }

    /// The system prompt for `partner` under `toggles`.
    pub fn build_system_prompt(&self, partner: &Partner, toggles: &FeatureToggles) -> String {
        let sections = [
            self.sandbox_section(toggles),
            self.host_chat_section(),
            self.persona_section(),
            character_section(partner),
            self.knowledge_section(partner, toggles),
            Some(protocol::render_instructions(toggles)),
            self.sticker_section(toggles),
        ];

        sections
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// `[system, ...window, user]` for a plain chat turn, using the
    /// partner's resolved toggles and the full conversation window.
    pub fn build_messages(&self, partner: &Partner, user_message: &str) -> ComposedPrompt {
        let toggles = self.config.feature_toggles(partner);
        let window = ConversationWindow::build(&partner.log, WindowLimits::from(&self.config.history));
        self.compose(partner, &toggles, &window, None, user_message)
    }

    /// Assemble a payload from an explicit window, optionally appending a
    /// scenario block to the system prompt.
    pub fn compose(
        &self,
        partner: &Partner,
        toggles: &FeatureToggles,
        window: &ConversationWindow<'_>,
        scenario_block: Option<&str>,
        user_message: &str,
    ) -> ComposedPrompt {
        let mut system = self.build_system_prompt(partner, toggles);
        if let Some(block) = scenario_block.map(str::trim).filter(|b| !b.is_empty()) {
            system.push_str("\n\n");
            system.push_str(block);
        }

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(Message::system(system));
        messages.extend(window.to_messages());

        let user_appended = !window.ends_with_user(user_message);
        if user_appended {
            messages.push(Message::user(user_message));
        }

        let system_tokens = token::estimate_message_tokens(&messages[0]);
        let total_tokens = token::estimate_messages_tokens(&messages);

        debug!(
            partner = %partner.name,
            window = window.len(),
            user_appended,
            system_tokens,
            total_tokens,
            "Composed prompt"
        );

        ComposedPrompt {
            messages,
            window_len: window.len(),
            user_appended,
            system_tokens,
            total_tokens,
        }
    }

    // ── Sections ──────────────────────────────────────────────────────────

    fn sandbox_section(&self, toggles: &FeatureToggles) -> Option<String> {
        if !toggles.sandbox_prefix {
            return None;
        }
        let custom = self
            .config
            .prompt
            .sandbox_preamble
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        Some(custom.unwrap_or(DEFAULT_SANDBOX_PREAMBLE).to_string())
    }

    fn host_chat_section(&self) -> Option<String> {
        let source = self.sources.host_chat?;
        let excerpt = extract_excerpt(source, &self.config.prompt.host_chat)?;
        if excerpt.trim().is_empty() {
            return None;
        }
        Some(format!("[Recent Events]\n{excerpt}"))
    }

    fn persona_section(&self) -> Option<String> {
        let blocks: Vec<String> = self
            .sources
            .personas
            .iter()
            .filter(|p| p.enabled && !p.content.trim().is_empty())
            .map(|p| {
                let name = p.name.trim();
                if name.is_empty() {
                    p.content.trim().to_string()
                } else {
                    format!("{name}: {}", p.content.trim())
                }
            })
            .collect();

        if blocks.is_empty() {
            return None;
        }
        Some(format!("[About the User]\n{}", blocks.join("\n")))
    }

    fn knowledge_section(&self, partner: &Partner, toggles: &FeatureToggles) -> Option<String> {
        if !toggles.knowledge {
            return None;
        }

        let usable = self
            .sources
            .knowledge
            .iter()
            .filter(|k| k.enabled && !k.content.trim().is_empty());

        let (character, global): (Vec<&KnowledgeEntry>, Vec<&KnowledgeEntry>) = usable
            .filter(|k| k.applies_to(partner))
            .partition(|k| k.is_character_scoped());

        let mut parts = Vec::new();
        if !character.is_empty() {
            parts.push(format!(
                "[Knowledge about {}]\n{}",
                display_name(partner),
                bullets(&character)
            ));
        }
        if !global.is_empty() {
            parts.push(format!("[World Knowledge]\n{}", bullets(&global)));
        }

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    fn sticker_section(&self, toggles: &FeatureToggles) -> Option<String> {
        if !toggles.stickers {
            return None;
        }
        let names: Vec<&str> = self
            .sources
            .stickers
            .iter()
            .map(|s| s.name.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return None;
        }
        Some(format!(
            "[Stickers]\nYou may send only these stickers, by exact name: {}",
            names.join(", ")
        ))
    }
}

fn character_section(partner: &Partner) -> Option<String> {
    let fields = [
        ("Name", partner.name.trim()),
        ("Description", partner.description.trim()),
        ("Personality", partner.personality.trim()),
        ("Scenario", partner.scenario.trim()),
    ];

    let mut lines: Vec<String> = fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{label}: {value}"))
        .collect();

    let dialogue = partner.example_dialogue.trim();
    if !dialogue.is_empty() {
        lines.push(format!("Example dialogue:\n{dialogue}"));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("[Your Character]\n{}", lines.join("\n")))
}

fn display_name(partner: &Partner) -> &str {
    match partner.name.trim() {
        "" => "you",
        name => name,
    }
}

fn bullets(entries: &[&KnowledgeEntry]) -> String {
    entries
        .iter()
        .map(|k| {
            let content = k.content.split_whitespace().collect::<Vec<_>>().join(" ");
            match k.title.trim() {
                "" => format!("- {content}"),
                title => format!("- {title}: {content}"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
