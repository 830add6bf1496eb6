pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod prompt;

use clap::{Args, ValueEnum};
use parlance::fixtures::{self, FixtureError, Library};
use parlance_agent::{CallInitiator, PromptSources, Scenario};
use parlance_core::partner::{HostChat, Partner};
use std::path::PathBuf;

/// Which partner to talk to, and what it may draw on.
#[derive(Args)]
pub struct PartnerArgs {
    /// Partner JSON file
    #[arg(short, long)]
    pub partner: PathBuf,

    /// Knowledge, persona and sticker libraries (JSON)
    #[arg(long)]
    pub library: Option<PathBuf>,

    /// The host application's conversation, as a JSON string array
    #[arg(long)]
    pub host_chat: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CallKind {
    Voice,
    Video,
}

/// Selects the scenario of a turn. Text chat when no flag is given.
#[derive(Args)]
pub struct ScenarioArgs {
    /// Talk as if on a call
    #[arg(long, value_enum, conflicts_with = "song")]
    pub call: Option<CallKind>,

    /// The partner placed the call
    #[arg(long, requires = "call")]
    pub partner_initiated: bool,

    /// Listen to a song together
    #[arg(long, requires = "artist")]
    pub song: Option<String>,

    #[arg(long, requires = "song")]
    pub artist: Option<String>,
}

impl ScenarioArgs {
    pub fn scenario(&self) -> Scenario {
        let initiator = if self.partner_initiated {
            CallInitiator::Partner
        } else {
            CallInitiator::User
        };

        match (self.call, &self.song) {
            (Some(CallKind::Voice), _) => Scenario::VoiceCall { initiator },
            (Some(CallKind::Video), _) => Scenario::VideoCall { initiator },
            (None, Some(song)) => Scenario::CoListening {
                song: song.clone(),
                artist: self.artist.clone().unwrap_or_default(),
            },
            (None, None) => Scenario::Chat,
        }
    }
}

/// A partner with its libraries, loaded from disk.
pub struct Session {
    pub partner_path: PathBuf,
    pub partner: Partner,
    pub library: Library,
    pub host_chat: Option<Vec<String>>,
}

impl PartnerArgs {
    pub fn load(&self) -> Result<Session, FixtureError> {
        Ok(Session {
            partner: fixtures::load_partner(&self.partner)?,
            library: fixtures::load_library(self.library.as_deref())?,
            host_chat: fixtures::load_host_chat(self.host_chat.as_deref())?,
            partner_path: self.partner.clone(),
        })
    }
}

impl Session {
    pub fn sources(&self) -> PromptSources<'_> {
        let host_chat = self.host_chat.as_ref().map(|chat| chat as &dyn HostChat);
        self.library.sources(host_chat)
    }
}
