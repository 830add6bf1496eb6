//! Scenario variants: plain chat, voice and video calls, co-listening.
//!
//! Calls and co-listening reuse the chat composer with sticker, music and
//! call tags switched off, and append their own instruction block.

use parlance_config::HistoryConfig;
use parlance_core::partner::FeatureToggles;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallInitiator {
    User,
    Partner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scenario {
    Chat,
    VoiceCall { initiator: CallInitiator },
    VideoCall { initiator: CallInitiator },
    CoListening { song: String, artist: String },
}

const VOICE_CALL_FROM_USER: &str = "[Voice Call]\n\
{name} is on a voice call the user just started. Speak naturally, as if out loud: \
short spoken sentences, no emoji, no tags. Answer what the user says and keep the call going.";

const VOICE_CALL_FROM_PARTNER: &str = "[Voice Call]\n\
{name} called the user and the user picked up. Open with why you called, \
speaking naturally as if out loud: short spoken sentences, no emoji, no tags.";

const VIDEO_CALL_FROM_USER: &str = "[Video Call]\n\
{name} is on a video call the user just started. Speak naturally and describe \
what the user can see of you in brief parentheses, e.g. (smiles and waves). No emoji, no tags.";

const VIDEO_CALL_FROM_PARTNER: &str = "[Video Call]\n\
{name} video-called the user and the user picked up. Greet them and say why you called; \
describe what the user can see of you in brief parentheses. No emoji, no tags.";

const CO_LISTENING: &str = "[Listening Together]\n\
{name} and the user are listening to \"{song}\" by {artist} together right now. \
React to the song the way a friend would: the mood, a lyric, a memory it brings back. \
Keep it light and short.";

impl Scenario {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::VoiceCall { .. } => "voice_call",
            Self::VideoCall { .. } => "video_call",
            Self::CoListening { .. } => "co_listening",
        }
    }

    /// Toggles in effect for this scenario.
    pub fn toggles(&self, base: FeatureToggles) -> FeatureToggles {
        match self {
            Self::Chat => base,
            _ => base.for_scenario(),
        }
    }

    /// Instruction block appended to the system prompt, if any.
    pub fn instructions(&self, partner_name: &str) -> Option<String> {
        let name = match partner_name.trim() {
            "" => "You",
            name => name,
        };

        let template = match self {
            Self::Chat => return None,
            Self::VoiceCall {
                initiator: CallInitiator::User,
            } => VOICE_CALL_FROM_USER,
            Self::VoiceCall {
                initiator: CallInitiator::Partner,
            } => VOICE_CALL_FROM_PARTNER,
            Self::VideoCall {
                initiator: CallInitiator::User,
            } => VIDEO_CALL_FROM_USER,
            Self::VideoCall {
                initiator: CallInitiator::Partner,
            } => VIDEO_CALL_FROM_PARTNER,
            Self::CoListening { song, artist } => {
                let song = match song.trim() {
                    "" => "an untitled song",
                    s => s,
                };
                let artist = match artist.trim() {
                    "" => "an unknown artist",
                    a => a,
                };
                return Some(
                    CO_LISTENING
                        .replace("{name}", name)
                        .replace("{song}", song)
                        .replace("{artist}", artist),
                );
            }
        };

        Some(template.replace("{name}", name))
    }

    /// Cap on window entries, when the scenario bounds its history.
    pub fn history_tail(&self, history: &HistoryConfig) -> Option<usize> {
        match self {
            Self::CoListening { .. } => Some(history.co_listening_tail),
            _ => None,
        }
    }
}
