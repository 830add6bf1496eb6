//! Side-channel grammar shared by the prompt and downstream reply parsers.
//!
//! A reply is split into chat bubbles by [`SEGMENT_DELIMITER`]. A segment is
//! either plain text or exactly one tag `[kind]` / `[kind:payload]`, and may
//! open with a `[quote:…]` tag naming the message it answers.
//!
//! The instruction block the model sees is rendered from the same tag table
//! the parser uses, so the two cannot drift apart.

use parlance_core::partner::FeatureToggles;
use serde::{Deserialize, Serialize};

/// Bumped whenever tag syntax changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Separates consecutive chat bubbles in one reply.
pub const SEGMENT_DELIMITER: &str = "|||";

const MAX_SEGMENTS: usize = 5;
const MAX_SEGMENT_CHARS: usize = 120;

/// Kinds of side-channel tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Sticker,
    Voice,
    Photo,
    Music,
    Call,
    Post,
    Block,
    Transfer,
    Quote,
}

impl TagKind {
    pub const ALL: [TagKind; 9] = [
        TagKind::Sticker,
        TagKind::Voice,
        TagKind::Photo,
        TagKind::Music,
        TagKind::Call,
        TagKind::Post,
        TagKind::Block,
        TagKind::Transfer,
        TagKind::Quote,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Sticker => "sticker",
            Self::Voice => "voice",
            Self::Photo => "photo",
            Self::Music => "music",
            Self::Call => "call",
            Self::Post => "post",
            Self::Block => "block",
            Self::Transfer => "transfer",
            Self::Quote => "quote",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.keyword().eq_ignore_ascii_case(keyword))
    }

    fn syntax(&self) -> &'static str {
        match self {
            Self::Sticker => "[sticker:NAME]",
            Self::Voice => "[voice:WHAT YOU SAY]",
            Self::Photo => "[photo:WHAT THE PHOTO SHOWS]",
            Self::Music => "[music:SONG - ARTIST]",
            Self::Call => "[call:voice] or [call:video]",
            Self::Post => "[post:TEXT]",
            Self::Block => "[block]",
            Self::Transfer => "[transfer:AMOUNT] or [transfer:AMOUNT:NOTE]",
            Self::Quote => "[quote:QUOTED TEXT] your reply",
        }
    }

    fn usage(&self) -> &'static str {
        match self {
            Self::Sticker => "send a sticker, using only a name from the sticker list",
            Self::Voice => "send a voice message instead of text",
            Self::Photo => "send a photo",
            Self::Music => "share a song",
            Self::Call => "start a call with the user",
            Self::Post => "publish a post on your social feed",
            Self::Block => "block the user, only when the relationship truly breaks down",
            Self::Transfer => "send the user money",
            Self::Quote => "reply to one specific earlier message",
        }
    }

    /// Whether the model may use this tag under `toggles`.
    pub fn allowed(&self, toggles: &FeatureToggles) -> bool {
        match self {
            Self::Sticker => toggles.stickers,
            Self::Music => toggles.music,
            Self::Call => toggles.calls,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    Voice,
    Video,
}

/// A parsed side-channel tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tag {
    Sticker { name: String },
    Voice { text: String },
    Photo { description: String },
    Music { song: String, artist: Option<String> },
    Call { mode: CallMode },
    Post { text: String },
    Block,
    Transfer { amount: f64, note: Option<String> },
    Quote { text: String },
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        match self {
            Self::Sticker { .. } => TagKind::Sticker,
            Self::Voice { .. } => TagKind::Voice,
            Self::Photo { .. } => TagKind::Photo,
            Self::Music { .. } => TagKind::Music,
            Self::Call { .. } => TagKind::Call,
            Self::Post { .. } => TagKind::Post,
            Self::Block => TagKind::Block,
            Self::Transfer { .. } => TagKind::Transfer,
            Self::Quote { .. } => TagKind::Quote,
        }
    }
}

/// Parse a whole string as exactly one tag.
pub fn parse_tag(input: &str) -> Option<Tag> {
    let inner = input.trim().strip_prefix('[')?.strip_suffix(']')?;
    let (keyword, payload) = match inner.split_once(':') {
        Some((keyword, payload)) => (keyword.trim(), Some(payload.trim())),
        None => (inner.trim(), None),
    };
    let kind = TagKind::from_keyword(keyword)?;
    let text = || payload.filter(|p| !p.is_empty()).map(String::from);

    match kind {
        TagKind::Sticker => Some(Tag::Sticker { name: text()? }),
        TagKind::Voice => Some(Tag::Voice { text: text()? }),
        TagKind::Photo => Some(Tag::Photo {
            description: text()?,
        }),
        TagKind::Music => {
            let payload = text()?;
            match payload.split_once(" - ") {
                Some((song, artist)) => Some(Tag::Music {
                    song: song.trim().to_string(),
                    artist: Some(artist.trim().to_string()).filter(|a| !a.is_empty()),
                }),
                None => Some(Tag::Music {
                    song: payload,
                    artist: None,
                }),
            }
        }
        TagKind::Call => {
            let mode = match payload.map(str::to_ascii_lowercase).as_deref() {
                None | Some("") | Some("voice") => CallMode::Voice,
                Some("video") => CallMode::Video,
                Some(_) => return None,
            };
            Some(Tag::Call { mode })
        }
        TagKind::Post => Some(Tag::Post { text: text()? }),
        TagKind::Block => Some(Tag::Block),
        TagKind::Transfer => {
            let payload = text()?;
            let (amount, note) = match payload.split_once(':') {
                Some((amount, note)) => (amount, Some(note.trim().to_string())),
                None => (payload.as_str(), None),
            };
            let amount: f64 = amount.trim().parse().ok()?;
            if !amount.is_finite() || amount <= 0.0 {
                return None;
            }
            Some(Tag::Transfer {
                amount,
                note: note.filter(|n| !n.is_empty()),
            })
        }
        TagKind::Quote => Some(Tag::Quote { text: text()? }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SegmentBody {
    Text(String),
    Tag(Tag),
}

/// One chat bubble of a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    pub body: SegmentBody,
}

/// Split a model reply into bubbles. Unknown or malformed tags stay text.
pub fn parse_reply(reply: &str) -> Vec<Segment> {
    reply
        .split(SEGMENT_DELIMITER)
        .filter_map(|chunk| {
            let mut rest = chunk.trim();
            let mut quote = None;

            if let Some(close) = rest.starts_with("[quote:").then(|| rest.find(']')).flatten() {
                if let Some(Tag::Quote { text }) = parse_tag(&rest[..=close]) {
                    quote = Some(text);
                    rest = rest[close + 1..].trim();
                }
            }

            if rest.is_empty() {
                return None;
            }

            let body = match parse_tag(rest) {
                Some(tag) if tag.kind() != TagKind::Quote => SegmentBody::Tag(tag),
                _ => SegmentBody::Text(rest.to_string()),
            };
            Some(Segment { quote, body })
        })
        .collect()
}

/// The output-format block of the system prompt. Always present.
pub fn render_instructions(toggles: &FeatureToggles) -> String {
    let mut out = format!("[Output Format v{PROTOCOL_VERSION}]\n");
    out.push_str(&format!(
        "- Reply like a real chat: split your reply into 1 to {MAX_SEGMENTS} short messages separated by {SEGMENT_DELIMITER}.\n"
    ));
    out.push_str(&format!(
        "- Keep each message under {MAX_SEGMENT_CHARS} characters. Never narrate actions or describe yourself in the third person.\n"
    ));
    out.push_str("- A tag must be a message on its own, except a quote, which opens the message it belongs to.\n");
    out.push_str("- Allowed tags:\n");

    for kind in TagKind::ALL.iter().filter(|k| k.allowed(toggles)) {
        out.push_str(&format!("  - {}: {}\n", kind.syntax(), kind.usage()));
    }

    out.push_str(
        "- Quote sparingly: at most once every few replies, and only when answering something that is no longer the latest message.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> FeatureToggles {
        FeatureToggles {
            sandbox_prefix: true,
            stickers: true,
            music: true,
            calls: true,
            knowledge: true,
        }
    }

    #[test]
    fn parses_each_tag_kind() {
        assert_eq!(
            parse_tag("[sticker:happy cat]"),
            Some(Tag::Sticker {
                name: "happy cat".into()
            })
        );
        assert_eq!(
            parse_tag("[music:Yellow - Coldplay]"),
            Some(Tag::Music {
                song: "Yellow".into(),
                artist: Some("Coldplay".into())
            })
        );
        assert_eq!(
            parse_tag("[music:Clair de Lune]"),
            Some(Tag::Music {
                song: "Clair de Lune".into(),
                artist: None
            })
        );
        assert_eq!(
            parse_tag("[call:video]"),
            Some(Tag::Call {
                mode: CallMode::Video
            })
        );
        assert_eq!(
            parse_tag("[call]"),
            Some(Tag::Call {
                mode: CallMode::Voice
            })
        );
        assert_eq!(parse_tag("[BLOCK]"), Some(Tag::Block));
        assert_eq!(
            parse_tag("[transfer:52.0:for dinner]"),
            Some(Tag::Transfer {
                amount: 52.0,
                note: Some("for dinner".into())
            })
        );
        assert_eq!(
            parse_tag("[voice: good night ]"),
            Some(Tag::Voice {
                text: "good night".into()
            })
        );
    }

    #[test]
    fn rejects_malformed_tags() {
        assert_eq!(parse_tag("sticker:cat"), None);
        assert_eq!(parse_tag("[sticker:]"), None);
        assert_eq!(parse_tag("[dance:tango]"), None);
        assert_eq!(parse_tag("[call:hologram]"), None);
        assert_eq!(parse_tag("[transfer:lots]"), None);
        assert_eq!(parse_tag("[transfer:-5]"), None);
        assert_eq!(parse_tag("[sticker:cat] extra"), None);
    }

    #[test]
    fn splits_reply_into_segments() {
        let reply = "hey you|||[sticker:wave]||| [quote:did you eat?] not yet |||  |||[photo:my lunch]";
        let segments = parse_reply(reply);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].body, SegmentBody::Text("hey you".into()));
        assert_eq!(
            segments[1].body,
            SegmentBody::Tag(Tag::Sticker {
                name: "wave".into()
            })
        );
        assert_eq!(segments[2].quote.as_deref(), Some("did you eat?"));
        assert_eq!(segments[2].body, SegmentBody::Text("not yet".into()));
        assert!(matches!(segments[3].body, SegmentBody::Tag(Tag::Photo { .. })));
    }

    #[test]
    fn unknown_tags_stay_text() {
        let segments = parse_reply("[wink]");
        assert_eq!(segments[0].body, SegmentBody::Text("[wink]".into()));
    }

    #[test]
    fn instructions_list_every_tag_when_enabled() {
        let text = render_instructions(&all_on());
        assert!(text.starts_with("[Output Format v1]"));
        for kind in TagKind::ALL {
            assert!(text.contains(kind.syntax()), "missing {kind:?}");
        }
        assert!(text.contains(SEGMENT_DELIMITER));
    }

    #[test]
    fn disabled_features_drop_their_tags() {
        let text = render_instructions(&FeatureToggles::disabled());
        assert!(!text.contains("[sticker:"));
        assert!(!text.contains("[music:"));
        assert!(!text.contains("[call:"));
        assert!(text.contains("[voice:"));
        assert!(text.contains("[transfer:"));
        assert!(text.contains("[quote:"));
    }

    #[test]
    fn every_documented_tag_parses() {
        let examples = [
            "[sticker:hi]",
            "[voice:hello]",
            "[photo:sunset]",
            "[music:Song - Artist]",
            "[call:voice]",
            "[post:new day]",
            "[block]",
            "[transfer:10]",
            "[quote:earlier]",
        ];
        for (kind, example) in TagKind::ALL.iter().zip(examples) {
            assert_eq!(parse_tag(example).map(|t| t.kind()), Some(*kind));
        }
    }
}
