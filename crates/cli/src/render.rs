//! Terminal rendering of reply segments and retry notices.

use parlance_agent::context::protocol::{CallMode, Segment, SegmentBody, Tag};
use parlance_core::provider::RetryEvent;

/// One line per bubble.
pub fn segment_line(segment: &Segment) -> String {
    let body = match &segment.body {
        SegmentBody::Text(text) => text.clone(),
        SegmentBody::Tag(tag) => tag_line(tag),
    };
    match &segment.quote {
        Some(quote) => format!("> {quote}\n{body}"),
        None => body,
    }
}

fn tag_line(tag: &Tag) -> String {
    match tag {
        Tag::Sticker { name } => format!("[sticker] {name}"),
        Tag::Voice { text } => format!("[voice message] {text}"),
        Tag::Photo { description } => format!("[photo] {description}"),
        Tag::Music { song, artist } => match artist {
            Some(artist) => format!("[shares a song] {song} by {artist}"),
            None => format!("[shares a song] {song}"),
        },
        Tag::Call { mode } => match mode {
            CallMode::Voice => "[starts a voice call]".to_string(),
            CallMode::Video => "[starts a video call]".to_string(),
        },
        Tag::Post { text } => format!("[posts] {text}"),
        Tag::Block => "[blocked you]".to_string(),
        Tag::Transfer { amount, note } => match note {
            Some(note) => format!("[transfer] {amount:.2} ({note})"),
            None => format!("[transfer] {amount:.2}"),
        },
        Tag::Quote { text } => format!("> {text}"),
    }
}

pub fn retry_line(event: &RetryEvent) -> String {
    let cause = match (event.status, &event.error) {
        (Some(status), _) => format!("HTTP {status}"),
        (None, Some(error)) => error.clone(),
        (None, None) => "request failed".to_string(),
    };
    format!(
        "Retry {} in {:.1}s ({cause})",
        event.attempt + 1,
        event.delay().as_secs_f64()
    )
}
