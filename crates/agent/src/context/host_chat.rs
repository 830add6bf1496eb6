//! Excerpts from the host application's own conversation.
//!
//! The host chat is scanned for custom tags (`<status>…</status>`,
//! `<scene mood="x">…</scene>`); only their inner text is kept.

use parlance_config::HostChatConfig;
use parlance_core::partner::HostChat;
use regex_lite::Regex;
use tracing::{debug, warn};

/// Inner text of the configured tags across the last `layers` host
/// messages, oldest first, clipped to `max_chars`. `None` when disabled,
/// unconfigured, or nothing matched.
pub fn extract_excerpt(source: &dyn HostChat, config: &HostChatConfig) -> Option<String> {
    if !config.enabled || config.layers == 0 {
        return None;
    }

    let patterns = tag_patterns(&config.tags);
    if patterns.is_empty() {
        return None;
    }

    let messages = source.recent_messages(config.layers);
    let mut fragments: Vec<String> = Vec::new();

    for message in &messages {
        // Fragments within one message keep their textual order.
        let mut found: Vec<(usize, String)> = patterns
            .iter()
            .flat_map(|pattern| {
                pattern.captures_iter(message).filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let inner = caps.get(1)?.as_str().trim();
                    (!inner.is_empty()).then(|| (whole.start(), inner.to_string()))
                })
            })
            .collect();
        found.sort_by_key(|(start, _)| *start);
        fragments.extend(found.into_iter().map(|(_, text)| text));
    }

    if fragments.is_empty() {
        return None;
    }

    let excerpt = truncate_chars(&fragments.join("\n"), config.max_chars);
    if excerpt.trim().is_empty() {
        return None;
    }
    debug!(
        scanned = messages.len(),
        fragments = fragments.len(),
        chars = excerpt.chars().count(),
        "Extracted host chat excerpt"
    );
    Some(excerpt)
}

fn tag_patterns(tags: &[String]) -> Vec<Regex> {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter_map(|tag| {
            let escaped = regex_lite::escape(tag);
            let source = format!(r"(?s)<{escaped}(?:\s[^>]*)?>(.*?)</{escaped}\s*>");
            match Regex::new(&source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Skipping unusable host chat tag");
                    None
                }
            }
        })
        .collect()
}

/// At most `max` characters, cut on a character boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tags: &[&str]) -> HostChatConfig {
        HostChatConfig {
            enabled: true,
            layers: 3,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            max_chars: 1500,
        }
    }

    fn chat(messages: &[&str]) -> Vec<String> {
        messages.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn extracts_inner_text_of_configured_tags() {
        let host = chat(&[
            "<status>tired after work</status> and some chatter",
            "nothing here",
            "<scene mood=\"rainy\">a small café</scene><status>waiting</status>",
        ]);
        let excerpt = extract_excerpt(&host, &config(&["status", "scene"])).unwrap();
        assert_eq!(excerpt, "tired after work\na small café\nwaiting");
    }

    #[test]
    fn only_trailing_layers_are_scanned() {
        let host = chat(&[
            "<status>too old</status>",
            "<status>one</status>",
            "<status>two</status>",
            "<status>three</status>",
        ]);
        let excerpt = extract_excerpt(&host, &config(&["status"])).unwrap();
        assert!(!excerpt.contains("too old"));
        assert_eq!(excerpt, "one\ntwo\nthree");
    }

    #[test]
    fn multiline_content_and_empty_tags() {
        let host = chat(&["<note>\nline one\nline two\n</note><note>  </note>"]);
        let excerpt = extract_excerpt(&host, &config(&["note"])).unwrap();
        assert_eq!(excerpt, "line one\nline two");
    }

    #[test]
    fn tags_with_regex_characters_are_literal() {
        let host = chat(&["<a.b>dotted</a.b><axb>not me</axb>"]);
        let excerpt = extract_excerpt(&host, &config(&["a.b"])).unwrap();
        assert_eq!(excerpt, "dotted");
    }

    #[test]
    fn similar_tag_names_do_not_collide() {
        let host = chat(&["<stats>numbers</stats><status>ok</status>"]);
        assert_eq!(extract_excerpt(&host, &config(&["status"])).unwrap(), "ok");
    }

    #[test]
    fn excerpt_is_clipped_on_char_boundary() {
        let host = chat(&["<s>你好世界你好世界</s>"]);
        let mut cfg = config(&["s"]);
        cfg.max_chars = 3;
        assert_eq!(extract_excerpt(&host, &cfg).unwrap(), "你好世");
    }

    #[test]
    fn zero_char_budget_yields_nothing() {
        let host = chat(&["<status>raining</status>"]);
        let mut cfg = config(&["status"]);
        cfg.max_chars = 0;
        assert!(extract_excerpt(&host, &cfg).is_none());
    }

    #[test]
    fn disabled_or_unmatched_yields_nothing() {
        let host = chat(&["<status>x</status>"]);
        let mut cfg = config(&["status"]);
        cfg.enabled = false;
        assert!(extract_excerpt(&host, &cfg).is_none());

        assert!(extract_excerpt(&host, &config(&[])).is_none());
        assert!(extract_excerpt(&host, &config(&["  "])).is_none());
        assert!(extract_excerpt(&host, &config(&["mood"])).is_none());
    }
}
