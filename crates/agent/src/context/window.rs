//! Conversation window: the slice of a partner's log that is sent to the model.
//!
//! With a summary marker in the log, the window is a short continuity tail
//! from before the latest marker followed by everything after it. Without
//! one, it is a long fixed tail of the whole log. Marker entries, and any
//! entry whose text starts with the marker prefix, never appear.

use parlance_config::HistoryConfig;
use parlance_core::message::{Message, Role};
use parlance_core::partner::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    /// Entries kept from before the latest marker
    pub continuity_tail: usize,
    /// Entries kept when there is no marker
    pub fallback_tail: usize,
}

impl From<&HistoryConfig> for WindowLimits {
    fn from(history: &HistoryConfig) -> Self {
        Self {
            continuity_tail: history.continuity_tail,
            fallback_tail: history.fallback_tail,
        }
    }
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

/// Borrowed view over the log entries that make up the window, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationWindow<'a> {
    entries: Vec<&'a LogEntry>,
    marker: Option<usize>,
}

impl<'a> ConversationWindow<'a> {
    pub fn build(log: &'a [LogEntry], limits: WindowLimits) -> Self {
        let marker = log.iter().rposition(|e| e.summary_marker);

        let mut entries: Vec<&LogEntry> = match marker {
            Some(k) => {
                let before: Vec<&LogEntry> =
                    log[..k].iter().filter(|e| !e.is_marker_like()).collect();
                let skip = before.len().saturating_sub(limits.continuity_tail);
                before
                    .into_iter()
                    .skip(skip)
                    .chain(log[k + 1..].iter().filter(|e| !e.is_marker_like()))
                    .collect()
            }
            None => {
                let live: Vec<&LogEntry> = log.iter().filter(|e| !e.is_marker_like()).collect();
                let skip = live.len().saturating_sub(limits.fallback_tail);
                live.into_iter().skip(skip).collect()
            }
        };

        // A re-submitted user turn may already sit in the log twice.
        while entries.len() >= 2 {
            let (prev, last) = (entries[entries.len() - 2], entries[entries.len() - 1]);
            if last.role == Role::User
                && prev.role == Role::User
                && last.model_content() == prev.model_content()
            {
                entries.pop();
            } else {
                break;
            }
        }

        Self { entries, marker }
    }

    /// Keep only the most recent `n` entries.
    pub fn keep_last(mut self, n: usize) -> Self {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.drain(..skip);
        self
    }

    /// Index of the summary marker the window was split at.
    pub fn marker_index(&self) -> Option<usize> {
        self.marker
    }

    pub fn entries(&self) -> &[&'a LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the newest entry is a user turn with exactly this text.
    pub fn ends_with_user(&self, content: &str) -> bool {
        self.entries
            .last()
            .is_some_and(|e| e.role == Role::User && e.model_content() == content)
    }

    /// Role-tagged messages, recalled entries replaced by the placeholder.
    pub fn to_messages(&self) -> Vec<Message> {
        self.entries
            .iter()
            .map(|e| Message::new(e.role, e.model_content()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_core::partner::{RECALLED_PLACEHOLDER, SUMMARY_MARKER_PREFIX};

    fn alternating(n: usize) -> Vec<LogEntry> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    LogEntry::user(format!("u{i}"))
                } else {
                    LogEntry::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    fn contents(window: &ConversationWindow<'_>) -> Vec<String> {
        window.entries().iter().map(|e| e.content.clone()).collect()
    }

    #[test]
    fn no_marker_uses_fallback_tail() {
        let log = alternating(100);
        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(window.len(), 60);
        assert_eq!(window.entries()[0].content, "u40");
        assert_eq!(window.entries()[59].content, "a99");
        assert_eq!(window.marker_index(), None);
    }

    #[test]
    fn short_log_is_kept_whole() {
        let log = alternating(5);
        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn marker_splits_window_with_continuity_tail() {
        let mut log = alternating(20);
        log.push(LogEntry::summary_marker("they argued about music"));
        log.extend(alternating(4).into_iter().map(|mut e| {
            e.content = format!("after-{}", e.content);
            e
        }));

        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(window.marker_index(), Some(20));
        assert_eq!(
            contents(&window),
            vec![
                "u14", "a15", "u16", "a17", "u18", "a19", "after-u0", "after-a1", "after-u2",
                "after-a3"
            ]
        );
    }

    #[test]
    fn latest_marker_wins() {
        let mut log = alternating(4);
        log.push(LogEntry::summary_marker("first"));
        log.extend(alternating(2));
        log.push(LogEntry::summary_marker("second"));
        log.push(LogEntry::user("fresh"));

        let limits = WindowLimits {
            continuity_tail: 1,
            fallback_tail: 60,
        };
        let window = ConversationWindow::build(&log, limits);
        assert_eq!(window.marker_index(), Some(7));
        assert_eq!(contents(&window), vec!["a1", "fresh"]);
    }

    #[test]
    fn marker_like_entries_never_appear() {
        let mut log = alternating(6);
        log.push(LogEntry::summary_marker("summary"));
        log.push(LogEntry::user("hello"));
        log.push(LogEntry::assistant(format!("{SUMMARY_MARKER_PREFIX} echoed summary")));
        log.push(LogEntry::assistant("hi!"));

        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert!(window.entries().iter().all(|e| !e.is_marker_like()));
        assert_eq!(contents(&window).last().map(String::as_str), Some("hi!"));

        // Every non-marker entry after the marker is present.
        for entry in log[7..].iter().filter(|e| !e.is_marker_like()) {
            assert!(window.entries().iter().any(|w| std::ptr::eq(*w, entry)));
        }
    }

    #[test]
    fn marker_at_start_keeps_everything_after() {
        let mut log = vec![LogEntry::summary_marker("nothing yet")];
        log.extend(alternating(80));
        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(window.len(), 80);
    }

    #[test]
    fn duplicate_trailing_user_turns_collapse() {
        let log = vec![
            LogEntry::assistant("hey"),
            LogEntry::user("hi"),
            LogEntry::user("hi"),
            LogEntry::user("hi"),
        ];
        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(contents(&window), vec!["hey", "hi"]);
        assert!(window.ends_with_user("hi"));
    }

    #[test]
    fn distinct_trailing_user_turns_survive() {
        let log = vec![LogEntry::user("hi"), LogEntry::user("are you there?")];
        let window = ConversationWindow::build(&log, WindowLimits::default());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn recalled_messages_render_as_placeholder() {
        let mut recalled = LogEntry::user("something embarrassing");
        recalled.recalled = true;
        let log = vec![recalled, LogEntry::assistant("?")];

        let messages = ConversationWindow::build(&log, WindowLimits::default()).to_messages();
        assert_eq!(messages[0].content, RECALLED_PLACEHOLDER);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn keep_last_trims_oldest() {
        let log = alternating(30);
        let window = ConversationWindow::build(&log, WindowLimits::default()).keep_last(10);
        assert_eq!(window.len(), 10);
        assert_eq!(window.entries()[0].content, "u20");
        assert_eq!(
            ConversationWindow::build(&log[..3], WindowLimits::default())
                .keep_last(10)
                .len(),
            3
        );
    }
}
