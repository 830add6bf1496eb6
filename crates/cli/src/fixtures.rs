//! JSON files the CLI reads partners, libraries and host chats from.
//!
//! ```text
//! partner.json    a Partner, including its log and optional custom_api
//! library.json    {"knowledge": [...], "personas": [...], "stickers": [...]}
//! host_chat.json  ["oldest message", ..., "newest message"]
//! ```

use parlance_agent::PromptSources;
use parlance_core::partner::{HostChat, KnowledgeEntry, Partner, PersonaBlock, Sticker};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// The shared libraries the composer draws on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,

    #[serde(default)]
    pub personas: Vec<PersonaBlock>,

    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

impl Library {
    pub fn sources<'a>(&'a self, host_chat: Option<&'a dyn HostChat>) -> PromptSources<'a> {
        PromptSources {
            knowledge: &self.knowledge,
            personas: &self.personas,
            stickers: &self.stickers,
            host_chat,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
    let content = std::fs::read_to_string(path).map_err(|e| FixtureError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| FixtureError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn load_partner(path: &Path) -> Result<Partner, FixtureError> {
    let partner: Partner = read_json(path)?;
    tracing::debug!(
        partner = %partner.name,
        entries = partner.log.len(),
        "Loaded partner from {}",
        path.display()
    );
    Ok(partner)
}

/// An absent path means empty libraries.
pub fn load_library(path: Option<&Path>) -> Result<Library, FixtureError> {
    path.map_or_else(|| Ok(Library::default()), read_json)
}

pub fn load_host_chat(path: Option<&Path>) -> Result<Option<Vec<String>>, FixtureError> {
    path.map(read_json).transpose()
}

/// Write the partner back, log included.
pub fn save_partner(path: &Path, partner: &Partner) -> Result<(), FixtureError> {
    let write_err = |reason: String| FixtureError::Write {
        path: path.to_path_buf(),
        reason,
    };
    let json = serde_json::to_string_pretty(partner).map_err(|e| write_err(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| write_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_library_is_empty() {
        let library = load_library(None).unwrap();
        assert!(library.knowledge.is_empty());
        assert!(library.personas.is_empty());
        assert!(library.stickers.is_empty());
    }

    #[test]
    fn library_sections_are_optional() {
        let file = write_temp(r#"{"stickers":[{"name":"wave"}]}"#);
        let library = load_library(Some(file.path())).unwrap();
        assert_eq!(library.stickers.len(), 1);
        assert!(library.knowledge.is_empty());
    }

    #[test]
    fn host_chat_is_a_string_array() {
        let file = write_temp(r#"["one","two"]"#);
        let chat = load_host_chat(Some(file.path())).unwrap().unwrap();
        assert_eq!(chat.recent_messages(1), vec!["two".to_string()]);
        assert!(load_host_chat(None).unwrap().is_none());
    }

    #[test]
    fn parse_errors_name_the_file() {
        let file = write_temp("{not json");
        let err = load_partner(file.path()).unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn unreadable_partner_is_a_read_error() {
        let err = load_partner(Path::new("/nonexistent/partner.json")).unwrap_err();
        assert!(matches!(err, FixtureError::Read { .. }));
    }
}
