//! Configuration loading, validation, and management for Parlance.
//!
//! Loads configuration from `~/.parlance/config.toml` with environment
//! variable overrides. Settings may change between requests, so callers
//! resolve endpoints and toggles from a fresh `AppConfig` on every call.

use parlance_core::partner::{CustomApi, FeatureToggles, Partner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parlance/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the OpenAI-compatible endpoint (e.g. `https://api.openai.com/v1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Bearer credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per reply
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Per-attempt HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry and cooldown behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Prompt composition switches
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Conversation window sizes
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_temperature() -> f32 {
    0.8
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("selected_model", &self.selected_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("prompt", &self.prompt)
            .field("history", &self.history)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Which requests share a rate-limit cooldown
    #[serde(default)]
    pub cooldown_scope: CooldownScope,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    750
}
fn default_max_delay_ms() -> u64 {
    20_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cooldown_scope: CooldownScope::default(),
        }
    }
}

/// Granularity of the shared rate-limit cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownScope {
    /// One cooldown per endpoint origin (scheme, host, port)
    #[default]
    Origin,
    /// One cooldown for every endpoint
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Prepend the creative-writing sandbox preamble
    #[serde(default)]
    pub sandbox_prefix: bool,

    /// Replaces the built-in preamble when non-blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_preamble: Option<String>,

    #[serde(default = "default_true")]
    pub stickers: bool,

    #[serde(default = "default_true")]
    pub music: bool,

    #[serde(default = "default_true")]
    pub calls: bool,

    #[serde(default = "default_true")]
    pub knowledge: bool,

    #[serde(default)]
    pub host_chat: HostChatConfig,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            sandbox_prefix: false,
            sandbox_preamble: None,
            stickers: true,
            music: true,
            calls: true,
            knowledge: true,
            host_chat: HostChatConfig::default(),
        }
    }
}

/// Extraction of tagged text from the host application's own chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostChatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// How many trailing host messages are scanned
    #[serde(default = "default_layers")]
    pub layers: usize,

    /// Custom tag names whose inner text is extracted
    #[serde(default)]
    pub tags: Vec<String>,

    /// Upper bound on the excerpt length, in characters
    #[serde(default = "default_excerpt_chars")]
    pub max_chars: usize,
}

fn default_layers() -> usize {
    5
}
fn default_excerpt_chars() -> usize {
    1500
}

impl Default for HostChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            layers: default_layers(),
            tags: Vec::new(),
            max_chars: default_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries kept from before the latest summary marker
    #[serde(default = "default_continuity_tail")]
    pub continuity_tail: usize,

    /// Entries kept when the log has no summary marker
    #[serde(default = "default_fallback_tail")]
    pub fallback_tail: usize,

    /// Entries kept for co-listening sessions
    #[serde(default = "default_co_listening_tail")]
    pub co_listening_tail: usize,
}

fn default_continuity_tail() -> usize {
    6
}
fn default_fallback_tail() -> usize {
    60
}
fn default_co_listening_tail() -> usize {
    10
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            continuity_tail: default_continuity_tail(),
            fallback_tail: default_fallback_tail(),
            co_listening_tail: default_co_listening_tail(),
        }
    }
}

/// Where a resolved endpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    Global,
    Partner,
}

/// The endpoint a single request goes to. Resolved per call, never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiEndpointConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub source: EndpointSource,
}

impl std::fmt::Debug for ApiEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiEndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("source", &self.source)
            .finish()
    }
}

/// Trimmed, non-empty value or nothing.
fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl AppConfig {
    /// Load configuration from the default path (~/.parlance/config.toml).
    ///
    /// Environment variables override the file:
    /// - `PARLANCE_API_URL`
    /// - `PARLANCE_API_KEY`, then `OPENAI_API_KEY` (only when no key is set)
    /// - `PARLANCE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(url) = std::env::var("PARLANCE_API_URL") {
            config.api_url = Some(url);
        }

        if config.api_key.is_none() {
            config.api_key = std::env::var("PARLANCE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PARLANCE_MODEL") {
            config.selected_model = Some(model);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parlance")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        if self.prompt.host_chat.enabled && self.prompt.host_chat.layers == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.host_chat.layers must be > 0 when host chat extraction is enabled".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the endpoint for one request.
    ///
    /// When the partner declares an enabled custom API, its URL, key and
    /// model each fall back independently to the global value if blank.
    pub fn resolve_endpoint(
        &self,
        partner_api: Option<&CustomApi>,
    ) -> Result<ApiEndpointConfig, ConfigError> {
        let endpoint = self.resolve_connection(partner_api)?;
        if endpoint.model.is_empty() {
            return Err(ConfigError::MissingModel);
        }
        Ok(endpoint)
    }

    /// Same as [`resolve_endpoint`](Self::resolve_endpoint), but a missing
    /// model is left empty instead of failing. Used to list models before
    /// one has been picked.
    pub fn resolve_connection(
        &self,
        partner_api: Option<&CustomApi>,
    ) -> Result<ApiEndpointConfig, ConfigError> {
        let custom = partner_api.filter(|api| api.enabled);

        let partner_url = custom.and_then(|api| non_blank(api.api_url.as_ref()));
        let source = if partner_url.is_some() {
            EndpointSource::Partner
        } else {
            EndpointSource::Global
        };

        let base_url = partner_url
            .or_else(|| non_blank(self.api_url.as_ref()))
            .ok_or(ConfigError::MissingEndpoint)?;

        let api_key = custom
            .and_then(|api| non_blank(api.api_key.as_ref()))
            .or_else(|| non_blank(self.api_key.as_ref()));

        let model = custom
            .and_then(|api| non_blank(api.model.as_ref()))
            .or_else(|| non_blank(self.selected_model.as_ref()))
            .unwrap_or_default();

        Ok(ApiEndpointConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            source,
        })
    }

    /// Apply a partner's overrides on top of the global prompt switches.
    pub fn feature_toggles(&self, partner: &Partner) -> FeatureToggles {
        let o = &partner.overrides;
        FeatureToggles {
            sandbox_prefix: o.sandbox_prefix.unwrap_or(self.prompt.sandbox_prefix),
            stickers: o.stickers.unwrap_or(self.prompt.stickers),
            music: o.music.unwrap_or(self.prompt.music),
            calls: o.calls.unwrap_or(self.prompt.calls),
            knowledge: o.knowledge.unwrap_or(self.prompt.knowledge),
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            selected_model: None,
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
            prompt: PromptConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API endpoint is configured. Open settings and fill in the API URL.")]
    MissingEndpoint,

    #[error("No model is selected. Open settings and choose a model.")]
    MissingModel,
}

impl ConfigError {
    /// Missing endpoint or model, as opposed to a broken config file.
    pub fn is_missing_setting(&self) -> bool {
        matches!(self, Self::MissingEndpoint | Self::MissingModel)
    }
}
