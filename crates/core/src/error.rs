//! Error types for the Parlance domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Every provider-facing variant carries a pre-formatted, user-displayable
//! message: callers show `to_string()` as-is.

use thiserror::Error;

/// Failures surfaced by a completion endpoint or the request pipeline in front of it.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Endpoint or model missing. Never retried.
    #[error("{0}")]
    NotConfigured(String),

    /// The transport failed on every attempt (DNS, TLS, connection refused).
    #[error("{0}")]
    Network(String),

    /// A non-success status the caller cannot recover from by waiting.
    #[error("{message}")]
    ApiError { status_code: u16, message: String },

    /// `429` without quota vocabulary in the body.
    #[error("{message}")]
    RateLimited { message: String },

    /// `429` whose body talks about billing, balance or quota.
    #[error("{message}")]
    QuotaExhausted { message: String },

    /// A success status whose body could not be used.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// The caller cancelled the request before it settled.
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// HTTP status behind this error, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            Self::RateLimited { .. } | Self::QuotaExhausted { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the failure stems from settings rather than the network or provider.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}
