//! Turns failed responses into user-displayable errors.
//!
//! Providers disagree on error shapes, so extraction tries the common
//! layouts in order and falls back to the (clipped) raw body. `429`s are
//! further split into "quota exhausted" and "rate limited" by keyword, since
//! the two need different advice.

use crate::executor::ExecuteError;
use crate::transport::HttpResponse;
use parlance_core::error::ProviderError;

/// Longest raw body excerpt included in a message, in characters.
pub const MAX_BODY_CHARS: usize = 300;

/// Diagnostic headers, in lookup order.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "x-openai-request-id", "cf-ray"];

/// Billing and balance vocabulary, lowercase, English and Chinese.
const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "billing",
    "insufficient",
    "balance",
    "credit",
    "payment required",
    "余额",
    "额度",
    "配额",
    "欠费",
    "充值",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    QuotaExhausted,
    RateLimited,
}

impl RateLimitKind {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::QuotaExhausted => {
                "The account's quota or balance appears to be used up. Top up the account or switch to another API key."
            }
            Self::RateLimited => {
                "The provider is rate limiting requests. Wait a moment before sending again, or lower how often you send."
            }
        }
    }
}

/// Classify a `429` body by keyword.
pub fn classify_rate_limit(body: &str) -> RateLimitKind {
    let lowered = body.to_lowercase();
    if QUOTA_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        RateLimitKind::QuotaExhausted
    } else {
        RateLimitKind::RateLimited
    }
}

/// Best human-readable message in a failure body.
pub fn extract_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = structured_message(&json) {
            return clip(&message, MAX_BODY_CHARS);
        }
    }
    clip(body, MAX_BODY_CHARS)
}

fn structured_message(json: &serde_json::Value) -> Option<String> {
    let text = |v: &serde_json::Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let error = &json["error"];
    if let Some(m) = text(&error["message"]) {
        return Some(m);
    }
    if let Some(m) = text(&error["error"]["message"]) {
        return Some(m);
    }
    if let Some(m) = text(&json["message"]) {
        return Some(m);
    }
    // {"type": "...", "error": "..."}
    if let Some(m) = text(error) {
        return Some(match text(&json["type"]) {
            Some(kind) => format!("{kind}: {m}"),
            None => m,
        });
    }
    None
}

/// Collapse whitespace and clip to `max` characters with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let mut clipped: String = collapsed.chars().take(max).collect();
    clipped.push('…');
    clipped
}

/// The first request-identifying header present.
pub fn request_id(response: &HttpResponse) -> Option<&str> {
    REQUEST_ID_HEADERS
        .iter()
        .filter_map(|name| response.header(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

fn retry_suffix(retries: usize) -> String {
    match retries {
        0 => String::new(),
        1 => ", after 1 retry".into(),
        n => format!(", after {n} retries"),
    }
}

/// Full user-facing description of a failed response.
pub fn format_failure(response: &HttpResponse, retries: usize) -> String {
    let mut detail = extract_message(&response.body);
    if detail.is_empty() {
        detail = "empty response body".into();
    }

    let mut message = format!(
        "API request failed (HTTP {}{}): {}",
        response.status,
        retry_suffix(retries),
        detail
    );

    if let Some(id) = request_id(response) {
        message.push_str(&format!(" [request id: {id}]"));
    }

    if response.status == 429 {
        message.push_str(". ");
        message.push_str(classify_rate_limit(&response.body).hint());
    }

    message
}

/// Map a failed response onto the error taxonomy.
pub fn provider_error(response: &HttpResponse, retries: usize) -> ProviderError {
    let message = format_failure(response, retries);
    match response.status {
        429 => match classify_rate_limit(&response.body) {
            RateLimitKind::QuotaExhausted => ProviderError::QuotaExhausted { message },
            RateLimitKind::RateLimited => ProviderError::RateLimited { message },
        },
        status => ProviderError::ApiError {
            status_code: status,
            message,
        },
    }
}

impl From<ExecuteError> for ProviderError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::Transport { source, retries } => ProviderError::Network(format!(
                "Network error{}: {}. Check the API URL and your connection.",
                retry_suffix(retries.len()),
                source
            )),
            ExecuteError::Cancelled { .. } => ProviderError::Cancelled,
        }
    }
}
