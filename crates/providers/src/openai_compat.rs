//! OpenAI-compatible provider.
//!
//! Works with any endpoint exposing `/chat/completions` and `/models` in the
//! OpenAI shape (OpenAI, DeepSeek, OpenRouter, Ollama, vLLM, one-api style
//! relays). Every call goes through the [`ResilientExecutor`], so retries and
//! cooldowns apply uniformly.

use crate::error_format::provider_error;
use crate::executor::{ExecuteOptions, ResilientExecutor};
use crate::transport::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use parlance_config::ApiEndpointConfig;
use parlance_core::error::ProviderError;
use parlance_core::message::Message;
use parlance_core::provider::{ProviderRequest, ProviderResponse, RetryEvent, Usage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct OpenAiCompatProvider {
    name: String,
    endpoint: ApiEndpointConfig,
    executor: Arc<ResilientExecutor>,
    options: ExecuteOptions,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: ApiEndpointConfig,
        executor: Arc<ResilientExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            executor,
            options: ExecuteOptions::default(),
        }
    }

    /// Stream retry events to `observer` as they happen.
    pub fn with_observer(mut self, observer: UnboundedSender<RetryEvent>) -> Self {
        self.options.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    pub fn endpoint(&self) -> &ApiEndpointConfig {
        &self.endpoint
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect()
    }

    fn completion_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn parse_completion(
        response: &HttpResponse,
        retries: Vec<RetryEvent>,
        requested_model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_response: ApiResponse = serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Response contained no content".into()))?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage,
            model: api_response
                .model
                .unwrap_or_else(|| requested_model.to_string()),
            retries,
        })
    }
}

#[async_trait]
impl parlance_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let http = HttpRequest::post_json(url, Self::completion_body(&request))
            .bearer(self.endpoint.api_key.as_deref());

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let execution = self.executor.execute_with(&http, &self.options).await?;

        if !execution.response.is_success() {
            let err = provider_error(&execution.response, execution.retries.len());
            warn!(provider = %self.name, error = %err, "Completion failed");
            return Err(err);
        }

        let response = Self::parse_completion(&execution.response, execution.retries, &request.model)?;

        info!(
            provider = %self.name,
            model = %response.model,
            retries = response.retries.len(),
            "Completion received"
        );

        Ok(response)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.endpoint.base_url);
        let http = HttpRequest::get(url).bearer(self.endpoint.api_key.as_deref());

        let execution = self.executor.execute_with(&http, &self.options).await?;

        if !execution.response.is_success() {
            return Err(provider_error(&execution.response, execution.retries.len()));
        }

        let body: serde_json::Value = serde_json::from_str(&execution.response.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse model list: {e}")))?;

        let models = parse_model_ids(&body);
        debug!(provider = %self.name, count = models.len(), "Listed models");
        Ok(models)
    }
}

/// Model identifiers from `{data:[…]}`, `{models:[…]}` or a bare array.
/// Elements may be strings or objects with `id` (preferred) or `name`.
pub fn parse_model_ids(body: &serde_json::Value) -> Vec<String> {
    let items = body
        .as_array()
        .or_else(|| body["data"].as_array())
        .or_else(|| body["models"].as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item["id"].as_str())
                .or_else(|| item["name"].as_str())
        })
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
