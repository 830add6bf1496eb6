//! The reply pipeline: resolve the endpoint, compose, execute.

use crate::context::composer::{ComposedPrompt, PromptComposer, PromptSources};
use crate::context::window::{ConversationWindow, WindowLimits};
use crate::scenario::Scenario;
use parlance_config::{AppConfig, ApiEndpointConfig, ConfigError, EndpointSource};
use parlance_core::error::ProviderError;
use parlance_core::partner::Partner;
use parlance_core::provider::{Provider, ProviderRequest, RetryEvent, Usage};
use parlance_providers::{OpenAiCompatProvider, ResilientExecutor};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A partner's reply and how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub retries: Vec<RetryEvent>,
    /// Estimated size of the request payload
    pub prompt_tokens_estimate: usize,
}

/// Generates partner replies. Holds the shared executor, so one pipeline
/// should serve every chat, call and co-listening session of the process.
pub struct ChatPipeline {
    executor: Arc<ResilientExecutor>,
    observer: Option<UnboundedSender<RetryEvent>>,
    cancel: Option<CancellationToken>,
}

impl ChatPipeline {
    pub fn new(executor: Arc<ResilientExecutor>) -> Self {
        Self {
            executor,
            observer: None,
            cancel: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(ResilientExecutor::from_config(config)))
    }

    /// Receive retry events as they happen.
    pub fn with_observer(mut self, observer: UnboundedSender<RetryEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the payload for one turn without sending it.
    pub fn compose(
        config: &AppConfig,
        partner: &Partner,
        sources: PromptSources<'_>,
        scenario: &Scenario,
        user_message: &str,
    ) -> ComposedPrompt {
        let composer = PromptComposer::new(config, sources);
        let toggles = scenario.toggles(config.feature_toggles(partner));

        let mut window =
            ConversationWindow::build(&partner.log, WindowLimits::from(&config.history));
        if let Some(tail) = scenario.history_tail(&config.history) {
            window = window.keep_last(tail);
        }

        let block = scenario.instructions(&partner.name);
        composer.compose(partner, &toggles, &window, block.as_deref(), user_message)
    }

    /// Generate the partner's next reply.
    ///
    /// `config` is read fresh on every call; endpoint settings are never
    /// cached between calls.
    pub async fn reply(
        &self,
        config: &AppConfig,
        partner: &Partner,
        sources: PromptSources<'_>,
        scenario: &Scenario,
        user_message: &str,
    ) -> Result<Reply, ProviderError> {
        let endpoint = config
            .resolve_endpoint(partner.custom_api.as_ref())
            .map_err(not_configured)?;

        let composed = Self::compose(config, partner, sources, scenario, user_message);
        let provider = self.provider_for(endpoint);

        let request = ProviderRequest {
            model: provider.endpoint().model.clone(),
            messages: composed.messages,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        };

        info!(
            partner = %partner.name,
            scenario = scenario.label(),
            provider = %provider.name(),
            model = %request.model,
            tokens = composed.total_tokens,
            "Requesting reply"
        );

        let response = provider.complete(request).await.inspect_err(|e| {
            warn!(partner = %partner.name, scenario = scenario.label(), error = %e, "Reply failed");
        })?;

        Ok(Reply {
            content: response.message.content,
            model: response.model,
            usage: response.usage,
            retries: response.retries,
            prompt_tokens_estimate: composed.total_tokens,
        })
    }

    /// Models offered by the endpoint `partner` would use.
    pub async fn list_models(
        &self,
        config: &AppConfig,
        partner: Option<&Partner>,
    ) -> Result<Vec<String>, ProviderError> {
        let custom = partner.and_then(|p| p.custom_api.as_ref());
        // Listing is how a model gets picked, so none is required yet.
        let endpoint = config.resolve_connection(custom).map_err(not_configured)?;

        self.provider_for(endpoint).list_models().await
    }

    fn provider_for(&self, endpoint: ApiEndpointConfig) -> OpenAiCompatProvider {
        let name = match endpoint.source {
            EndpointSource::Global => "global",
            EndpointSource::Partner => "partner",
        };
        let mut provider = OpenAiCompatProvider::new(name, endpoint, self.executor.clone());
        if let Some(observer) = &self.observer {
            provider = provider.with_observer(observer.clone());
        }
        if let Some(token) = &self.cancel {
            provider = provider.with_cancellation(token.clone());
        }
        provider
    }
}

fn not_configured(err: ConfigError) -> ProviderError {
    ProviderError::NotConfigured(err.to_string())
}
