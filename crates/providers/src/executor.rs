//! Resilient request executor.
//!
//! Issues one logical request as a strictly sequential series of attempts.
//! Every attempt first waits on the cooldown gate for its endpoint, so a
//! rate limit discovered by one caller throttles every other caller of the
//! same upstream. Retry-worthy statuses (`408`, `409`, `429`, `5xx`) and
//! transport failures share one retry budget; any other failure is handed
//! back on first sight.

use crate::backoff::{compute_backoff, effective_delay, retry_hint};
use crate::cooldown::{CooldownRegistry, origin_key};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
use parlance_config::{AppConfig, RetryConfig};
use parlance_core::provider::RetryEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry budget and backoff bounds for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(750),
            max_delay: Duration::from_millis(20_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Statuses worth another attempt.
pub fn is_retry_worthy(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || (500..600).contains(&status)
}

/// The settled outcome of [`ResilientExecutor::execute`]: the last response
/// received (successful or not) and every retry that preceded it.
#[derive(Debug, Clone)]
pub struct Execution {
    pub response: HttpResponse,
    pub retries: Vec<RetryEvent>,
}

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Overrides the executor's policy for this call
    pub policy: Option<RetryPolicy>,

    /// Receives each retry event as it happens
    pub observer: Option<UnboundedSender<RetryEvent>>,

    /// Aborts the call at the next suspension point
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// No response after the retry budget was spent.
    #[error("{source}")]
    Transport {
        source: TransportError,
        retries: Vec<RetryEvent>,
    },

    #[error("request cancelled")]
    Cancelled { retries: Vec<RetryEvent> },
}

impl ExecuteError {
    pub fn retries(&self) -> &[RetryEvent] {
        match self {
            Self::Transport { retries, .. } | Self::Cancelled { retries } => retries,
        }
    }
}

/// Sends requests through a transport, retrying transient failures under a
/// shared cooldown.
pub struct ResilientExecutor {
    transport: Arc<dyn HttpTransport>,
    cooldowns: Arc<CooldownRegistry>,
    policy: RetryPolicy,
}

impl ResilientExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, cooldowns: Arc<CooldownRegistry>) -> Self {
        Self {
            transport,
            cooldowns,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Production executor: `reqwest` transport with the configured timeout,
    /// cooldown scope and retry policy.
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs));
        let cooldowns = CooldownRegistry::new(config.retry.cooldown_scope);
        Self::new(Arc::new(transport), Arc::new(cooldowns))
            .with_policy(RetryPolicy::from_config(&config.retry))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cooldowns(&self) -> &Arc<CooldownRegistry> {
        &self.cooldowns
    }

    pub async fn execute(&self, request: &HttpRequest) -> Result<Execution, ExecuteError> {
        self.execute_with(request, &ExecuteOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        request: &HttpRequest,
        options: &ExecuteOptions,
    ) -> Result<Execution, ExecuteError> {
        let policy = options.policy.unwrap_or(self.policy);
        let cancel = options.cancel.as_ref();
        let gate = self.cooldowns.gate_for(&request.url);
        let origin = origin_key(&request.url);
        let mut retries: Vec<RetryEvent> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            if cancellable(cancel, gate.wait()).await.is_none() {
                return Err(ExecuteError::Cancelled { retries });
            }

            debug!(origin = %origin, attempt, "Sending request");

            let Some(outcome) = cancellable(cancel, self.transport.send(request)).await else {
                return Err(ExecuteError::Cancelled { retries });
            };

            let exhausted = attempt >= policy.max_retries;

            let (status, error, hint) = match outcome {
                Ok(response) if response.is_success() => {
                    return Ok(Execution { response, retries });
                }
                Ok(response) => {
                    let hint = retry_hint(&response, chrono::Utc::now());
                    if exhausted || !is_retry_worthy(response.status) {
                        // A final 429 still tells everyone else to back off.
                        if response.status == 429 {
                            if let Some(hint) = hint {
                                gate.bump(hint);
                            }
                        }
                        warn!(
                            origin = %origin,
                            status = response.status,
                            retries = retries.len(),
                            "Request failed"
                        );
                        return Ok(Execution { response, retries });
                    }
                    (Some(response.status), None, hint)
                }
                Err(source) => {
                    if exhausted {
                        warn!(
                            origin = %origin,
                            error = %source,
                            retries = retries.len(),
                            "Request failed without a response"
                        );
                        return Err(ExecuteError::Transport { source, retries });
                    }
                    (None, Some(source.0), None)
                }
            };

            let backoff = compute_backoff(attempt + 1, policy.base_delay, policy.max_delay);
            let delay = effective_delay(hint, backoff);
            gate.bump(delay);

            let event = RetryEvent {
                attempt,
                status,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error,
            };

            warn!(
                origin = %origin,
                attempt,
                status = ?event.status,
                delay_ms = event.delay_ms,
                hinted = hint.is_some(),
                "Retrying request"
            );

            if let Some(observer) = &options.observer {
                // A dropped receiver only means nobody is watching.
                let _ = observer.send(event.clone());
            }
            retries.push(event);

            if cancellable(cancel, tokio::time::sleep(delay)).await.is_none() {
                return Err(ExecuteError::Cancelled { retries });
            }

            attempt += 1;
        }
    }
}

/// Run `future` unless the token fires first.
async fn cancellable<F: Future>(token: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match token {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}
