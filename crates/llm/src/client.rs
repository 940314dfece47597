use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use relay_core::config::LlmConfig;
use relay_core::limits::MAX_LLM_TOKENS_PER_CALL;

use crate::models::{
    cheaper_model, estimate_cost, estimate_tokens, is_known_model, model_spec, ModelSpec, Provider,
};
use crate::providers::HttpTransport;
use crate::tracker::{UsageEntry, UsageTracker};

const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    Text,
    Json,
}

/// One reasoning request. The budget ceiling is advisory: it drives
/// pre-flight model downgrades, it does not cap the metered charge.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub shape: ResponseShape,
    pub budget_usd: Option<f64>,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: model.into(),
            max_tokens: 500,
            temperature: 0.3,
            shape: ResponseShape::Text,
            budget_usd: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_json_shape(mut self) -> Self {
        self.shape = ResponseShape::Json;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.min(MAX_LLM_TOKENS_PER_CALL);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_budget(mut self, budget_usd: f64) -> Self {
        self.budget_usd = Some(budget_usd);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub model: String,
    pub duration_ms: i64,
}

impl Completion {
    pub fn tokens_used(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Clone, Debug, Error)]
pub enum ProviderError {
    #[error("no api key configured for {0}")]
    MissingApiKey(Provider),
    #[error("{provider} request failed: {message}")]
    Transport { provider: Provider, message: String },
    #[error("{provider} api error (status {status}): {body}")]
    Api { provider: Provider, status: u16, body: String },
    #[error("{provider} throttled the request")]
    RateLimited { provider: Provider, retry_after: Option<Duration> },
    #[error("attempt against {model} timed out after {after:?}")]
    Timeout { model: String, after: Duration },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// What a provider returned for one successful attempt; the client owns
/// pricing and timing.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Seam between retry orchestration and the provider wire protocols.
#[async_trait::async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn execute(
        &self,
        spec: &ModelSpec,
        request: &CompletionRequest,
    ) -> Result<RawCompletion, ProviderError>;
}

/// Client-side orchestration around the metered reasoning service:
/// pre-flight cost estimation, per-attempt timeouts, retry with backoff,
/// and model downgrade for both budget pressure and availability.
pub struct ReasoningClient {
    transport: Arc<dyn ProviderTransport>,
    tracker: Arc<UsageTracker>,
    default_model: String,
    max_retries: u32,
}

impl ReasoningClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self::with_transport(
            Arc::new(HttpTransport::from_config(config)),
            &config.default_model,
            config.max_retries,
        )
    }

    pub fn with_transport(
        transport: Arc<dyn ProviderTransport>,
        default_model: &str,
        max_retries: u32,
    ) -> Self {
        Self {
            transport,
            tracker: Arc::new(UsageTracker::new()),
            default_model: default_model.to_string(),
            max_retries,
        }
    }

    pub fn tracker(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.tracker)
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let mut model = self.resolve_model(&request.model);

        if let Some(budget_usd) = request.budget_usd {
            model = fit_model_to_budget(model, budget_usd, &request);
        }

        let started = Instant::now();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(last_error.as_ref(), attempt);
                sleep(delay).await;
                if let Some(cheaper) = cheaper_model(model) {
                    debug!(from = model, to = cheaper, attempt, "downgrading model for retry");
                    model = cheaper;
                }
            }

            let spec = model_spec(model);
            match timeout(request.timeout, self.transport.execute(spec, &request)).await {
                Ok(Ok(raw)) => {
                    let completion = Completion {
                        cost_usd: estimate_cost(spec, raw.input_tokens, raw.output_tokens),
                        text: raw.text,
                        input_tokens: raw.input_tokens,
                        output_tokens: raw.output_tokens,
                        model: model.to_string(),
                        duration_ms: started.elapsed().as_millis() as i64,
                    };
                    self.tracker.record(UsageEntry {
                        model: completion.model.clone(),
                        input_tokens: completion.input_tokens,
                        output_tokens: completion.output_tokens,
                        cost_usd: completion.cost_usd,
                        duration_ms: completion.duration_ms,
                    });
                    return Ok(completion);
                }
                Ok(Err(error)) => {
                    warn!(model, attempt, error = %error, "reasoning attempt failed");
                    last_error = Some(error);
                }
                Err(_elapsed) => {
                    warn!(model, attempt, timeout_ms = request.timeout.as_millis() as u64, "reasoning attempt timed out");
                    last_error = Some(ProviderError::Timeout {
                        model: model.to_string(),
                        after: request.timeout,
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::MalformedResponse("retry loop exhausted without an attempt".to_string())
        }))
    }

    fn resolve_model(&self, requested: &str) -> &'static str {
        if is_known_model(requested) {
            return model_spec(requested).id;
        }
        let fallback: &str =
            if is_known_model(&self.default_model) { &self.default_model } else { "gpt-4o-mini" };
        model_spec(fallback).id
    }
}

/// Walk the downgrade chain until the projected cost fits the ceiling or
/// the chain bottoms out.
fn fit_model_to_budget(
    mut model: &'static str,
    budget_usd: f64,
    request: &CompletionRequest,
) -> &'static str {
    loop {
        let spec = model_spec(model);
        let projected = estimate_cost(spec, estimate_tokens(&request.prompt), request.max_tokens);
        if projected <= budget_usd {
            return model;
        }
        match cheaper_model(model) {
            Some(cheaper) => {
                debug!(
                    from = model,
                    to = cheaper,
                    projected_usd = projected,
                    budget_usd,
                    "downgrading model for budget"
                );
                model = cheaper;
            }
            // Bottom of the chain: proceed best-effort at the cheapest model.
            None => return model,
        }
    }
}

fn retry_delay(last_error: Option<&ProviderError>, attempt: u32) -> Duration {
    if let Some(ProviderError::RateLimited { retry_after: Some(hint), .. }) = last_error {
        return *hint;
    }
    BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1))
}
