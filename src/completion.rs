//! Outbound AI capability: a single completion request.
//!
//! The summariser depends only on [`CompletionService`], so tests can swap in
//! a deterministic fake and the production adapter can be any provider
//! `edgequake-llm` supports. [`LlmCompletion`] is that adapter: it resolves a
//! provider once, sends one system + user message pair per call and maps
//! provider failures onto [`UpstreamError`].

use crate::config::IngestConfig;
use crate::error::{ConfigError, UpstreamError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Model identifier, for logs; the provider is already bound to a model.
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Something that turns a prompt into text.
///
/// Implementations perform exactly one upstream call per invocation and do
/// not retry; retry policy belongs to the caller.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError>;
}

/// [`CompletionService`] over an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmCompletion {
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for LlmCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCompletion").finish_non_exhaustive()
    }
}

impl LlmCompletion {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the provider from the configuration, most specific first:
    ///
    /// 1. **Pre-built provider** (`config.provider`), used as-is.
    /// 2. **Named provider** (`config.provider_name`) with `config.model`.
    /// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
    ///    when both are set.
    /// 4. **OpenAI** when `OPENAI_API_KEY` is set, with `config.model`.
    /// 5. **Auto-detection** via `ProviderFactory::from_env`.
    pub fn from_config(config: &IngestConfig) -> Result<Self, ConfigError> {
        if let Some(ref provider) = config.provider {
            return Ok(Self::new(Arc::clone(provider)));
        }

        if let Some(ref name) = config.provider_name {
            return create_provider(name, &config.model).map(Self::new);
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                return create_provider(&prov, &model).map(Self::new);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                return create_provider("openai", &config.model).map(Self::new);
            }
        }

        let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
            ConfigError(format!(
                "no LLM provider could be auto-detected from the environment; \
                 set OPENAI_API_KEY or configure a provider ({e})"
            ))
        })?;
        info!("Auto-detected LLM provider");
        Ok(Self::new(llm_provider))
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ConfigError> {
    info!("Using LLM provider '{}' with model '{}'", name, model);
    ProviderFactory::create_llm_provider(name, model)
        .map_err(|e| ConfigError(format!("provider '{name}' is not configured: {e}")))
}

#[async_trait]
impl CompletionService for LlmCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.user.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "Completion from {}: {} input tokens, {} output tokens",
            request.model, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(UpstreamError::InvalidResponse {
                detail: "empty completion".to_string(),
            });
        }
        Ok(response.content)
    }
}

static RE_RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry[- ]after[^0-9]{0,8}(\d+)").unwrap());

/// Map a provider error message onto the upstream taxonomy.
pub fn classify_provider_error(message: &str) -> UpstreamError {
    let lower = message.to_lowercase();
    let rate_limited = ["429", "rate limit", "ratelimit", "too many requests", "quota"]
        .iter()
        .any(|m| lower.contains(m));
    if rate_limited {
        let retry_after_secs = RE_RETRY_AFTER
            .captures(message)
            .and_then(|c| c[1].parse().ok());
        return UpstreamError::RateLimited { retry_after_secs };
    }

    let malformed = ["failed to parse", "deserializ", "invalid response", "unexpected response format"]
        .iter()
        .any(|m| lower.contains(m));
    if malformed {
        return UpstreamError::InvalidResponse {
            detail: message.to_string(),
        };
    }

    UpstreamError::Unavailable {
        detail: message.to_string(),
    }
}
