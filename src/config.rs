//! Configuration for the ingestion pipeline.
//!
//! Every knob lives in [`IngestConfig`], built via its [`IngestConfigBuilder`].
//! Limits, summarisation settings and the storage location sit side by side
//! so a single value can be shared across concurrent ingestions and logged
//! as a whole.

use crate::error::ConfigError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for PDF ingestion and summarisation.
///
/// # Example
/// ```rust
/// use pdf_digest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .max_pages(50)
///     .model("gpt-4o-mini")
///     .storage_dir("/tmp/pdf-digest")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 50);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Upload size ceiling in MiB. Default: 50.
    ///
    /// Compared against the raw byte length before anything is parsed.
    pub max_file_size_mb: u64,

    /// Page-count ceiling. Default: 100.
    pub max_pages: usize,

    /// Number of records returned by `get_recent` when no limit is given. Default: 5.
    pub history_limit: usize,

    /// Root directory of the artifact store. Default: `./storage`.
    pub storage_dir: PathBuf,

    /// Completion model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one summary. Default: 800.
    pub max_tokens: usize,

    /// Character budget of the document excerpt sent to the model. Default: 12 000.
    ///
    /// Longer documents keep their lead plus a tail slice; see
    /// [`crate::pipeline::summarize::build_excerpt`].
    pub max_prompt_chars: usize,

    /// Share of `max_prompt_chars` given to the start of the document. Default: 0.8.
    pub lead_fraction: f32,

    /// Hard cap on the returned summary, in characters. Default: 6 000.
    pub max_summary_chars: usize,

    /// Word budget stated in the prompt. Default: 500.
    pub summary_words: usize,

    /// Language the summary is written in. Default: "English".
    pub language: String,

    /// Retry attempts on a transient upstream failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    ///
    /// Doubles after each attempt, capped at `max_backoff_ms`, with full
    /// jitter so concurrent ingestions do not retry in lockstep.
    pub retry_backoff_ms: u64,

    /// Ceiling of a single backoff sleep in milliseconds. Default: 8 000.
    pub max_backoff_ms: u64,

    /// Timeout of one completion call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Overall deadline for summarisation, all retries included. Default: 120.
    pub summarize_deadline_secs: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds (CLI). Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer of stage transitions.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_pages: 100,
            history_limit: 5,
            storage_dir: PathBuf::from("storage"),
            model: "gpt-4o-mini".to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 800,
            max_prompt_chars: 12_000,
            lead_fraction: 0.8,
            max_summary_chars: 6_000,
            summary_words: 500,
            language: "English".to_string(),
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            api_timeout_secs: 60,
            summarize_deadline_secs: 120,
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("max_pages", &self.max_pages)
            .field("history_limit", &self.history_limit)
            .field("storage_dir", &self.storage_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("lead_fraction", &self.lead_fraction)
            .field("max_summary_chars", &self.max_summary_chars)
            .field("language", &self.language)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("summarize_deadline_secs", &self.summarize_deadline_secs)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Size ceiling in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl fmt::Debug for IngestConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl IngestConfigBuilder {
    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    pub fn history_limit(mut self, n: usize) -> Self {
        self.config.history_limit = n;
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n;
        self
    }

    pub fn lead_fraction(mut self, f: f32) -> Self {
        self.config.lead_fraction = f.clamp(0.0, 1.0);
        self
    }

    pub fn max_summary_chars(mut self, n: usize) -> Self {
        self.config.max_summary_chars = n;
        self
    }

    pub fn summary_words(mut self, n: usize) -> Self {
        self.config.summary_words = n;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn summarize_deadline_secs(mut self, secs: u64) -> Self {
        self.config.summarize_deadline_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, ConfigError> {
        let c = &self.config;
        if c.max_file_size_mb == 0 {
            return Err(ConfigError("max_file_size_mb must be ≥ 1".into()));
        }
        if c.max_pages == 0 {
            return Err(ConfigError("max_pages must be ≥ 1".into()));
        }
        if c.history_limit == 0 {
            return Err(ConfigError("history_limit must be ≥ 1".into()));
        }
        if c.max_prompt_chars < 100 {
            return Err(ConfigError(format!(
                "max_prompt_chars must be ≥ 100, got {}",
                c.max_prompt_chars
            )));
        }
        if c.max_summary_chars == 0 || c.max_tokens == 0 {
            return Err(ConfigError(
                "max_summary_chars and max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.summarize_deadline_secs == 0 {
            return Err(ConfigError("timeouts must be ≥ 1 second".into()));
        }
        if c.model.trim().is_empty() {
            return Err(ConfigError("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
