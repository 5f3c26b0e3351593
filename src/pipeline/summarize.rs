//! Summarisation client: prompt budget, one completion, retry with backoff.
//!
//! ## Prompt budget
//!
//! Long documents do not fit in a prompt. [`build_excerpt`] keeps the lead of
//! the text (where titles, abstracts and introductions live) plus a tail slice
//! (where conclusions live) and drops the middle behind an explicit marker.
//! The number of omitted characters is passed to the model as a hint and
//! logged, never silently lost.
//!
//! ## Retry
//!
//! `Unavailable` and `RateLimited` are retried up to `max_retries` times with
//! capped exponential backoff and full jitter. Every call has its own timeout
//! and the whole operation has a deadline; once the deadline would be crossed
//! the last error is returned. `InvalidResponse` is never retried.

use crate::completion::{CompletionRequest, CompletionService};
use crate::config::IngestConfig;
use crate::error::UpstreamError;
use crate::model::ExtractedContent;
use crate::pipeline::postprocess::clean_summary;
use crate::prompts::{self, StructuralHints, EMPTY_DOCUMENT_SUMMARY};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// The part of the extracted text that is sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    /// Characters left out; zero when the whole text fits.
    pub omitted_chars: usize,
}

/// Fit `text` into `budget` characters, keeping the lead and the tail.
///
/// The lead receives `round(budget * lead_fraction)` characters and the tail
/// the rest. Cuts fall on char boundaries.
pub fn build_excerpt(text: &str, budget: usize, lead_fraction: f32) -> Excerpt {
    let total = text.chars().count();
    if total <= budget {
        return Excerpt {
            text: text.to_string(),
            omitted_chars: 0,
        };
    }

    let lead_chars = ((budget as f32) * lead_fraction.clamp(0.0, 1.0)).round() as usize;
    let lead_chars = lead_chars.min(budget);
    let tail_chars = budget - lead_chars;
    let omitted = total - budget;

    let lead_end = byte_offset(text, lead_chars);
    let tail_start = byte_offset(text, total - tail_chars);

    let mut out = String::with_capacity(lead_end + (text.len() - tail_start) + 48);
    out.push_str(text[..lead_end].trim_end());
    out.push_str(&prompts::omission_marker(omitted));
    out.push_str(text[tail_start..].trim_start());

    Excerpt {
        text: out,
        omitted_chars: omitted,
    }
}

/// Byte offset of the `n`-th char, or the end of the string.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Retry and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Timeout of a single call.
    pub call_timeout: Duration,
    /// Deadline of the whole operation, all attempts and sleeps included.
    pub deadline: Duration,
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based).
    ///
    /// The ceiling doubles per attempt up to `max_backoff`; the actual sleep
    /// is drawn uniformly from `0..=ceiling`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }

    fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Everything the summariser needs from [`IngestConfig`].
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub max_prompt_chars: usize,
    pub lead_fraction: f32,
    pub max_summary_chars: usize,
    pub retry: RetryPolicy,
}

impl From<&IngestConfig> for SummarizerSettings {
    fn from(config: &IngestConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(&config.language, config.summary_words));
        Self {
            system_prompt,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_prompt_chars: config.max_prompt_chars,
            lead_fraction: config.lead_fraction,
            max_summary_chars: config.max_summary_chars,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                initial_backoff: Duration::from_millis(config.retry_backoff_ms),
                max_backoff: Duration::from_millis(config.max_backoff_ms),
                call_timeout: Duration::from_secs(config.api_timeout_secs),
                deadline: Duration::from_secs(config.summarize_deadline_secs),
            },
        }
    }
}

/// A finished summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// Characters of extracted text that were not sent upstream.
    pub omitted_chars: usize,
    /// Upstream calls made, successful one included.
    pub attempts: u32,
}

/// Turns extracted content into a summary through a [`CompletionService`].
pub struct Summarizer {
    service: Arc<dyn CompletionService>,
    settings: SummarizerSettings,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Summarizer {
    pub fn new(service: Arc<dyn CompletionService>, settings: SummarizerSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    /// Summarise `content`.
    ///
    /// Text that is empty after trimming yields the fixed
    /// [`EMPTY_DOCUMENT_SUMMARY`] without calling upstream.
    pub async fn summarize(&self, content: &ExtractedContent) -> Result<Summary, UpstreamError> {
        if content.text.trim().is_empty() {
            info!("No extractable text; using the fixed empty-document summary");
            return Ok(Summary {
                text: EMPTY_DOCUMENT_SUMMARY.to_string(),
                omitted_chars: 0,
                attempts: 0,
            });
        }

        let s = &self.settings;
        let excerpt = build_excerpt(&content.text, s.max_prompt_chars, s.lead_fraction);
        if excerpt.omitted_chars > 0 {
            info!(
                "Text is {} chars; sending {} and omitting {}",
                content.text_length(),
                s.max_prompt_chars,
                excerpt.omitted_chars
            );
        }

        let hints = StructuralHints {
            pages: content.page_count,
            images: content.image_count,
            tables: content.table_count,
            omitted_chars: excerpt.omitted_chars,
        };
        let request = CompletionRequest {
            system: s.system_prompt.clone(),
            user: prompts::user_message(&hints, &excerpt.text),
            model: s.model.clone(),
            max_tokens: s.max_tokens,
            temperature: s.temperature,
        };

        let (raw, attempts) = self.complete_with_retry(&request).await?;
        let text = clean_summary(&raw, s.max_summary_chars);
        if text.is_empty() {
            return Err(UpstreamError::InvalidResponse {
                detail: "completion was empty after cleanup".to_string(),
            });
        }

        Ok(Summary {
            text,
            omitted_chars: excerpt.omitted_chars,
            attempts,
        })
    }

    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<(String, u32), UpstreamError> {
        let policy = &self.settings.retry;
        let deadline = Instant::now() + policy.deadline;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let limit = policy.call_timeout.min(remaining);

            let err = match timeout(limit, self.service.complete(request)).await {
                Ok(Ok(text)) => {
                    debug!("Completion succeeded on attempt {}", attempt);
                    return Ok((text, attempt));
                }
                Ok(Err(e)) => e,
                Err(_) => UpstreamError::Unavailable {
                    detail: format!("completion call timed out after {}ms", limit.as_millis()),
                },
            };

            if !err.is_transient() {
                warn!("Completion failed with a non-retryable error: {}", err);
                return Err(err);
            }
            if attempt > policy.max_retries {
                warn!("Completion failed after {} attempts: {}", attempt, err);
                return Err(err);
            }

            let mut wait = policy.backoff(attempt);
            if let UpstreamError::RateLimited {
                retry_after_secs: Some(secs),
            } = err
            {
                wait = wait.max(Duration::from_secs(secs));
            }
            if Instant::now() + wait >= deadline {
                warn!(
                    "Completion failed and the deadline leaves no room for a retry: {}",
                    err
                );
                return Err(err);
            }

            warn!(
                "Completion attempt {} failed ({}); retry {}/{} in {}ms",
                attempt,
                err,
                attempt,
                policy.max_retries,
                wait.as_millis()
            );
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractionStatus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted results, then keeps answering with the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<String, UpstreamError>>>,
        calls: AtomicU32,
        last_user: Mutex<String>,
        delay: Duration,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Self::with_delay(script, Duration::ZERO)
        }

        fn with_delay(script: Vec<Result<String, UpstreamError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                last_user: Mutex::new(String::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user.lock().unwrap() = request.user.clone();
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn settings() -> SummarizerSettings {
        let mut s = SummarizerSettings::from(&IngestConfig::default());
        s.retry = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(10),
        };
        s
    }

    fn content(text: &str) -> ExtractedContent {
        ExtractedContent {
            text: text.to_string(),
            page_count: 3,
            image_count: 1,
            table_count: 2,
            size_mb: 0.1,
            status: ExtractionStatus::Complete,
        }
    }

    fn unavailable() -> Result<String, UpstreamError> {
        Err(UpstreamError::Unavailable {
            detail: "503".into(),
        })
    }

    #[test]
    fn short_text_is_sent_whole() {
        let e = build_excerpt("hello world", 100, 0.8);
        assert_eq!(e.text, "hello world");
        assert_eq!(e.omitted_chars, 0);
    }

    #[test]
    fn long_text_keeps_lead_and_tail() {
        let text = format!("{}{}{}", "A".repeat(100), "M".repeat(1000), "Z".repeat(100));
        let e = build_excerpt(&text, 200, 0.8);
        assert_eq!(e.omitted_chars, 1000);
        assert!(e.text.starts_with(&"A".repeat(100)));
        assert!(e.text.ends_with(&"Z".repeat(40)));
        assert!(e.text.contains("1000 characters omitted"));
        assert_eq!(e.text.matches('Z').count(), 40);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let text = "ї".repeat(500);
        let e = build_excerpt(&text, 101, 0.5);
        assert_eq!(e.omitted_chars, 399);
        assert_eq!(e.text.matches('ї').count(), 101);
    }

    #[test]
    fn backoff_stays_under_ceiling() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            call_timeout: Duration::from_secs(1),
            deadline: Duration::from_secs(1),
        };
        assert_eq!(policy.ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.ceiling(5), Duration::from_millis(300));
        for attempt in 1..=5 {
            assert!(policy.backoff(attempt) <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn empty_text_makes_no_call() {
        let svc = Scripted::new(vec![Ok("unused".into())]);
        let summarizer = Summarizer::new(svc.clone(), settings());
        let summary = summarizer.summarize(&content("  \n ")).await.unwrap();
        assert_eq!(summary.text, EMPTY_DOCUMENT_SUMMARY);
        assert_eq!(summary.attempts, 0);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_is_cleaned_and_hinted() {
        let svc = Scripted::new(vec![Ok("```\nThe report covers Q3.\n```".into())]);
        let summarizer = Summarizer::new(svc.clone(), settings());
        let summary = summarizer.summarize(&content("Q3 report body")).await.unwrap();
        assert_eq!(summary.text, "The report covers Q3.");
        assert_eq!(summary.attempts, 1);
        let user = svc.last_user.lock().unwrap().clone();
        assert!(user.contains("pages: 3"));
        assert!(user.contains("tables: 2"));
        assert!(user.contains("Q3 report body"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let svc = Scripted::new(vec![unavailable(), unavailable(), Ok("Done.".into())]);
        let summarizer = Summarizer::new(svc.clone(), settings());
        let summary = summarizer.summarize(&content("text")).await.unwrap();
        assert_eq!(summary.text, "Done.");
        assert_eq!(summary.attempts, 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let svc = Scripted::new(vec![unavailable()]);
        let summarizer = Summarizer::new(svc.clone(), settings());
        let err = summarizer.summarize(&content("text")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn invalid_response_is_not_retried() {
        let svc = Scripted::new(vec![Err(UpstreamError::InvalidResponse {
            detail: "garbage".into(),
        })]);
        let summarizer = Summarizer::new(svc.clone(), settings());
        let err = summarizer.summarize(&content("text")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_unavailable() {
        let svc = Scripted::with_delay(vec![Ok("late".into())], Duration::from_millis(500));
        let mut s = settings();
        s.retry.max_retries = 1;
        s.retry.call_timeout = Duration::from_millis(20);
        let summarizer = Summarizer::new(svc.clone(), s);
        let err = summarizer.summarize(&content("text")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deadline_stops_retries() {
        let svc = Scripted::new(vec![Err(UpstreamError::RateLimited {
            retry_after_secs: Some(30),
        })]);
        let mut s = settings();
        s.retry.deadline = Duration::from_secs(2);
        let summarizer = Summarizer::new(svc.clone(), s);
        let started = std::time::Instant::now();
        let err = summarizer.summarize(&content("text")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::RateLimited { .. }));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn blank_completion_is_invalid() {
        let svc = Scripted::new(vec![Ok("```\n\n```".into())]);
        let summarizer = Summarizer::new(svc, settings());
        let err = summarizer.summarize(&content("text")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse { .. }));
    }
}
