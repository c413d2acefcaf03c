//! Tagging calls: send one window to the completion endpoint and get back
//! the tagged units for its body paragraphs.
//!
//! This module is intentionally thin: prompt wording lives in
//! [`crate::prompts`], tag interpretation in [`crate::pipeline::parse`].
//! What stays here is the call itself, retry/backoff, the per-call timeout,
//! response splitting and the positional context trim.
//!
//! ## Failure model
//!
//! [`tag_window`] returns `Result<TaggedBatch, BatchError>`. The driver
//! never propagates the error: it calls [`fallback_paragraphs`] and keeps
//! going, so one bad batch cannot void the whole document.
//!
//! ## Context trim
//!
//! The first `context.len()` response units are assumed to echo the context
//! paragraphs and are dropped by position. If the model merges or reorders
//! paragraphs this trim is off by the difference; nothing here tries to
//! re-align by `[P{n}]` numbers.

use crate::catalog::Template;
use crate::config::ProcessingConfig;
use crate::error::BatchError;
use crate::output::ProcessedParagraph;
use crate::pipeline::batch::Window;
use crate::prompts::{build_batch_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

static RE_NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[P\d+\]").unwrap());

/// Raw answer of one completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The completion endpoint, as seen by the tagging client.
///
/// Implemented by [`ProviderBackend`] for every `edgequake-llm` provider.
/// Tests and hosts with their own gateway implement it directly.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one system instruction and one user message, return the text.
    ///
    /// `batch` is the 0-based window index, for error reporting.
    async fn complete(&self, batch: usize, system: &str, user: &str) -> Result<Completion, BatchError>;
}

/// [`CompletionBackend`] over an `edgequake-llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessingConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    async fn complete(&self, batch: usize, system: &str, user: &str) -> Result<Completion, BatchError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| BatchError::Provider {
                batch,
                retries: 0,
                detail: e.to_string(),
            })?;
        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Build `CompletionOptions` from the run config.
fn build_options(config: &ProcessingConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Calls and tokens spent by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounter {
    /// Batches dispatched, successful or not. Retries are not counted.
    pub calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub failed_batches: usize,
}

/// Tagged units for a window's body paragraphs, context already dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBatch {
    pub index: usize,
    pub units: Vec<String>,
    pub duration_ms: u64,
}

/// Upper bound of a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// saturating, capped at [`MAX_BACKOFF_MS`].
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Tag one window.
///
/// Counts one call, then tries up to `1 + max_retries` times with
/// exponential backoff (`retry_backoff_ms * 2^(attempt-1)`, capped at one
/// minute), each attempt bounded by `api_timeout_secs`.
pub async fn tag_window(
    backend: &dyn CompletionBackend,
    window: &Window<'_>,
    template: &Template,
    total_paragraphs: usize,
    config: &ProcessingConfig,
    usage: &mut UsageCounter,
) -> Result<TaggedBatch, BatchError> {
    let start = Instant::now();
    let batch = window.index;
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let user = build_batch_prompt(window, template, total_paragraphs);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    usage.calls += 1;

    let mut last_err: Option<BatchError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "Batch {}: retry {}/{} after {}ms",
                batch + 1,
                attempt,
                config.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let outcome = match timeout(call_timeout, backend.complete(batch, system, &user)).await {
            Ok(result) => result,
            Err(_) => Err(BatchError::Timeout {
                batch,
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(completion) => {
                usage.input_tokens += completion.input_tokens;
                usage.output_tokens += completion.output_tokens;
                debug!(
                    "Batch {}: {} input tokens, {} output tokens, {:?}",
                    batch + 1,
                    completion.input_tokens,
                    completion.output_tokens,
                    start.elapsed()
                );

                let units = trim_context(split_units(&completion.content), window.context.len());
                if units.is_empty() {
                    last_err = Some(BatchError::EmptyResponse { batch });
                    continue;
                }
                if units.len() != window.body.len() {
                    debug!(
                        "Batch {}: {} units for {} paragraphs",
                        batch + 1,
                        units.len(),
                        window.body.len()
                    );
                }

                return Ok(TaggedBatch {
                    index: batch,
                    units,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                warn!("Batch {}: attempt {} failed: {}", batch + 1, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(BatchError::Provider { detail, .. }) => BatchError::Provider {
            batch,
            retries: config.max_retries,
            detail,
        },
        Some(other) => other,
        None => BatchError::EmptyResponse { batch },
    })
}

/// Split a response into one unit per tagged paragraph.
///
/// Units are separated by blank lines. A block whose lines all start with
/// their own `[P{n}]` number is split further, one unit per line, because
/// models often answer with single newlines.
pub fn split_units(content: &str) -> Vec<String> {
    let normalised = content.replace("\r\n", "\n");
    RE_BLANK_LINE
        .split(&normalised)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .flat_map(|block| {
            let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
            if lines.len() > 1 && lines.iter().all(|l| RE_NUMBERED_LINE.is_match(l)) {
                lines.into_iter().map(|l| l.trim().to_string()).collect()
            } else {
                vec![block.to_string()]
            }
        })
        .collect()
}

/// Drop the first `context_len` units.
pub fn trim_context(mut units: Vec<String>, context_len: usize) -> Vec<String> {
    let n = context_len.min(units.len());
    units.drain(..n);
    units
}

/// Records for a window whose call failed: every body paragraph as
/// unclassified, kept text.
pub fn fallback_paragraphs(window: &Window<'_>) -> Vec<ProcessedParagraph> {
    window
        .body
        .iter()
        .map(|text| ProcessedParagraph::normal(text.as_str()))
        .collect()
}
