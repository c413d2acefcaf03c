//! Configuration types for a document styling run.
//!
//! All run behaviour that is not part of the catalog ([`crate::catalog::Template`])
//! or the post-processing options is controlled through [`ProcessingConfig`],
//! built via its [`ProcessingConfigBuilder`]. The batch and context sizes
//! live here because the planner, the tagging client and the statistics all
//! derive their index arithmetic from the same two numbers.

use crate::error::StylerError;
use crate::pipeline::llm::CompletionBackend;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one styling run.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use docstyler::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .batch_size(20)
///     .model("gpt-4.1")
///     .build()
///     .unwrap();
/// assert_eq!(config.context_size, 3);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Paragraphs per tagging call. Default: 25.
    ///
    /// Large enough to give the model local structure (a question with its
    /// alternatives and answer), small enough that it still returns one
    /// tagged line per paragraph.
    pub batch_size: usize,

    /// Trailing paragraphs of the previous window resent as context. Default: 3.
    pub context_size: usize,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom completion backend. Takes precedence over every provider setting.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the model may generate per batch. Default: 4000.
    pub max_tokens: usize,

    /// Retry attempts on a failed tagging call before falling back. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system instruction. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Flat price of one tagging call, for the cost estimate. Default: 0.002.
    pub cost_per_call_usd: f64,

    /// Paragraphs assumed per printed page, for the page estimate. Default: 30.
    pub paragraphs_per_page: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives stage and batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            context_size: 3,
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            temperature: 0.3,
            max_tokens: 4000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
            cost_per_call_usd: 0.002,
            paragraphs_per_page: 30,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("batch_size", &self.batch_size)
            .field("context_size", &self.context_size)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn CompletionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("cost_per_call_usd", &self.cost_per_call_usd)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// Number of tagging calls a document of `paragraphs` paragraphs needs.
    pub fn batch_count(&self, paragraphs: usize) -> usize {
        paragraphs.div_ceil(self.batch_size.max(1))
    }
}

/// Builder for [`ProcessingConfig`].
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl fmt::Debug for ProcessingConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ProcessingConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn context_size(mut self, n: usize) -> Self {
        self.config.context_size = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn cost_per_call_usd(mut self, usd: f64) -> Self {
        self.config.cost_per_call_usd = usd.max(0.0);
        self
    }

    pub fn paragraphs_per_page(mut self, n: usize) -> Self {
        self.config.paragraphs_per_page = n;
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
    pub fn build(self) -> Result<ProcessingConfig, StylerError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(StylerError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.context_size >= c.batch_size {
            return Err(StylerError::InvalidConfig(format!(
                "Context size must be smaller than the batch size ({} ≥ {})",
                c.context_size, c.batch_size
            )));
        }
        if c.paragraphs_per_page == 0 {
            return Err(StylerError::InvalidConfig(
                "Paragraphs per page must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
