//! Run entry points: one document in, two styled documents and a ZIP out.
//!
//! [`process_document`] is the primary API and works on bytes. It never
//! returns `Err`: fatal problems become a failed [`ProcessingResult`] with
//! no documents attached, and a failed tagging call only degrades its own
//! batch to unclassified text.
//!
//! [`process_file`] and [`process_to_dir`] add input loading and output
//! writing around it; they return `Err` for I/O problems on the caller's
//! side (missing input, unwritable output directory).

use crate::catalog::{MarkerRules, Template};
use crate::config::ProcessingConfig;
use crate::error::StylerError;
use crate::output::{format_duration, ProcessedParagraph, ProcessingResult};
use crate::pipeline::batch::plan_windows;
use crate::pipeline::extract::extract_document;
use crate::pipeline::input::load_input;
use crate::pipeline::llm::{
    fallback_paragraphs, tag_window, CompletionBackend, ProviderBackend, UsageCounter,
};
use crate::pipeline::package::{
    compute_stats, package, SANITIZED_FILE_NAME, STYLED_FILE_NAME,
};
use crate::pipeline::parse::{attach_payloads, TagParser};
use crate::pipeline::postprocess::{PostProcessingOptions, PostProcessor};
use crate::pipeline::render::{render_sanitized, render_styled};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Tag, restyle and package one `.docx` document.
///
/// # Arguments
/// * `bytes`: the `.docx` file contents
/// * `book_name`: title of the styled document and prefix of the archive folder
/// * `template`: style and removal catalogs
/// * `post_processing`: text cleanups; `None` skips the stage
/// * `config`: batching, provider and retry settings
///
/// # Example
/// ```rust,no_run
/// use docstyler::{process_document, ProcessingConfig, Template};
///
/// # #[tokio::main]
/// # async fn main() {
/// let bytes = std::fs::read("simulado.docx").unwrap();
/// let result = process_document(
///     &bytes,
///     "Simulado 1",
///     &Template::default(),
///     None,
///     &ProcessingConfig::default(),
/// )
/// .await;
/// println!("{} ({})", result.success, result.processing_time);
/// # }
/// ```
pub async fn process_document(
    bytes: &[u8],
    book_name: &str,
    template: &Template,
    post_processing: Option<&PostProcessingOptions>,
    config: &ProcessingConfig,
) -> ProcessingResult {
    let start = Instant::now();
    info!("Starting run: {}", book_name);

    let outcome = run(bytes, book_name, template, post_processing, config).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(mut result) => {
            result.elapsed_ms = elapsed_ms;
            result.processing_time = format_duration(elapsed_ms);
            stage(config, 100, "Done");
            if let Some(ref cb) = config.progress_callback {
                cb.on_run_complete(true);
            }
            info!("Run complete in {}", result.processing_time);
            result
        }
        Err(e) => {
            error!("Run failed: {}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_run_complete(false);
            }
            ProcessingResult::failure(e.to_string(), elapsed_ms)
        }
    }
}

async fn run(
    bytes: &[u8],
    book_name: &str,
    template: &Template,
    post_processing: Option<&PostProcessingOptions>,
    config: &ProcessingConfig,
) -> Result<ProcessingResult, StylerError> {
    // ── Step 1: Read document ────────────────────────────────────────────
    stage(config, 5, "Reading document");
    template.validate()?;
    let rules = MarkerRules::compile(template)?;
    let document = extract_document(bytes)?;
    let paragraphs = document.paragraphs;
    info!("Document has {} paragraphs", paragraphs.len());

    // ── Step 2: Plan batches ─────────────────────────────────────────────
    stage(config, 20, "Analysing document structure");
    let windows = plan_windows(&paragraphs, config.batch_size, config.context_size);
    let total_batches = windows.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(paragraphs.len(), total_batches);
    }

    // ── Step 3: Resolve completion backend ───────────────────────────────
    // An empty document makes no calls and needs no credentials.
    let backend = if windows.is_empty() {
        None
    } else {
        Some(resolve_backend(config)?)
    };

    // ── Step 4: Tag and parse every batch, in order ──────────────────────
    let mut usage = UsageCounter::default();
    let mut records: Vec<ProcessedParagraph> = Vec::with_capacity(paragraphs.len());
    let mut parser = TagParser::new(&rules);

    if let Some(backend) = backend.as_deref() {
        for window in &windows {
            let batch_num = window.index + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_start(batch_num, total_batches);
            }

            let before = records.len();
            match tag_window(backend, window, template, paragraphs.len(), config, &mut usage).await {
                Ok(batch) => {
                    for unit in &batch.units {
                        parser.parse_unit(unit, &mut records);
                    }
                    debug!(
                        "Batch {}/{}: {} records in {}ms",
                        batch_num,
                        total_batches,
                        records.len() - before,
                        batch.duration_ms
                    );
                }
                Err(e) => {
                    warn!("{}; keeping the batch as unclassified text", e);
                    usage.failed_batches += 1;
                    parser.push_untagged(fallback_paragraphs(window), &mut records);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_batch_error(batch_num, total_batches, &e.to_string());
                    }
                }
            }

            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_complete(batch_num, total_batches, records.len() - before);
            }
            let done = window.end();
            let percent = (20 + 50 * done / paragraphs.len()).min(70) as u8;
            stage(
                config,
                percent,
                &format!("Processed {done}/{} paragraphs", paragraphs.len()),
            );
        }
    }
    parser.finish(&mut records);
    let attached = attach_payloads(&mut records, &document.blocks, &template.styles);
    if attached < document.blocks.len() {
        debug!(
            "{} of {} tables/images kept as plain text",
            document.blocks.len() - attached,
            document.blocks.len()
        );
    }

    let kept = records.iter().filter(|r| !r.remove).count();
    info!(
        "Tagged {} records ({} kept) in {} calls, {} failed",
        records.len(),
        kept,
        usage.calls,
        usage.failed_batches
    );

    // ── Step 5: Post-process ─────────────────────────────────────────────
    if let Some(options) = post_processing {
        stage(config, 65, "Applying post-processing");
        PostProcessor::new(options).apply(&mut records);
    }

    // ── Step 6: Render styled document ───────────────────────────────────
    stage(config, 70, "Applying styles and formatting");
    let styled = render_styled(&records, &template.styles, book_name)?;

    // ── Step 7: Render sanitized document ────────────────────────────────
    stage(config, 85, "Creating layout-ready document");
    let sanitized = render_sanitized(&records, &template.styles)?;

    // ── Step 8: Package ──────────────────────────────────────────────────
    stage(config, 90, "Packaging files");
    let bundle = package(book_name, &styled, &sanitized)?;
    let stats = compute_stats(paragraphs.len(), &records, &usage, config);

    Ok(ProcessingResult {
        success: true,
        styled_document: Some(styled),
        sanitized_document: Some(sanitized),
        archive: Some(bundle.archive),
        archive_name: Some(bundle.archive_name),
        stats: Some(stats),
        files: bundle.files,
        ..Default::default()
    })
}

/// Load `input` (path or URL) and run [`process_document`] on it.
///
/// `book_name` defaults to the input's file stem.
///
/// # Errors
/// Loading fails before any processing, so these come back as `Err`, not as
/// a failed result: a missing or unreadable path, a failed or timed-out
/// download, and [`StylerError::NotADocx`] for bytes that are not a ZIP
/// container. Everything after loading (including a ZIP that is not a
/// valid `.docx`) is reported by [`process_document`] as `Ok` with
/// `success: false`.
pub async fn process_file(
    input: impl AsRef<str>,
    book_name: Option<&str>,
    template: &Template,
    post_processing: Option<&PostProcessingOptions>,
    config: &ProcessingConfig,
) -> Result<ProcessingResult, StylerError> {
    let loaded = load_input(input.as_ref(), config.download_timeout_secs).await?;
    let book_name = book_name.unwrap_or(&loaded.stem);
    Ok(process_document(&loaded.bytes, book_name, template, post_processing, config).await)
}

/// Run [`process_file`] and write the outputs under `output_dir`.
///
/// On success writes `{archive_name}` and a `{folder}/` with both
/// documents, each atomically (temp file in the same directory, then
/// rename). The manifest paths of the returned result point at the written
/// files. A failed run writes nothing and is returned as is.
pub async fn process_to_dir(
    input: impl AsRef<str>,
    output_dir: impl AsRef<Path>,
    book_name: Option<&str>,
    template: &Template,
    post_processing: Option<&PostProcessingOptions>,
    config: &ProcessingConfig,
) -> Result<ProcessingResult, StylerError> {
    let mut result = process_file(input, book_name, template, post_processing, config).await?;
    if !result.success {
        return Ok(result);
    }

    let (Some(archive_name), Some(archive), Some(styled), Some(sanitized)) = (
        result.archive_name.as_deref(),
        result.archive.as_deref(),
        result.styled_document.as_deref(),
        result.sanitized_document.as_deref(),
    ) else {
        return Err(StylerError::Internal(
            "successful run without output documents".into(),
        ));
    };

    let output_dir = output_dir.as_ref();
    let folder = output_dir.join(archive_name.trim_end_matches(".zip"));
    write_atomic(&output_dir.join(archive_name), archive)?;

    let mut written: Vec<(String, PathBuf)> = Vec::with_capacity(2);
    for (name, bytes) in [(STYLED_FILE_NAME, styled), (SANITIZED_FILE_NAME, sanitized)] {
        let path = folder.join(name);
        write_atomic(&path, bytes)?;
        written.push((name.to_string(), path));
    }

    for file in &mut result.files {
        if let Some((_, path)) = written.iter().find(|(name, _)| *name == file.name) {
            file.path = path.display().to_string();
        }
    }

    info!("Wrote outputs to {}", folder.display());
    Ok(result)
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    bytes: &[u8],
    book_name: &str,
    template: &Template,
    post_processing: Option<&PostProcessingOptions>,
    config: &ProcessingConfig,
) -> Result<ProcessingResult, StylerError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| StylerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_document(
            bytes,
            book_name,
            template,
            post_processing,
            config,
        )))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn stage(config: &ProcessingConfig, percent: u8, message: &str) {
    debug!("[{:>3}%] {}", percent, message);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(percent, message);
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StylerError> {
    let write_err = |source: std::io::Error| StylerError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn resolve_backend(config: &ProcessingConfig) -> Result<Arc<dyn CompletionBackend>, StylerError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(ProviderBackend::new(provider, config)))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, StylerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StylerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), API key read from
///    the environment by [`ProviderFactory::create_llm_provider`].
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured even when several API keys are present.
/// 4. **OpenAI key** (`OPENAI_API_KEY`) with the configured or default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ProcessingConfig) -> Result<Arc<dyn LLMProvider>, StylerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StylerError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
