//! # docstyler
//!
//! Tag the paragraphs of a Word document with an LLM and rebuild it as two
//! `.docx` files: one with the template's formatting applied, one plain
//! version with every paragraph prefixed by its style name for import into
//! a page-layout tool.
//!
//! ## How it works
//!
//! The document's text is cut into batches of paragraphs. Each batch is sent
//! to a chat model together with the template's style catalog ("enunciado:
//! question statements that start with a number…") and the model answers
//! with every paragraph wrapped in a tag. Tags become style ids, removal
//! markers drop whole spans (cover pages, answer sheets), and optional
//! cleanups strip question numbers and alternative letters.
//!
//! ```text
//! .docx
//!  │
//!  ├─ 1. Extract   paragraphs from word/document.xml
//!  ├─ 2. Batch     windows of 25 with 3 paragraphs of context
//!  ├─ 3. Tag       one chat call per window (retry, timeout, fallback)
//!  ├─ 4. Parse     tags → styled records, removal spans resolved
//!  ├─ 5. Clean     numbering / letters / custom patterns
//!  ├─ 6. Render    styled .docx + layout-ready .docx
//!  └─ 7. Package   ZIP bundle + statistics
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstyler::{process_file, PostProcessingOptions, ProcessingConfig, Template};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ProcessingConfig::default();
//!     let cleanup = PostProcessingOptions {
//!         remove_question_numbers: true,
//!         ..Default::default()
//!     };
//!     let result = process_file("simulado.docx", None, &Template::default(), Some(&cleanup), &config).await?;
//!     if let Some(stats) = result.stats {
//!         eprintln!("{} questions, {} calls", stats.questions_processed, stats.api_calls);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docstyler` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docstyler = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{
    Alignment, Boundary, ElementType, MarkerRules, RemovalPrompt, SpanId, Style, StyleFormatting,
    Template,
};
pub use config::{ProcessingConfig, ProcessingConfigBuilder};
pub use error::{BatchError, StylerError};
pub use output::{OutputFile, Payload, ProcessedParagraph, ProcessingResult, ProcessingStats};
pub use pipeline::batch::{plan_windows, Window};
pub use pipeline::extract::{
    extract_document, extract_paragraphs, flatten_rows, EmbeddedBlock, ExtractedDocument,
};
pub use pipeline::llm::{
    fallback_paragraphs, tag_window, Completion, CompletionBackend, ProviderBackend, TaggedBatch,
    UsageCounter,
};
pub use pipeline::package::{compute_stats, format_file_size, package, Package};
pub use pipeline::parse::{attach_payloads, parse_tagged_text, TagParser};
pub use pipeline::postprocess::{PostProcessingOptions, PostProcessor};
pub use pipeline::render::{render_sanitized, render_styled};
pub use process::{process_document, process_file, process_sync, process_to_dir};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
