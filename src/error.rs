//! Error types for the docstyler library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StylerError`] (**fatal**): the run cannot produce an output at all
//!   (unreadable document, invalid template, archive generation failed).
//!   The top-level [`crate::process::process_document`] turns it into a
//!   failed [`crate::output::ProcessingResult`]; nothing partial is exposed.
//!
//! * [`BatchError`] (**non-fatal**): one tagging call failed (timeout,
//!   rate limit, quota, empty response). The affected batch falls back to
//!   unclassified `normal` paragraphs and the run continues.
//!
//! Invalid custom removal patterns are not errors at all: the
//! post-processor falls back to literal matching and logs a warning.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docstyler library.
#[derive(Debug, Error)]
pub enum StylerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes do not start with a ZIP local-file header.
    #[error("'{source_name}' is not a .docx document\nFirst bytes: {magic:?}")]
    NotADocx { source_name: String, magic: [u8; 4] },

    /// The document container or its body XML could not be parsed.
    #[error("Unreadable document: {detail}")]
    UnreadableDocument { detail: String },

    // ── Catalog errors ────────────────────────────────────────────────────
    /// The style/removal catalog violates an invariant.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// A DOCX renderer could not serialise its document.
    #[error("Failed to render '{document}': {detail}")]
    RenderFailed { document: String, detail: String },

    /// The ZIP bundle could not be generated.
    #[error("Failed to generate archive: {detail}")]
    ArchiveFailed { detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable failure of a single tagging call.
///
/// Never propagated past the driver: the batch is re-emitted as `normal`
/// text and the error only shows up in logs and `failed_batches`.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    /// The provider rejected or failed the request.
    #[error("Batch {batch}: completion failed after {retries} retries: {detail}")]
    Provider {
        batch: usize,
        retries: u32,
        detail: String,
    },

    /// The completion call did not return in time.
    #[error("Batch {batch}: completion timed out after {secs}s")]
    Timeout { batch: usize, secs: u64 },

    /// The endpoint answered with nothing usable.
    #[error("Batch {batch}: completion returned no tagged paragraphs")]
    EmptyResponse { batch: usize },
}
