//! Pipeline stages for tagging and restyling a Word document.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own; [`crate::process`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ batch ──▶ llm ──▶ parse ──▶ postprocess ──▶ render ──▶ package
//! (path/URL) (paragraphs) (windows) (tags) (records)  (cleanup)      (2 × docx)  (zip)
//! ```
//!
//! 1. [`input`]: load the `.docx` bytes from a path or URL
//! 2. [`extract`]: ordered, trimmed, non-empty paragraph strings
//! 3. [`batch`]: windows of `batch_size` with trailing context
//! 4. [`llm`]: one tagging call per window with retry/backoff; the only
//!    stage with network I/O
//! 5. [`parse`]: tagged lines → records, removal spans resolved
//! 6. [`postprocess`]: numbering, letters and custom patterns stripped
//! 7. [`render`]: styled and sanitized documents
//! 8. [`package`]: ZIP bundle, file manifest and statistics

pub mod batch;
pub mod extract;
pub mod input;
pub mod llm;
pub mod package;
pub mod parse;
pub mod postprocess;
pub mod render;
