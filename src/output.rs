//! Pipeline records and the terminal result of a run.

use crate::catalog::ElementType;
use serde::{Deserialize, Serialize};

/// Style id given to text no catalog style claimed.
pub const NORMAL_STYLE: &str = "normal";

/// Style ids counted as tagged questions.
pub const QUESTION_STYLES: [&str; 2] = ["enunciado", "questao"];

/// Style id whose leading letters are stripped by the post-processor.
pub const ALTERNATIVE_STYLE: &str = "alternativa";

/// Non-text content carried by image and table paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Image { description: String },
    Table { rows: Vec<Vec<String>> },
}

/// One paragraph as it moves from the parser to the renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedParagraph {
    pub text: String,
    /// `None` for removal boundaries, [`NORMAL_STYLE`] for unclassified
    /// text, otherwise a catalog style id.
    pub style: Option<String>,
    pub remove: bool,
    pub element_type: ElementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl ProcessedParagraph {
    /// An unclassified text paragraph.
    pub fn normal(text: impl Into<String>) -> Self {
        Self::styled(text, NORMAL_STYLE, ElementType::Text)
    }

    pub fn styled(text: impl Into<String>, style: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            text: text.into(),
            style: Some(style.into()),
            remove: false,
            element_type,
            payload: None,
        }
    }

    /// A removal START/END marker line.
    pub fn boundary(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
            remove: true,
            element_type: ElementType::Text,
            payload: None,
        }
    }

    pub fn style_is(&self, id: &str) -> bool {
        self.style.as_deref() == Some(id)
    }

    pub fn is_question(&self) -> bool {
        QUESTION_STYLES.iter().any(|q| self.style_is(q))
    }
}

/// Summary numbers for the usage sink and the UI.
///
/// These are estimates: pages assume a fixed paragraphs-per-page ratio and
/// cost a fixed price per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_pages: usize,
    pub total_paragraphs: usize,
    pub questions_processed: usize,
    pub api_calls: usize,
    pub estimated_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub failed_batches: usize,
}

/// One entry of the output manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    /// Human readable, e.g. `"12.4 KB"`.
    pub size: String,
    pub path: String,
}

/// The terminal output of [`crate::process::process_document`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(skip)]
    pub styled_document: Option<Vec<u8>>,
    #[serde(skip)]
    pub sanitized_document: Option<Vec<u8>>,
    #[serde(skip)]
    pub archive: Option<Vec<u8>>,
    /// Archive name, `{book}_{timestamp}.zip`.
    pub archive_name: Option<String>,
    pub stats: Option<ProcessingStats>,
    pub files: Vec<OutputFile>,
    pub elapsed_ms: u64,
    /// Wall-clock time as `"{m}m {s}s"`.
    pub processing_time: String,
    pub error: Option<String>,
}

impl ProcessingResult {
    /// A failed run: no document, no archive, just the reason.
    pub fn failure(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            elapsed_ms,
            processing_time: format_duration(elapsed_ms),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Format milliseconds as `"{m}m {s}s"`.
pub fn format_duration(elapsed_ms: u64) -> String {
    let secs = (elapsed_ms + 500) / 1000;
    format!("{}m {}s", secs / 60, secs % 60)
}
