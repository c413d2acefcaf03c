//! Document assembly: processed records → the two `.docx` outputs.
//!
//! Both renderers are pure functions of the records and the catalog. Records
//! flagged `remove` never reach either document, whatever their style.
//!
//! * [`render_styled`] applies each style's direct formatting and is meant
//!   to be read as is.
//! * [`render_sanitized`] carries no formatting at all: every line is
//!   prefixed with its style name so a layout tool can map paragraphs to
//!   its own styles, and a manifest at the top lists the mapping.
//!
//! Sizes are in half-points and spacing in twentieths of a point, as in
//! WordprocessingML.

use crate::catalog::{Alignment, Style, StyleFormatting};
use crate::error::StylerError;
use crate::output::{Payload, ProcessedParagraph};
use crate::pipeline::extract::flatten_rows;
use docx_rs::{
    AlignmentType, Docx, LineSpacing, Paragraph, Run, StyleType, Table, TableCell, TableRow,
};
use std::io::Cursor;
use tracing::debug;

const TITLE_SIZE: usize = 32;
const TITLE_COLOR: &str = "1e40af";
const TITLE_SPACING_AFTER: u32 = 400;

const BODY_SIZE: usize = 24;
const BODY_COLOR: &str = "000000";
const BODY_SPACING_AFTER: u32 = 200;

const MANIFEST_SIZE: usize = 20;
const SANITIZED_SPACING_AFTER: u32 = 120;

const HEADING_STYLE_ID: &str = "Heading2";
const FALLBACK_STYLE_NAME: &str = "Normal";

pub const MANIFEST_START: &str = "[INDESIGN_STYLES_START]";
pub const MANIFEST_END: &str = "[INDESIGN_STYLES_END]";

/// Render the formatted document: a title, then every kept record with its
/// style's formatting.
pub fn render_styled(
    records: &[ProcessedParagraph],
    styles: &[Style],
    title: &str,
) -> Result<Vec<u8>, StylerError> {
    let mut docx = Docx::new()
        .add_style(
            docx_rs::Style::new(HEADING_STYLE_ID, StyleType::Paragraph).name("Heading 2"),
        )
        .add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .line_spacing(LineSpacing::new().after(TITLE_SPACING_AFTER))
                .add_run(
                    Run::new()
                        .add_text(title)
                        .bold()
                        .size(TITLE_SIZE)
                        .color(TITLE_COLOR),
                ),
        );

    let mut written = 0usize;
    for record in records.iter().filter(|r| !r.remove) {
        let style = record
            .style
            .as_deref()
            .and_then(|id| styles.iter().find(|s| s.id == id));

        match &record.payload {
            Some(Payload::Table { rows }) => {
                docx = docx.add_table(table(rows));
            }
            Some(Payload::Image { description }) => {
                docx = docx.add_paragraph(styled_paragraph(description, style));
            }
            None => {
                docx = docx.add_paragraph(styled_paragraph(&record.text, style));
            }
        }
        written += 1;
    }

    debug!("Styled document: {} paragraphs", written);
    pack(docx, "styled document")
}

/// Render the style-tagged plain document for page-layout import.
pub fn render_sanitized(
    records: &[ProcessedParagraph],
    styles: &[Style],
) -> Result<Vec<u8>, StylerError> {
    let manifest_line = |text: &str| {
        Paragraph::new().add_run(Run::new().add_text(text).size(MANIFEST_SIZE))
    };

    let mut docx = Docx::new().add_paragraph(manifest_line(MANIFEST_START));
    for style in styles {
        docx = docx.add_paragraph(manifest_line(&format!(
            "[STYLE_DEF] {} = {}",
            style.word_style, style.marker
        )));
    }
    docx = docx.add_paragraph(
        manifest_line(MANIFEST_END).line_spacing(LineSpacing::new().after(TITLE_SPACING_AFTER)),
    );

    let mut written = 0usize;
    for record in records.iter().filter(|r| !r.remove) {
        let name = record
            .style
            .as_deref()
            .and_then(|id| styles.iter().find(|s| s.id == id))
            .map(|s| s.word_style.as_str())
            .unwrap_or(FALLBACK_STYLE_NAME);
        let text = match &record.payload {
            Some(Payload::Image { description }) => description.clone(),
            Some(Payload::Table { rows }) => flatten_rows(rows),
            None => record.text.clone(),
        };

        docx = docx.add_paragraph(
            Paragraph::new()
                .line_spacing(LineSpacing::new().after(SANITIZED_SPACING_AFTER))
                .add_run(
                    Run::new()
                        .add_text(format!("[{name}] {text}"))
                        .size(BODY_SIZE),
                ),
        );
        written += 1;
    }

    debug!("Sanitized document: {} paragraphs", written);
    pack(docx, "sanitized document")
}

fn styled_paragraph(text: &str, style: Option<&Style>) -> Paragraph {
    let default_formatting = StyleFormatting::default();
    let formatting = style
        .and_then(|s| s.formatting.as_ref())
        .unwrap_or(&default_formatting);

    let mut run = Run::new()
        .add_text(text)
        .size(
            formatting
                .font_size
                .map(|pt| pt as usize * 2)
                .unwrap_or(BODY_SIZE),
        )
        .color(
            formatting
                .color
                .as_deref()
                .map(|c| c.trim_start_matches('#'))
                .filter(|c| !c.is_empty())
                .unwrap_or(BODY_COLOR),
        );
    if formatting.bold == Some(true) {
        run = run.bold();
    }
    if formatting.italic == Some(true) {
        run = run.italic();
    }
    if formatting.underline == Some(true) {
        run = run.underline("single");
    }

    let mut paragraph = Paragraph::new()
        .align(alignment_type(formatting.alignment.unwrap_or_default()))
        .line_spacing(LineSpacing::new().after(BODY_SPACING_AFTER))
        .add_run(run);

    if style.is_some_and(|s| s.word_style.to_lowercase().contains("heading")) {
        paragraph = paragraph.style(HEADING_STYLE_ID);
    }
    paragraph
}

fn alignment_type(alignment: Alignment) -> AlignmentType {
    match alignment {
        Alignment::Left => AlignmentType::Left,
        Alignment::Center => AlignmentType::Center,
        Alignment::Right => AlignmentType::Right,
        Alignment::Justify => AlignmentType::Both,
    }
}

fn table(rows: &[Vec<String>]) -> Table {
    let rows = rows
        .iter()
        .map(|row| {
            TableRow::new(
                row.iter()
                    .map(|cell| {
                        TableCell::new()
                            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(cell)))
                    })
                    .collect(),
            )
        })
        .collect();
    Table::new(rows)
}

fn pack(docx: Docx, document: &str) -> Result<Vec<u8>, StylerError> {
    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| StylerError::RenderFailed {
            document: document.to_string(),
            detail: e.to_string(),
        })?;
    Ok(buf.into_inner())
}
