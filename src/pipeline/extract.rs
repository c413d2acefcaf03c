//! Paragraph extraction: `.docx` bytes → plain paragraph strings.
//!
//! A `.docx` is a ZIP archive whose body lives in `word/document.xml`. We
//! stream that XML with `quick-xml` instead of building a DOM: only the
//! text of `w:t` runs, tabs and line breaks matter here, and no style or
//! semantic information leaves this stage.
//!
//! Line breaks (`w:br`, `w:cr`) split a paragraph into separate entries,
//! the same way a raw-text export splits on newlines. Every entry is
//! trimmed and empty ones are dropped, so they never consume an index slot
//! downstream.
//!
//! Two kinds of content take one slot and also leave an [`EmbeddedBlock`]:
//!
//! - a top-level table (`w:tbl`), flattened to `a | b / c | d` with its
//!   cells kept as [`Payload::Table`] rows;
//! - a paragraph holding only a drawing, flattened to `[Imagem: …]` from
//!   the drawing's description (`wp:docPr`) and kept as [`Payload::Image`].

use crate::catalog::ElementType;
use crate::error::StylerError;
use crate::output::Payload;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

/// A table or image found at one paragraph slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedBlock {
    /// Slot in [`ExtractedDocument::paragraphs`].
    pub index: usize,
    /// The flattened text sent to the model for this slot.
    pub text: String,
    pub payload: Payload,
}

/// Paragraph strings plus the structured blocks among them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub paragraphs: Vec<String>,
    /// In document order.
    pub blocks: Vec<EmbeddedBlock>,
}

impl ExtractedDocument {
    fn push_block(&mut self, text: String, payload: Payload) {
        self.blocks.push(EmbeddedBlock {
            index: self.paragraphs.len(),
            text: text.clone(),
            payload,
        });
        self.paragraphs.push(text);
    }
}

impl Payload {
    pub fn element_type(&self) -> ElementType {
        match self {
            Payload::Image { .. } => ElementType::Image,
            Payload::Table { .. } => ElementType::Table,
        }
    }
}

/// Extract the ordered, non-empty, trimmed paragraphs of a `.docx`.
///
/// # Errors
/// [`StylerError::UnreadableDocument`] if the bytes are not a ZIP archive,
/// the archive has no `word/document.xml`, or the XML is malformed.
pub fn extract_paragraphs(bytes: &[u8]) -> Result<Vec<String>, StylerError> {
    Ok(extract_document(bytes)?.paragraphs)
}

/// [`extract_paragraphs`] plus the tables and images among them.
pub fn extract_document(bytes: &[u8]) -> Result<ExtractedDocument, StylerError> {
    let xml = read_document_part(bytes)?;
    let document = document_from_xml(&xml)?;
    debug!(
        "Extracted {} paragraphs ({} tables/images)",
        document.paragraphs.len(),
        document.blocks.len()
    );
    Ok(document)
}

fn read_document_part(bytes: &[u8]) -> Result<String, StylerError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| StylerError::UnreadableDocument {
            detail: format!("not a ZIP container: {e}"),
        })?;

    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| StylerError::UnreadableDocument {
            detail: format!("missing {DOCUMENT_PART}: {e}"),
        })?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| StylerError::UnreadableDocument {
            detail: format!("cannot read {DOCUMENT_PART}: {e}"),
        })?;
    Ok(xml)
}

/// Text and drawing description of one open `w:p`.
#[derive(Default)]
struct OpenParagraph {
    text: String,
    drawing: Option<String>,
    /// A drawing with a picture (`a:blip`), not a text box or shape.
    picture: bool,
}

/// The top-level table being read.
#[derive(Default)]
struct OpenTable {
    rows: Vec<Vec<String>>,
    cell: Option<String>,
}

impl OpenTable {
    fn finish(self) -> Option<Vec<Vec<String>>> {
        let rows: Vec<Vec<String>> = self
            .rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();
        (!rows.is_empty()).then_some(rows)
    }
}

/// Walk `word/document.xml` and collect paragraph text.
///
/// Paragraphs nest (text boxes inside a run, cells inside a table row
/// inside a paragraph-less body), so open paragraphs are kept on a stack
/// and each is emitted when its `w:p` closes. Inside a table they feed the
/// current cell instead; nested tables fold into the outer cell.
fn document_from_xml(xml: &str) -> Result<ExtractedDocument, StylerError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<OpenParagraph> = Vec::new();
    let mut document = ExtractedDocument::default();
    let mut table: Option<OpenTable> = None;
    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut run_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => stack.push(OpenParagraph::default()),
                b"r" => run_depth += 1,
                b"t" => in_text = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table = Some(OpenTable::default());
                    }
                }
                b"tr" if table_depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        t.rows.push(Vec::new());
                    }
                }
                b"tc" if table_depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        t.cell = Some(String::new());
                    }
                }
                b"docPr" => note_drawing(&e, stack.last_mut()),
                b"blip" => note_picture(stack.last_mut()),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" | b"cr" if run_depth > 0 => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push('\n');
                    }
                }
                b"tab" if run_depth > 0 => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push('\t');
                    }
                }
                b"docPr" => note_drawing(&e, stack.last_mut()),
                b"blip" => note_picture(stack.last_mut()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| StylerError::UnreadableDocument {
                    detail: format!("bad text at byte {}: {e}", reader.buffer_position()),
                })?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    let Some(done) = stack.pop() else { continue };
                    match table.as_mut().and_then(|t| t.cell.as_mut()) {
                        Some(cell) => append_to_cell(cell, &done.text),
                        None => push_paragraph(&mut document, done),
                    }
                }
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"t" => in_text = false,
                b"tc" if table_depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        if let Some(cell) = t.cell.take() {
                            if let Some(row) = t.rows.last_mut() {
                                row.push(cell);
                            }
                        }
                    }
                }
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 {
                        if let Some(rows) = table.take().and_then(OpenTable::finish) {
                            let text = flatten_rows(&rows);
                            document.push_block(text, Payload::Table { rows });
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(StylerError::UnreadableDocument {
                    detail: format!(
                        "malformed {DOCUMENT_PART} at byte {}: {e}",
                        reader.buffer_position()
                    ),
                })
            }
            _ => {}
        }
    }

    Ok(document)
}

/// Remember the description of a drawing anchored in the open paragraph.
fn note_drawing(e: &BytesStart<'_>, paragraph: Option<&mut OpenParagraph>) {
    let Some(paragraph) = paragraph else { return };
    let mut descr = None;
    let mut name = None;
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else { continue };
        match attr.key.local_name().as_ref() {
            b"descr" => descr = Some(value.trim().to_string()),
            b"name" => name = Some(value.trim().to_string()),
            _ => {}
        }
    }
    let description = descr
        .filter(|d| !d.is_empty())
        .or(name.filter(|n| !n.is_empty()))
        .unwrap_or_else(|| "imagem".to_string());
    paragraph.drawing.get_or_insert(description);
}

fn note_picture(paragraph: Option<&mut OpenParagraph>) {
    if let Some(paragraph) = paragraph {
        paragraph.picture = true;
    }
}

fn push_paragraph(document: &mut ExtractedDocument, paragraph: OpenParagraph) {
    if paragraph.text.trim().is_empty() {
        if let Some(description) = paragraph.drawing.filter(|_| paragraph.picture) {
            let text = format!("[Imagem: {description}]");
            document.push_block(text, Payload::Image { description });
        }
        return;
    }
    push_lines(&mut document.paragraphs, &paragraph.text);
}

fn append_to_cell(cell: &mut String, paragraph: &str) {
    let text = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return;
    }
    if !cell.is_empty() {
        cell.push(' ');
    }
    cell.push_str(&text);
}

/// `a | b / c | d`
pub fn flatten_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join(" / ")
}

fn push_lines(out: &mut Vec<String>, paragraph: &str) {
    out.extend(
        paragraph
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string),
    );
}
