//! Tag parsing: tagged model output → [`ProcessedParagraph`] records.
//!
//! The model answers with one tagged paragraph per line or block, e.g.
//!
//! ```text
//! [P3] <ENUNCIADO>1. Qual é a capital do Brasil?</ENUNCIADO>
//! [P4] <ALTERNATIVA>a) São Paulo</ALTERNATIVA>
//! ```
//!
//! Each line is classified in priority order: removal boundary, catalog
//! style (template order, first match wins), explicit `<normal>`, and
//! finally untagged text. Lines that are empty once tags are stripped
//! produce nothing.
//!
//! ## Removal spans
//!
//! The removal prompts ask the model to mark only the first and last
//! paragraph of a span. The parser therefore keeps span state: every record
//! parsed between a START and the END of the same pair is flagged `remove`.
//! The state lives in one [`TagParser`] per run, so a span may cross batch
//! boundaries.
//!
//! Only the END of the open pair closes it. A START or END of another pair
//! seen while a span is open is dropped as a marker and changes nothing; an
//! END with no open span is dropped the same way. A line carrying both
//! markers of one pair is a span of that line alone.

use crate::catalog::{Boundary, MarkerRules, SpanId, Style};
use crate::pipeline::extract::EmbeddedBlock;
use crate::output::ProcessedParagraph;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static RE_PARAGRAPH_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[P\d+\]\s*").unwrap());

static RE_ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static RE_NORMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<normal>(.*?)</normal>").unwrap());

/// Line-oriented parser with removal-span state for one run.
#[derive(Debug)]
pub struct TagParser<'r> {
    rules: &'r MarkerRules,
    /// Pair and output index of the START record of the open span.
    open_span: Option<(SpanId, usize)>,
}

impl<'r> TagParser<'r> {
    pub fn new(rules: &'r MarkerRules) -> Self {
        Self {
            rules,
            open_span: None,
        }
    }

    /// Parse one response unit (one or more lines) and append its records.
    ///
    /// Returns the number of records appended.
    pub fn parse_unit(&mut self, unit: &str, out: &mut Vec<ProcessedParagraph>) -> usize {
        let before = out.len();
        for line in unit.lines() {
            if let Some(record) = self.parse_line(line, out.len()) {
                out.push(record);
            }
        }
        out.len() - before
    }

    /// Append records that did not come from the model, e.g. the fallback
    /// of a failed batch.
    ///
    /// They sit where the batch's paragraphs sit in the document, so they
    /// inherit the open span: flagged `remove` when a span is open, and
    /// restored by [`finish`](Self::finish) like any other record if that
    /// span is never closed.
    pub fn push_untagged(
        &mut self,
        records: impl IntoIterator<Item = ProcessedParagraph>,
        out: &mut Vec<ProcessedParagraph>,
    ) -> usize {
        let before = out.len();
        let inside = self.open_span.is_some();
        out.extend(records.into_iter().map(|mut record| {
            record.remove = inside;
            record
        }));
        out.len() - before
    }

    /// Close the run.
    ///
    /// A span still open at the end of the document means the model never
    /// emitted the END marker; the records after the START are restored
    /// rather than losing the rest of the document.
    pub fn finish(self, out: &mut [ProcessedParagraph]) {
        if let Some((_, start)) = self.open_span {
            let restored = out.len().saturating_sub(start + 1);
            warn!(
                "Removal span opened at record {} was never closed; keeping {} records",
                start, restored
            );
            for record in out.iter_mut().skip(start + 1) {
                if record.style.is_some() {
                    record.remove = false;
                }
            }
        }
    }

    fn parse_line(&mut self, line: &str, position: usize) -> Option<ProcessedParagraph> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let line = RE_PARAGRAPH_NUMBER.replace(line, "");

        if let Some(boundary) = self.rules.boundary(&line) {
            self.apply_boundary(boundary, position);
            return Some(ProcessedParagraph::boundary(strip_tags(&line)));
        }

        let mut record = self.classify(&line)?;
        record.remove = self.open_span.is_some();
        Some(record)
    }

    fn apply_boundary(&mut self, boundary: Boundary, position: usize) {
        let open = self.open_span.as_ref().map(|(id, _)| id.clone());
        match (boundary, open) {
            (Boundary::Start(id), None) => self.open_span = Some((id, position)),
            (Boundary::End(id), Some(open)) if open == id => self.open_span = None,
            (Boundary::StartEnd(_), _) => {}
            (marker, open) => debug!("Stray removal marker {:?} (open span: {:?})", marker, open),
        }
    }

    fn classify(&self, line: &str) -> Option<ProcessedParagraph> {
        for rule in self.rules.styles() {
            if let Some(inner) = rule.capture(line) {
                return Some(ProcessedParagraph::styled(
                    inner.trim(),
                    rule.style_id.as_str(),
                    rule.element_type,
                ));
            }
        }

        if let Some(caps) = RE_NORMAL.captures(line) {
            return Some(ProcessedParagraph::normal(caps[1].trim()));
        }

        let text = strip_tags(line);
        if text.is_empty() {
            None
        } else {
            Some(ProcessedParagraph::normal(text))
        }
    }
}

/// Remove all tag markup and a `[P{n}]` marker from `line`.
pub fn strip_tags(line: &str) -> String {
    let without_tags = RE_ANY_TAG.replace_all(line, "");
    RE_PARAGRAPH_NUMBER
        .replace(without_tags.trim(), "")
        .trim()
        .to_string()
}

/// Parse a complete tagged text in one go.
pub fn parse_tagged_text(text: &str, rules: &MarkerRules) -> Vec<ProcessedParagraph> {
    let mut parser = TagParser::new(rules);
    let mut out = Vec::new();
    parser.parse_unit(text, &mut out);
    parser.finish(&mut out);
    out
}

/// Give the extractor's tables and images back to the records carrying
/// their text.
///
/// Only text styles are offered to the model, so a block is found by its
/// flattened text (whitespace-insensitive), scanning forward in document
/// order. The record takes the payload, the block's element type and the
/// first catalog style of that element type, if the template has one.
/// Returns the number of blocks attached.
pub fn attach_payloads(
    records: &mut [ProcessedParagraph],
    blocks: &[EmbeddedBlock],
    styles: &[Style],
) -> usize {
    let squash = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut cursor = 0;
    let mut attached = 0;

    for block in blocks {
        let wanted = squash(&block.text);
        let found = records[cursor..].iter().position(|r| {
            r.style.is_some() && r.payload.is_none() && squash(&r.text) == wanted
        });
        let Some(offset) = found else {
            debug!("No record carries block at slot {}; left as text", block.index);
            continue;
        };

        let record = &mut records[cursor + offset];
        let element_type = block.payload.element_type();
        record.element_type = element_type;
        if let Some(style) = styles.iter().find(|s| s.element_type == element_type) {
            record.style = Some(style.id.clone());
        }
        record.payload = Some(block.payload.clone());
        cursor += offset + 1;
        attached += 1;
    }
    attached
}
