//! Batch planning: cut the paragraph sequence into tagging windows.
//!
//! One model call per paragraph loses the structure around it; one call for
//! the whole document overflows the output budget and drifts. Windows of
//! `batch_size` paragraphs are the middle ground, and each window after the
//! first re-sends the last `context_size` paragraphs before it so a
//! question split across a boundary is still recognised. The tagging client
//! drops those context results again, by position.

/// A slice of the document sent in one tagging call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    /// 0-based batch number.
    pub index: usize,
    /// Global 0-based index of the first body paragraph.
    pub start: usize,
    /// Already-tagged paragraphs resent for continuity.
    pub context: &'a [String],
    /// The paragraphs this window is responsible for.
    pub body: &'a [String],
}

impl<'a> Window<'a> {
    /// Context followed by body, in prompt order.
    pub fn paragraphs(&self) -> impl Iterator<Item = &'a String> {
        self.context.iter().chain(self.body.iter())
    }

    /// Global index one past the last body paragraph.
    pub fn end(&self) -> usize {
        self.start + self.body.len()
    }
}

/// Partition `paragraphs` into windows of `batch_size` with up to
/// `context_size` preceding paragraphs attached to every window but the first.
///
/// Returns `ceil(N / batch_size)` windows. A `batch_size` of zero is
/// treated as one.
pub fn plan_windows(paragraphs: &[String], batch_size: usize, context_size: usize) -> Vec<Window<'_>> {
    let batch_size = batch_size.max(1);
    (0..paragraphs.len())
        .step_by(batch_size)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + batch_size).min(paragraphs.len());
            let context_start = start.saturating_sub(context_size);
            Window {
                index,
                start,
                context: &paragraphs[context_start..start],
                body: &paragraphs[start..end],
            }
        })
        .collect()
}
