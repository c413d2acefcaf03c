//! Post-processing: deterministic text cleanup of tagged records.
//!
//! Runs after every batch is parsed and before rendering. Only `text` is
//! touched; style and removal flags are final by the time records get here.
//!
//! ## Rule order
//!
//! 1. Question numbering (`1.`, `2)`, `Q3:`, `4 -`) on question records
//! 2. Alternative letters (`a)`, `(b)`, `[c].`) on alternative records
//! 3. Custom removal patterns, in the order given
//! 4. Trim
//!
//! Numbering and letters go first so a custom pattern anchored at `^`
//! sees the text a reader sees. Every rule only removes text, which makes
//! the whole pass idempotent.

use crate::output::{ProcessedParagraph, ALTERNATIVE_STYLE};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

static RE_QUESTION_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+[.)]\s*|Q\d+:?\s*|\d+\s*-\s*)").unwrap());

static RE_ALTERNATIVE_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:\(?[a-e][.)]\)?|\[[a-e]\][.)]?)\s*").unwrap());

/// Which cleanups to run. All off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostProcessingOptions {
    pub remove_question_numbers: bool,
    pub remove_alternative_letters: bool,
    /// Regular expressions removed from every kept record.
    pub custom_removals: Vec<String>,
}

impl PostProcessingOptions {
    /// True if [`PostProcessor::apply`] would change nothing.
    pub fn is_noop(&self) -> bool {
        !self.remove_question_numbers
            && !self.remove_alternative_letters
            && self.custom_removals.iter().all(|p| p.is_empty())
    }
}

/// Compiled form of [`PostProcessingOptions`].
#[derive(Debug, Clone)]
pub struct PostProcessor {
    question_numbers: bool,
    alternative_letters: bool,
    custom: Vec<Regex>,
}

impl PostProcessor {
    /// Compile the custom patterns.
    ///
    /// A pattern that is not a valid regex is matched literally instead;
    /// the caller's run never fails over a typo in a removal pattern.
    pub fn new(options: &PostProcessingOptions) -> Self {
        let custom = options
            .custom_removals
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|pattern| compile_custom(pattern))
            .collect();

        Self {
            question_numbers: options.remove_question_numbers,
            alternative_letters: options.remove_alternative_letters,
            custom,
        }
    }

    /// Clean every record not flagged for removal, in place.
    pub fn apply(&self, records: &mut [ProcessedParagraph]) {
        for record in records.iter_mut().filter(|r| !r.remove) {
            record.text = self.clean(record);
        }
    }

    fn clean(&self, record: &ProcessedParagraph) -> String {
        let mut text = record.text.clone();

        if self.question_numbers && record.is_question() {
            text = RE_QUESTION_NUMBER.replace(&text, "").into_owned();
        }
        if self.alternative_letters && record.style_is(ALTERNATIVE_STYLE) {
            text = RE_ALTERNATIVE_LETTER.replace(&text, "").into_owned();
        }
        for re in &self.custom {
            text = re.replace_all(&text, "").into_owned();
        }

        text.trim().to_string()
    }
}

fn compile_custom(pattern: &str) -> Option<Regex> {
    let build = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
    match build(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid removal pattern {:?} ({}); matching it literally", pattern, e);
            build(&regex::escape(pattern)).ok()
        }
    }
}
