//! Prompts for the paragraph tagging calls.
//!
//! Every prompt lives here so a wording change never touches retry or
//! parsing logic. Callers can override the system instruction via
//! [`crate::config::ProcessingConfig::system_prompt`]; the batch prompt is
//! always built from the run's template.

use crate::catalog::{ElementType, Template};
use crate::pipeline::batch::Window;
use std::fmt::Write;

/// Default system instruction for tagging a batch of paragraphs.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an assistant specialised in formatting educational documents.
Analyse the text and tag EVERY paragraph with the appropriate XML-like tag.

Follow these rules precisely:
- Tag ALL paragraphs, even those that match no specific style (use <normal> for ordinary text)
- Keep the exact order and the exact number of paragraphs
- Keep each paragraph's [P#] number at the start of its line
- Separate paragraphs with a blank line
- For removals, output the start and end markers exactly as listed
- Do NOT add commentary or explanations"#;

/// Build the user prompt for one window.
///
/// Layout: position header, text-style catalog, removal catalog, the
/// numbered paragraphs (context first), and an output example. Numbering
/// is global and 1-based so `[P{n}]` points at the same paragraph in every
/// batch that mentions it.
pub fn build_batch_prompt(window: &Window<'_>, template: &Template, total_paragraphs: usize) -> String {
    let context_len = window.context.len();
    let first = window.start - context_len + 1;
    let last = window.start + window.body.len();

    let mut prompt = String::with_capacity(4096);
    let _ = writeln!(
        prompt,
        "Context: analysing paragraphs {first} to {last} of a total of {total_paragraphs}."
    );
    if context_len > 0 {
        let _ = writeln!(
            prompt,
            "Note: the first {context_len} paragraphs are context from the previous batch (already processed)."
        );
    }

    prompt.push_str("\nAVAILABLE STYLES:\n");
    for style in template
        .styles
        .iter()
        .filter(|s| s.element_type == ElementType::Text)
    {
        let _ = writeln!(prompt, "<{}> - {}", style.tag(), style.prompt);
    }

    prompt.push_str("\nREMOVALS:\n");
    for removal in &template.removal_prompts {
        let _ = writeln!(
            prompt,
            "{} and {} - {}",
            removal.start_marker, removal.end_marker, removal.prompt
        );
    }

    prompt.push_str("\nTEXT TO ANALYSE:\n");
    for (offset, paragraph) in window.paragraphs().enumerate() {
        let _ = writeln!(prompt, "[P{}] {}", first + offset, paragraph);
    }

    prompt.push_str(
        "\nRETURN the tagged text keeping the [P#] numbering, one paragraph per block separated by a blank line.\n\
Example output:\n\
[P1] <TITULO_SIMULADO>Simulado 1</TITULO_SIMULADO>\n\n\
[P2] <normal>Plain text with no specific style</normal>\n\n\
[P3] <ENUNCIADO>1. Qual é a capital do Brasil?</ENUNCIADO>\n\n\
[P4] <ALTERNATIVA>a) São Paulo</ALTERNATIVA>",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Template;
    use crate::pipeline::batch::plan_windows;

    fn paragraphs(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("para {i}")).collect()
    }

    #[test]
    fn first_window_has_no_context_note() {
        let paras = paragraphs(30);
        let windows = plan_windows(&paras, 25, 3);
        let prompt = build_batch_prompt(&windows[0], &Template::default(), 30);
        assert!(prompt.contains("paragraphs 1 to 25 of a total of 30"));
        assert!(!prompt.contains("context from the previous batch"));
        assert!(prompt.contains("[P1] para 1\n"));
        assert!(prompt.contains("[P25] para 25\n"));
        assert!(!prompt.contains("[P26]"));
    }

    #[test]
    fn later_window_numbers_context_globally() {
        let paras = paragraphs(30);
        let windows = plan_windows(&paras, 25, 3);
        let prompt = build_batch_prompt(&windows[1], &Template::default(), 30);
        assert!(prompt.contains("paragraphs 23 to 30 of a total of 30"));
        assert!(prompt.contains("the first 3 paragraphs are context"));
        assert!(prompt.contains("[P23] para 23\n"));
        assert!(prompt.contains("[P26] para 26\n"));
    }

    #[test]
    fn catalogs_are_listed() {
        let paras = paragraphs(2);
        let windows = plan_windows(&paras, 25, 3);
        let prompt = build_batch_prompt(&windows[0], &Template::default(), 2);
        assert!(prompt.contains("<ENUNCIADO> - Identifique enunciados"));
        assert!(prompt.contains("[[REMOVE_INTRO_START]] and [[REMOVE_INTRO_END]] - "));
        assert!(!prompt.contains("<[[ENUNCIADO]]>"));
    }

    #[test]
    fn non_text_styles_are_not_offered() {
        let mut template = Template::default();
        template.styles[4].element_type = ElementType::Image;
        let paras = paragraphs(1);
        let windows = plan_windows(&paras, 25, 3);
        let prompt = build_batch_prompt(&windows[0], &template, 1);
        assert!(!prompt.contains("<GABARITO> - "));
    }
}
