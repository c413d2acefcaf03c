//! Style and removal catalogs, and the marker rules compiled from them.
//!
//! A [`Template`] is the user-editable input of a run: an ordered list of
//! [`Style`]s (what each kind of paragraph looks like and how the model
//! should recognise it) plus [`RemovalPrompt`]s (spans to drop from the
//! output). The template is threaded explicitly through every stage; the
//! pipeline keeps no global catalog.
//!
//! Field names serialise in camelCase so templates exported by the web
//! styler (`wordStyle`, `startMarker`, `elementType`, …) load unchanged.
//!
//! ## Tag order
//!
//! [`MarkerRules`] is compiled once per run and keeps the template order
//! as an explicit array. The parser tries rules front to back and the
//! first match wins, so a marker that is a substring of another
//! (`ALT` vs `ALTERNATIVA`) behaves the same on every run.

use crate::error::StylerError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Structural kind of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    #[default]
    Text,
    Image,
    Table,
}

/// Horizontal paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// Direct formatting applied by the styled renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFormatting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    /// Font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    /// Hex colour, with or without a leading `#`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

/// A named structural category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub id: String,
    pub name: String,
    /// Paragraph style name in the output documents.
    pub word_style: String,
    /// Marker token, e.g. `[[ENUNCIADO]]`.
    pub marker: String,
    /// Natural-language rule the model uses to recognise this style.
    pub prompt: String,
    /// Display colour in the styler UI.
    #[serde(default)]
    pub color: String,
    /// 1-based rank matching the position in [`Template::styles`].
    #[serde(default)]
    pub order: usize,
    #[serde(default)]
    pub element_type: ElementType,
    /// Images that leave stray caption text behind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_residue: Option<bool>,
    /// Text blocks that may embed inline images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_inline_images: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<StyleFormatting>,
}

impl Style {
    /// The AI-facing tag name: the marker without square brackets.
    pub fn tag(&self) -> String {
        strip_brackets(&self.marker)
    }
}

/// A start/end marker pair delimiting paragraphs to drop from the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalPrompt {
    pub id: String,
    pub name: String,
    pub start_marker: String,
    pub end_marker: String,
    pub prompt: String,
}

impl RemovalPrompt {
    pub fn start_tag(&self) -> String {
        strip_brackets(&self.start_marker)
    }

    pub fn end_tag(&self) -> String {
        strip_brackets(&self.end_marker)
    }
}

fn strip_brackets(marker: &str) -> String {
    marker.replace(['[', ']'], "").trim().to_string()
}

/// The full catalog of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub styles: Vec<Style>,
    #[serde(default)]
    pub removal_prompts: Vec<RemovalPrompt>,
}

impl Template {
    /// Build a template, assigning each style its dense 1-based order.
    pub fn new(
        name: impl Into<String>,
        mut styles: Vec<Style>,
        removal_prompts: Vec<RemovalPrompt>,
    ) -> Self {
        for (i, style) in styles.iter_mut().enumerate() {
            style.order = i + 1;
        }
        Self {
            name: name.into(),
            styles,
            removal_prompts,
        }
    }

    /// Parse a template from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, StylerError> {
        let template: Template = serde_json::from_str(json)
            .map_err(|e| StylerError::InvalidTemplate(format!("malformed JSON: {e}")))?;
        template.validate()?;
        Ok(template)
    }

    pub fn to_json_pretty(&self) -> Result<String, StylerError> {
        serde_json::to_string_pretty(self).map_err(|e| StylerError::Internal(e.to_string()))
    }

    /// Look up a style by id.
    pub fn style(&self, id: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.id == id)
    }

    /// Check the catalog invariants.
    pub fn validate(&self) -> Result<(), StylerError> {
        if self.styles.is_empty() {
            return Err(StylerError::InvalidTemplate(
                "template defines no styles".into(),
            ));
        }

        let mut ids = HashSet::new();
        let mut tags = HashSet::new();
        for (i, style) in self.styles.iter().enumerate() {
            if !ids.insert(style.id.as_str()) {
                return Err(StylerError::InvalidTemplate(format!(
                    "duplicate style id '{}'",
                    style.id
                )));
            }
            let tag = style.tag();
            if tag.is_empty() {
                return Err(StylerError::InvalidTemplate(format!(
                    "style '{}' has an empty marker",
                    style.id
                )));
            }
            if !tags.insert(tag.to_uppercase()) {
                return Err(StylerError::InvalidTemplate(format!(
                    "duplicate marker {}",
                    style.marker
                )));
            }
            if style.order != i + 1 {
                return Err(StylerError::InvalidTemplate(format!(
                    "style '{}' has order {} but sits at position {}",
                    style.id,
                    style.order,
                    i + 1
                )));
            }
        }

        for removal in &self.removal_prompts {
            let (start, end) = (removal.start_tag(), removal.end_tag());
            if start.is_empty() || end.is_empty() {
                return Err(StylerError::InvalidTemplate(format!(
                    "removal '{}' has an empty marker",
                    removal.id
                )));
            }
            if start.eq_ignore_ascii_case(&end) {
                return Err(StylerError::InvalidTemplate(format!(
                    "removal '{}' uses the same start and end marker",
                    removal.id
                )));
            }
            for tag in [start, end] {
                if !tags.insert(tag.to_uppercase()) {
                    return Err(StylerError::InvalidTemplate(format!(
                        "removal '{}' marker {} collides with another marker",
                        removal.id, tag
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for Template {
    /// The "Simulado Básico" catalog for Brazilian mock exams.
    fn default() -> Self {
        let style = |id: &str,
                     name: &str,
                     word_style: &str,
                     marker: &str,
                     prompt: &str,
                     color: &str,
                     formatting: StyleFormatting| Style {
            id: id.into(),
            name: name.into(),
            word_style: word_style.into(),
            marker: marker.into(),
            prompt: prompt.into(),
            color: color.into(),
            order: 0,
            element_type: ElementType::Text,
            has_residue: None,
            allow_inline_images: None,
            formatting: Some(formatting),
        };

        let styles = vec![
            style(
                "titulo_simulado",
                "Título do Simulado",
                "Heading 1",
                "[[TITULO_SIMULADO]]",
                "Identifique títulos que contenham \"Simulado\" seguido de número (ex: Simulado 1, Simulado 2)",
                "#1e40af",
                StyleFormatting {
                    bold: Some(true),
                    font_size: Some(16),
                    alignment: Some(Alignment::Center),
                    ..Default::default()
                },
            ),
            style(
                "subtitulo_estudos",
                "Subtítulo Estudos",
                "Heading 2",
                "[[SUBTITULO_ESTUDOS]]",
                "Identifique subtítulos que contenham \"Estudos\" seguido de intervalo (ex: Estudos 1 a 10)",
                "#7c3aed",
                StyleFormatting {
                    bold: Some(true),
                    font_size: Some(14),
                    alignment: Some(Alignment::Center),
                    ..Default::default()
                },
            ),
            style(
                "enunciado",
                "Enunciado",
                "Question",
                "[[ENUNCIADO]]",
                "Identifique enunciados de questões que começam com número seguido de ponto ou parêntese",
                "#dc2626",
                StyleFormatting {
                    bold: Some(true),
                    font_size: Some(12),
                    ..Default::default()
                },
            ),
            style(
                "alternativa",
                "Alternativa",
                "Alternative",
                "[[ALTERNATIVA]]",
                "Identifique alternativas que começam com letras (a), b), c), d), e) ou A), B), C), D), E)",
                "#ea580c",
                StyleFormatting {
                    font_size: Some(11),
                    ..Default::default()
                },
            ),
            style(
                "gabarito",
                "Gabarito",
                "Answer",
                "[[GABARITO]]",
                "Identifique gabaritos: \"Resposta:\", \"Gabarito:\", textos com \"D4 –\", \"H1 –\", explicações após alternativas, orientações para professores",
                "#16a34a",
                StyleFormatting {
                    italic: Some(true),
                    font_size: Some(10),
                    color: Some("#16a34a".into()),
                    ..Default::default()
                },
            ),
        ];

        let removal_prompts = vec![
            RemovalPrompt {
                id: "intro".into(),
                name: "Introdução/Capa".into(),
                start_marker: "[[REMOVE_INTRO_START]]".into(),
                end_marker: "[[REMOVE_INTRO_END]]".into(),
                prompt: "Marque SOMENTE a tag <capa> com START e SOMENTE a tag <fechar capa> com END. Não marque nada entre elas.".into(),
            },
            RemovalPrompt {
                id: "cartao".into(),
                name: "Cartão Resposta".into(),
                start_marker: "[[REMOVE_CARTAO_START]]".into(),
                end_marker: "[[REMOVE_CARTAO_END]]".into(),
                prompt: "Marque SOMENTE onde aparece literalmente \"CARTÃO RESPOSTA\" ou \"CARTÃO-RESPOSTA\" em maiúsculas com START e onde termina essa seção específica com END.".into(),
            },
        ];

        Template::new("Simulado Básico", styles, removal_prompts)
    }
}

// ── Compiled rules ───────────────────────────────────────────────────────

static RE_ADHOC_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"REMOVE_(\w+?)_(START|END)\b").unwrap());

/// Which START/END pair a removal marker belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanId {
    /// Index into the template's removal prompts.
    Catalog(usize),
    /// An ad-hoc `REMOVE_{NAME}_START` / `REMOVE_{NAME}_END` token, keyed by
    /// `NAME`. Empty for a bare `REMOVE … START` line.
    AdHoc(String),
}

/// What a removal-marker line does to the span state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    Start(SpanId),
    End(SpanId),
    /// Both markers of one pair on the same line: a span of that line only.
    StartEnd(SpanId),
}

impl Boundary {
    fn from_sides(id: SpanId, opens: bool, closes: bool) -> Option<Self> {
        match (opens, closes) {
            (true, true) => Some(Self::StartEnd(id)),
            (true, false) => Some(Self::Start(id)),
            (false, true) => Some(Self::End(id)),
            (false, false) => None,
        }
    }
}

/// One style tag, compiled.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub style_id: String,
    pub element_type: ElementType,
    pattern: Regex,
}

impl StyleRule {
    /// Inner content of the first `<TAG>…</TAG>` pair in `line`.
    pub fn capture<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// The template compiled into ordered match rules for one run.
#[derive(Debug, Clone)]
pub struct MarkerRules {
    styles: Vec<StyleRule>,
    /// Uppercased (start, end) tag pairs.
    boundaries: Vec<(String, String)>,
}

impl MarkerRules {
    pub fn compile(template: &Template) -> Result<Self, StylerError> {
        let styles = template
            .styles
            .iter()
            .map(|style| {
                let tag = regex::escape(&style.tag());
                let pattern = RegexBuilder::new(&format!("<{tag}>(.*?)</{tag}>"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        StylerError::InvalidTemplate(format!(
                            "marker {} cannot be compiled: {e}",
                            style.marker
                        ))
                    })?;
                Ok(StyleRule {
                    style_id: style.id.clone(),
                    element_type: style.element_type,
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, StylerError>>()?;

        let boundaries = template
            .removal_prompts
            .iter()
            .map(|r| (r.start_tag().to_uppercase(), r.end_tag().to_uppercase()))
            .collect();

        Ok(Self { styles, boundaries })
    }

    /// Style rules in template order.
    pub fn styles(&self) -> &[StyleRule] {
        &self.styles
    }

    /// Classify `line` as a removal boundary, if it is one.
    ///
    /// Catalog tags are matched case-insensitively and checked first, in
    /// catalog order. Lines the model tagged with an ad-hoc
    /// `REMOVE_…_START` / `REMOVE_…_END` token are recognised too, paired by
    /// the name between the two.
    pub fn boundary(&self, line: &str) -> Option<Boundary> {
        let upper = line.to_uppercase();
        for (index, (start, end)) in self.boundaries.iter().enumerate() {
            let boundary = Boundary::from_sides(
                SpanId::Catalog(index),
                upper.contains(start.as_str()),
                upper.contains(end.as_str()),
            );
            if boundary.is_some() {
                return boundary;
            }
        }

        let sides: Vec<(&str, bool)> = RE_ADHOC_BOUNDARY
            .captures_iter(line)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str() == "START")))
            .collect();
        if let Some(&(name, _)) = sides.first() {
            let opens = sides.iter().any(|&(n, start)| n == name && start);
            let closes = sides.iter().any(|&(n, start)| n == name && !start);
            return Boundary::from_sides(SpanId::AdHoc(name.to_string()), opens, closes);
        }

        if line.contains("REMOVE") {
            return Boundary::from_sides(
                SpanId::AdHoc(String::new()),
                line.contains("START"),
                line.contains("END"),
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_valid() {
        let t = Template::default();
        t.validate().unwrap();
        assert_eq!(t.styles.len(), 5);
        assert_eq!(t.styles[2].tag(), "ENUNCIADO");
        assert_eq!(t.styles[4].order, 5);
    }

    #[test]
    fn json_round_trip_uses_camel_case() {
        let json = Template::default().to_json_pretty().unwrap();
        assert!(json.contains("\"wordStyle\""));
        assert!(json.contains("\"startMarker\""));
        assert!(json.contains("\"elementType\": \"text\""));
        let back = Template::from_json(&json).unwrap();
        assert_eq!(back, Template::default());
    }

    #[test]
    fn loads_minimal_web_export() {
        let json = r##"{
            "name": "Mini",
            "styles": [{
                "id": "enunciado", "name": "Enunciado", "wordStyle": "Question",
                "marker": "[[ENUNCIADO]]", "prompt": "questions", "color": "#dc2626",
                "order": 1, "elementType": "text",
                "formatting": { "bold": true, "fontSize": 12, "alignment": "justify" }
            }]
        }"##;
        let t = Template::from_json(json).unwrap();
        let f = t.styles[0].formatting.as_ref().unwrap();
        assert_eq!(f.font_size, Some(12));
        assert_eq!(f.alignment, Some(Alignment::Justify));
        assert!(t.removal_prompts.is_empty());
    }

    #[test]
    fn rejects_duplicate_marker() {
        let mut t = Template::default();
        t.styles[1].marker = "[[titulo_simulado]]".into();
        assert!(matches!(t.validate(), Err(StylerError::InvalidTemplate(_))));
    }

    #[test]
    fn rejects_sparse_order() {
        let mut t = Template::default();
        t.styles[0].order = 3;
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_removal_colliding_with_style() {
        let mut t = Template::default();
        t.removal_prompts[0].end_marker = "[[GABARITO]]".into();
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_identical_start_and_end() {
        let mut t = Template::default();
        t.removal_prompts[1].end_marker = t.removal_prompts[1].start_marker.clone();
        assert!(t.validate().is_err());
    }

    #[test]
    fn rules_keep_template_order() {
        let rules = MarkerRules::compile(&Template::default()).unwrap();
        let ids: Vec<&str> = rules.styles().iter().map(|r| r.style_id.as_str()).collect();
        assert_eq!(
            ids,
            ["titulo_simulado", "subtitulo_estudos", "enunciado", "alternativa", "gabarito"]
        );
    }

    #[test]
    fn capture_is_case_insensitive() {
        let rules = MarkerRules::compile(&Template::default()).unwrap();
        let enunciado = &rules.styles()[2];
        assert_eq!(
            enunciado.capture("<enunciado>1. Qual?</Enunciado>"),
            Some("1. Qual?")
        );
        assert_eq!(enunciado.capture("<ALTERNATIVA>a) x</ALTERNATIVA>"), None);
    }

    #[test]
    fn boundary_detection() {
        let rules = MarkerRules::compile(&Template::default()).unwrap();
        assert_eq!(
            rules.boundary("[[REMOVE_INTRO_START]]"),
            Some(Boundary::Start(SpanId::Catalog(0)))
        );
        assert_eq!(
            rules.boundary("<remove_cartao_end>"),
            Some(Boundary::End(SpanId::Catalog(1)))
        );
        assert_eq!(
            rules.boundary("[[REMOVE_OTHER_END]] fim"),
            Some(Boundary::End(SpanId::AdHoc("OTHER".into())))
        );
        assert_eq!(rules.boundary("<normal>Start here</normal>"), None);
    }

    #[test]
    fn both_markers_on_one_line_are_one_span() {
        let rules = MarkerRules::compile(&Template::default()).unwrap();
        assert_eq!(
            rules.boundary("[[REMOVE_INTRO_START]] Capa [[REMOVE_INTRO_END]]"),
            Some(Boundary::StartEnd(SpanId::Catalog(0)))
        );
        assert_eq!(
            rules.boundary("REMOVE_FOLHA_BRANCA_START em branco REMOVE_FOLHA_BRANCA_END"),
            Some(Boundary::StartEnd(SpanId::AdHoc("FOLHA_BRANCA".into())))
        );
    }

    #[test]
    fn markers_of_different_pairs_keep_their_identity() {
        let rules = MarkerRules::compile(&Template::default()).unwrap();
        assert_ne!(
            rules.boundary("[[REMOVE_CARTAO_END]]"),
            Some(Boundary::End(SpanId::Catalog(0)))
        );
        assert_eq!(
            rules.boundary("REMOVE_A_START"),
            Some(Boundary::Start(SpanId::AdHoc("A".into())))
        );
        assert_eq!(
            rules.boundary("REMOVE_B_END"),
            Some(Boundary::End(SpanId::AdHoc("B".into())))
        );
    }
}
