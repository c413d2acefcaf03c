//! Whole-pipeline tests with a scripted completion backend.
//!
//! No network: every test plugs a [`CompletionBackend`] that answers from
//! the paragraphs in the prompt, so the full path from `.docx` bytes to the
//! ZIP bundle runs offline.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use docstyler::{
    extract_paragraphs, process_document, BatchError, Completion, CompletionBackend, ElementType,
    PostProcessingOptions, ProcessingConfig, ProcessingProgressCallback, ProcessingResult,
    Template,
};
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers every `[Pn] text` line of the prompt with `[Pn] rule(text)`.
struct Tagger<F> {
    rule: F,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl<F> Tagger<F>
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn new(rule: F) -> Arc<Self> {
        Arc::new(Self {
            rule,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl<F> CompletionBackend for Tagger<F>
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    async fn complete(&self, _batch: usize, _system: &str, user: &str) -> Result<Completion, BatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user.to_string());
        let content = numbered_lines(user)
            .into_iter()
            .map(|(n, text)| format!("[P{n}] {}", (self.rule)(&text)))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Completion {
            content,
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

/// Fails one batch, delegates the others.
struct FailsOn {
    batch: usize,
    inner: Arc<dyn CompletionBackend>,
}

#[async_trait]
impl CompletionBackend for FailsOn {
    async fn complete(&self, batch: usize, system: &str, user: &str) -> Result<Completion, BatchError> {
        if batch == self.batch {
            return Err(BatchError::Timeout { batch, secs: 60 });
        }
        self.inner.complete(batch, system, user).await
    }
}

/// Always fails.
struct Down;

#[async_trait]
impl CompletionBackend for Down {
    async fn complete(&self, batch: usize, _system: &str, _user: &str) -> Result<Completion, BatchError> {
        Err(BatchError::Provider {
            batch,
            retries: 0,
            detail: "429 quota exceeded".into(),
        })
    }
}

/// `(n, text)` for every numbered paragraph in the prompt's text section.
fn numbered_lines(prompt: &str) -> Vec<(usize, String)> {
    prompt
        .lines()
        .skip_while(|l| *l != "TEXT TO ANALYSE:")
        .skip(1)
        .take_while(|l| !l.is_empty())
        .filter_map(|l| {
            let (n, text) = l.split_once("] ")?;
            Some((n.trim_start_matches("[P").parse().ok()?, text.to_string()))
        })
        .collect()
}

fn normal(text: &str) -> String {
    format!("<normal>{text}</normal>")
}

fn docx(paragraphs: &[String]) -> Vec<u8> {
    let mut doc = Docx::new();
    for p in paragraphs {
        doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(p.as_str())));
    }
    let mut buf = Cursor::new(Vec::new());
    doc.build().pack(&mut buf).unwrap();
    buf.into_inner()
}

fn text_paragraph(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn kept_text(result: &ProcessingResult) -> Vec<String> {
    styled_text(result)[1..].to_vec()
}

fn lines(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

fn config(backend: Arc<dyn CompletionBackend>) -> ProcessingConfig {
    ProcessingConfig::builder()
        .backend(backend)
        .max_retries(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

fn styled_text(result: &ProcessingResult) -> Vec<String> {
    extract_paragraphs(result.styled_document.as_ref().unwrap()).unwrap()
}

fn sanitized_body(result: &ProcessingResult, template: &Template) -> Vec<String> {
    let all = extract_paragraphs(result.sanitized_document.as_ref().unwrap()).unwrap();
    all[template.styles.len() + 2..].to_vec()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn removal_span_leaves_only_real_question() {
    let paragraphs = lines(&["CAPA", "Editora Exemplo", "FIM DA CAPA", "1. Pergunta real"]);
    let backend = Tagger::new(|text: &str| match text {
        "CAPA" => "[[REMOVE_INTRO_START]]".to_string(),
        "FIM DA CAPA" => "[[REMOVE_INTRO_END]]".to_string(),
        t if t.starts_with("1.") => format!("<ENUNCIADO>{t}</ENUNCIADO>"),
        t => normal(t),
    });
    let template = Template::default();

    let result = process_document(&docx(&paragraphs), "Livro", &template, None, &config(backend)).await;
    assert!(result.success, "{:?}", result.error);

    assert_eq!(styled_text(&result), vec!["Livro", "1. Pergunta real"]);
    assert_eq!(
        sanitized_body(&result, &template),
        vec!["[Question] 1. Pergunta real"]
    );
    assert_eq!(result.stats.unwrap().questions_processed, 1);
}

#[tokio::test]
async fn question_number_is_stripped() {
    let paragraphs = lines(&["1. Qual a capital?", "a) Brasília"]);
    let backend = Tagger::new(|text: &str| {
        if text.starts_with("1.") {
            format!("<ENUNCIADO>{text}</ENUNCIADO>")
        } else {
            format!("<ALTERNATIVA>{text}</ALTERNATIVA>")
        }
    });
    let template = Template::default();
    let cleanup = PostProcessingOptions {
        remove_question_numbers: true,
        remove_alternative_letters: true,
        custom_removals: vec![],
    };

    let result = process_document(
        &docx(&paragraphs),
        "Geo",
        &template,
        Some(&cleanup),
        &config(backend),
    )
    .await;

    assert_eq!(styled_text(&result), vec!["Geo", "Qual a capital?", "Brasília"]);
    assert_eq!(
        sanitized_body(&result, &template),
        vec!["[Question] Qual a capital?", "[Alternative] Brasília"]
    );
}

#[tokio::test]
async fn failing_backend_keeps_document_as_plain_text() {
    let paragraphs: Vec<String> = (1..=25).map(|i| format!("Parágrafo {i}")).collect();
    let template = Template::default();

    let result = process_document(&docx(&paragraphs), "B", &template, None, &config(Arc::new(Down))).await;

    assert!(result.success);
    let stats = result.stats.clone().unwrap();
    assert_eq!(stats.api_calls, 1);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.total_input_tokens, 0);

    let body = sanitized_body(&result, &template);
    assert_eq!(body.len(), 25);
    assert!(body.iter().all(|l| l.starts_with("[Normal] Parágrafo ")));
    assert_eq!(styled_text(&result)[1..].to_vec(), paragraphs);
}

#[tokio::test]
async fn context_is_sent_and_trimmed_across_batches() {
    let paragraphs: Vec<String> = (1..=60).map(|i| format!("p{i}")).collect();
    let backend = Tagger::new(normal);

    let result = process_document(
        &docx(&paragraphs),
        "B",
        &Template::default(),
        None,
        &config(backend.clone()),
    )
    .await;
    assert!(result.success);

    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    let prompts = backend.prompts.lock().unwrap();
    let numbers: Vec<Vec<usize>> = prompts
        .iter()
        .map(|p| numbered_lines(p).into_iter().map(|(n, _)| n).collect())
        .collect();
    assert_eq!(numbers[0], (1..=25).collect::<Vec<_>>());
    assert_eq!(numbers[1], (23..=50).collect::<Vec<_>>());
    assert_eq!(numbers[2], (48..=60).collect::<Vec<_>>());

    // Every paragraph exactly once, in order.
    assert_eq!(styled_text(&result)[1..].to_vec(), paragraphs);

    let stats = result.stats.unwrap();
    assert_eq!(stats.api_calls, 3);
    assert_eq!(stats.total_pages, 2);
    assert!((stats.estimated_cost_usd - 0.006).abs() < 1e-9);
    assert_eq!(stats.total_output_tokens, 150);
}

#[tokio::test]
async fn removal_span_crosses_batch_boundary() {
    let paragraphs: Vec<String> = (1..=30).map(|i| format!("p{i}")).collect();
    let backend = Tagger::new(|text: &str| match text {
        "p24" => "[[REMOVE_CARTAO_START]] p24".to_string(),
        "p27" => "[[REMOVE_CARTAO_END]] p27".to_string(),
        t => normal(t),
    });

    let result = process_document(&docx(&paragraphs), "B", &Template::default(), None, &config(backend)).await;

    let kept = styled_text(&result);
    let expected: Vec<String> = std::iter::once("B".to_string())
        .chain(
            paragraphs
                .iter()
                .filter(|p| !["p24", "p25", "p26", "p27"].contains(&p.as_str()))
                .cloned(),
        )
        .collect();
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn invalid_custom_pattern_is_removed_literally() {
    let paragraphs = lines(&["texto (unclosed fim"]);
    let backend = Tagger::new(normal);
    let cleanup = PostProcessingOptions {
        custom_removals: vec!["(unclosed".into()],
        ..Default::default()
    };

    let result = process_document(
        &docx(&paragraphs),
        "B",
        &Template::default(),
        Some(&cleanup),
        &config(backend),
    )
    .await;

    assert!(result.success);
    assert_eq!(styled_text(&result), vec!["B", "texto  fim"]);
}

#[tokio::test]
async fn archive_contains_both_documents() {
    let paragraphs = lines(&["Simulado 1"]);
    let backend = Tagger::new(|t: &str| format!("<TITULO_SIMULADO>{t}</TITULO_SIMULADO>"));

    let result = process_document(&docx(&paragraphs), "Apostila", &Template::default(), None, &config(backend)).await;
    let name = result.archive_name.clone().unwrap();
    let folder = name.trim_end_matches(".zip");
    assert!(folder.starts_with("Apostila_"));

    let mut zip = zip::ZipArchive::new(Cursor::new(result.archive.clone().unwrap())).unwrap();
    let mut styled = Vec::new();
    zip.by_name(&format!("{folder}/completo.docx"))
        .unwrap()
        .read_to_end(&mut styled)
        .unwrap();
    assert_eq!(&styled, result.styled_document.as_ref().unwrap());
    assert!(zip
        .by_name(&format!("{folder}/completo_pronto_para_indesign.docx"))
        .is_ok());

    assert_eq!(result.files.len(), 2);
    assert!(result.processing_time.ends_with('s'));
}

#[tokio::test]
async fn progress_events_follow_the_stages() {
    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<u8>>,
        batches: AtomicUsize,
        finished: Mutex<Option<bool>>,
    }

    impl ProcessingProgressCallback for Recorder {
        fn on_stage(&self, percent: u8, _message: &str) {
            self.stages.lock().unwrap().push(percent);
        }
        fn on_batch_complete(&self, _batch: usize, _total: usize, _records: usize) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
        fn on_run_complete(&self, success: bool) {
            *self.finished.lock().unwrap() = Some(success);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let paragraphs: Vec<String> = (1..=30).map(|i| format!("p{i}")).collect();
    let config = ProcessingConfig::builder()
        .backend(Tagger::new(normal))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let cleanup = PostProcessingOptions::default();
    let result = process_document(&docx(&paragraphs), "B", &Template::default(), Some(&cleanup), &config).await;
    assert!(result.success);

    let stages = recorder.stages.lock().unwrap().clone();
    assert_eq!(stages.first(), Some(&5));
    assert_eq!(stages.last(), Some(&100));
    assert!(stages.contains(&65) && stages.contains(&85) && stages.contains(&90));
    assert!(stages.iter().all(|p| *p <= 100));
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.finished.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn failed_run_reports_error_and_json_has_no_blobs() {
    let result = process_document(
        b"%PDF-1.4",
        "B",
        &Template::default(),
        None,
        &config(Tagger::new(normal)),
    )
    .await;
    assert!(!result.success);
    assert!(result.stats.is_none());
    assert!(result.files.is_empty());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], false);
    assert!(json.get("archive").is_none());
    assert!(json["error"].as_str().unwrap().starts_with("Unreadable document"));
}

#[test]
fn callback_and_backend_are_send_sync() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn ProcessingProgressCallback>();
    assert_send_sync::<dyn CompletionBackend>();
    assert_send_sync::<ProcessingConfig>();
}

#[tokio::test]
async fn one_line_span_does_not_swallow_following_questions() {
    let paragraphs = lines(&["Capa", "1. Pergunta", "a) x", "CARTAO", "fim", "2. Outra"]);
    let backend = Tagger::new(|text: &str| match text {
        "Capa" => "[[REMOVE_INTRO_START]] Capa [[REMOVE_INTRO_END]]".to_string(),
        "CARTAO" => "[[REMOVE_CARTAO_START]] CARTAO".to_string(),
        "fim" => "[[REMOVE_CARTAO_END]]".to_string(),
        t if t.starts_with(char::is_numeric) => format!("<ENUNCIADO>{t}</ENUNCIADO>"),
        t => format!("<ALTERNATIVA>{t}</ALTERNATIVA>"),
    });

    let result = process_document(&docx(&paragraphs), "B", &Template::default(), None, &config(backend)).await;

    assert_eq!(kept_text(&result), vec!["1. Pergunta", "a) x", "2. Outra"]);
    assert_eq!(result.stats.unwrap().questions_processed, 2);
}

#[tokio::test]
async fn end_of_another_span_does_not_close_the_open_one() {
    let paragraphs = lines(&["INICIO", "capa", "FIM CARTAO", "ainda capa", "FIM", "1. real"]);
    let backend = Tagger::new(|text: &str| match text {
        "INICIO" => "[[REMOVE_INTRO_START]]".to_string(),
        "FIM CARTAO" => "[[REMOVE_CARTAO_END]]".to_string(),
        "FIM" => "[[REMOVE_INTRO_END]]".to_string(),
        t => normal(t),
    });

    let result = process_document(&docx(&paragraphs), "B", &Template::default(), None, &config(backend)).await;

    assert_eq!(kept_text(&result), vec!["1. real"]);
}

#[tokio::test]
async fn failed_batch_inside_open_span_is_removed_with_it() {
    // Windows: p1-p25, p26-p50 (fails), p51-p75. The span runs p24..=p55.
    let paragraphs: Vec<String> = (1..=75).map(|i| format!("p{i}")).collect();
    let tagger = Tagger::new(|text: &str| match text {
        "p24" => "[[REMOVE_CARTAO_START]] p24".to_string(),
        "p55" => "[[REMOVE_CARTAO_END]] p55".to_string(),
        t => normal(t),
    });
    let backend = Arc::new(FailsOn {
        batch: 1,
        inner: tagger,
    });

    let result = process_document(&docx(&paragraphs), "B", &Template::default(), None, &config(backend)).await;
    assert!(result.success);
    assert_eq!(result.stats.clone().unwrap().failed_batches, 1);

    let expected: Vec<String> = (1..=23).chain(56..=75).map(|i| format!("p{i}")).collect();
    assert_eq!(kept_text(&result), expected);
}

#[tokio::test]
async fn failed_batch_after_unclosed_span_is_kept() {
    // START in the first window, no END anywhere: the whole span is restored.
    let paragraphs: Vec<String> = (1..=50).map(|i| format!("p{i}")).collect();
    let tagger = Tagger::new(|text: &str| match text {
        "p10" => "[[REMOVE_INTRO_START]]".to_string(),
        t => normal(t),
    });
    let backend = Arc::new(FailsOn {
        batch: 1,
        inner: tagger,
    });

    let result = process_document(&docx(&paragraphs), "B", &Template::default(), None, &config(backend)).await;

    let expected: Vec<String> = (1..=50).filter(|i| *i != 10).map(|i| format!("p{i}")).collect();
    assert_eq!(kept_text(&result), expected);
}

#[tokio::test]
async fn table_reaches_both_documents_as_a_table() {
    let mut styles = Template::default().styles;
    let mut table_style = styles[4].clone();
    table_style.id = "tabela".into();
    table_style.name = "Tabela".into();
    table_style.word_style = "Table".into();
    table_style.marker = "[[TABELA]]".into();
    table_style.element_type = ElementType::Table;
    styles.push(table_style);
    let template = Template::new("Com tabela", styles, Template::default().removal_prompts);

    let cell = |t: &str| TableCell::new().add_paragraph(text_paragraph(t));
    let mut buf = Cursor::new(Vec::new());
    Docx::new()
        .add_paragraph(text_paragraph("antes"))
        .add_table(Table::new(vec![
            TableRow::new(vec![cell("1"), cell("C")]),
            TableRow::new(vec![cell("2"), cell("A")]),
        ]))
        .add_paragraph(text_paragraph("depois"))
        .build()
        .pack(&mut buf)
        .unwrap();

    let backend = Tagger::new(normal);
    let result = process_document(buf.get_ref(), "B", &template, None, &config(backend.clone())).await;
    assert!(result.success, "{:?}", result.error);

    // The table is one paragraph slot for the model.
    let prompts = backend.prompts.lock().unwrap();
    let sent: Vec<String> = numbered_lines(&prompts[0]).into_iter().map(|(_, t)| t).collect();
    assert_eq!(sent, vec!["antes", "1 | C / 2 | A", "depois"]);

    assert_eq!(kept_text(&result), vec!["antes", "1 | C / 2 | A", "depois"]);
    assert_eq!(
        sanitized_body(&result, &template),
        vec!["[Normal] antes", "[Table] 1 | C / 2 | A", "[Normal] depois"]
    );
}
