//! CLI binary for docstyler.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessingConfig`, `Template` and `PostProcessingOptions`, and prints
//! results.

use anyhow::{Context, Result};
use clap::Parser;
use docstyler::{
    process_to_dir, PostProcessingOptions, ProcessingConfig, ProcessingProgressCallback,
    ProcessingResult, ProgressCallback, Template,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while reading, a batch bar while tagging,
/// and one log line per batch.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Tagging");
        self.bar.reset_eta();
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_paragraphs: usize, total_batches: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Tagging {total_paragraphs} paragraphs in {total_batches} batches…"
            ))
        ));
    }

    fn on_stage(&self, _percent: u8, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_batch_complete(&self, batch: usize, total: usize, records: usize) {
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            green("✓"),
            batch,
            total,
            dim(&format!("{records:>3} paragraphs")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch: usize, total: usize, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}",
            red("✗"),
            batch,
            total,
            red(&msg),
        ));
    }

    fn on_run_complete(&self, success: bool) {
        self.bar.finish_and_clear();
        let failed = self.failed.load(Ordering::SeqCst);
        if !success {
            eprintln!("{} run failed", red("✘"));
        } else if failed > 0 {
            eprintln!(
                "{} done, {} batches kept as plain text",
                cyan("⚠"),
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Style a mock exam with the built-in template, outputs in ./
  docstyler simulado.docx

  # Strip numbering and letters, write to out/
  docstyler simulado.docx -o out --strip-question-numbers --strip-alternative-letters

  # Custom template and removal patterns
  docstyler prova.docx --template meu_template.json --remove "\(UFMG\)" --remove "Fonte:.*"

  # Export the built-in template as a starting point
  docstyler --print-template > meu_template.json

  # JSON summary for scripts
  docstyler prova.docx --json > result.json

OUTPUTS:
  {book}_{timestamp}.zip                       both documents
  {book}_{timestamp}/completo.docx             formatted document
  {book}_{timestamp}/completo_pronto_para_indesign.docx
                                               one "[Style] text" line per paragraph

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Tag Word documents with an LLM and rebuild them as styled DOCX.
#[derive(Parser, Debug)]
#[command(
    name = "docstyler",
    version,
    about = "Tag Word documents with an LLM and rebuild them as styled and layout-ready DOCX",
    long_about = "Split a .docx into paragraphs, let a chat model tag each one against a style \
catalog, drop marked spans, and write a formatted document plus a style-prefixed version for \
page-layout import. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any \
OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local .docx path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "print_template")]
    input: Option<String>,

    /// Directory for the archive and documents.
    #[arg(short, long, env = "DOCSTYLER_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Title of the styled document and archive prefix. Default: input file name.
    #[arg(long, env = "DOCSTYLER_BOOK_NAME")]
    book_name: Option<String>,

    /// Template JSON file (styles and removal prompts). Default: built-in.
    #[arg(long, env = "DOCSTYLER_TEMPLATE")]
    template: Option<PathBuf>,

    /// Strip "1.", "2)", "Q3:" from question statements.
    #[arg(long)]
    strip_question_numbers: bool,

    /// Strip "a)", "(b)", "[c]" from alternatives.
    #[arg(long)]
    strip_alternative_letters: bool,

    /// Regular expression to remove from every paragraph (repeatable).
    #[arg(long = "remove", value_name = "PATTERN")]
    remove: Vec<String>,

    /// Paragraphs per tagging call.
    #[arg(long, env = "DOCSTYLER_BATCH_SIZE", default_value_t = 25)]
    batch_size: usize,

    /// Paragraphs of the previous batch resent as context.
    #[arg(long, env = "DOCSTYLER_CONTEXT_SIZE", default_value_t = 3)]
    context_size: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCSTYLER_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max LLM output tokens per batch.
    #[arg(long, env = "DOCSTYLER_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Retries per batch on LLM failure.
    #[arg(long, env = "DOCSTYLER_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-batch LLM call timeout in seconds.
    #[arg(long, env = "DOCSTYLER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCSTYLER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOCSTYLER_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "DOCSTYLER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCSTYLER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSTYLER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSTYLER_QUIET")]
    quiet: bool,

    /// Print the built-in template as JSON and exit.
    #[arg(long)]
    print_template: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would fight with the progress bar for the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.print_template {
        println!(
            "{}",
            Template::default()
                .to_json_pretty()
                .context("Failed to serialise template")?
        );
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input document is required")?;

    let template = load_template(&cli).await?;
    let post_processing = build_post_processing(&cli);

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ProcessingProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = process_to_dir(
        &input,
        &cli.output,
        cli.book_name.as_deref(),
        &template,
        Some(&post_processing),
        &config,
    )
    .await
    .context("Processing failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        print_summary(&result, &cli.output);
    }

    if !result.success {
        anyhow::bail!(
            "{}",
            result.error.as_deref().unwrap_or("Unknown processing error")
        );
    }
    Ok(())
}

fn print_summary(result: &ProcessingResult, output: &std::path::Path) {
    if !result.success {
        return;
    }
    if let Some(ref stats) = result.stats {
        eprintln!(
            "{}  {} paragraphs  {} questions  {} calls  ~${:.3}  {}",
            green("✔"),
            stats.total_paragraphs,
            stats.questions_processed,
            stats.api_calls,
            stats.estimated_cost_usd,
            result.processing_time,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
    }
    if let Some(ref name) = result.archive_name {
        eprintln!("   {}", bold(&output.join(name).display().to_string()));
    }
    for file in &result.files {
        eprintln!("   {}  {}", file.path, dim(&file.size));
    }
}

/// Read `--template`, or fall back to the built-in catalog.
async fn load_template(cli: &Cli) -> Result<Template> {
    match cli.template {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read template from {:?}", path))?;
            Template::from_json(&json).with_context(|| format!("Invalid template {:?}", path))
        }
        None => Ok(Template::default()),
    }
}

fn build_post_processing(cli: &Cli) -> PostProcessingOptions {
    PostProcessingOptions {
        remove_question_numbers: cli.strip_question_numbers,
        remove_alternative_letters: cli.strip_alternative_letters,
        custom_removals: cli.remove.clone(),
    }
}

/// Map CLI args to `ProcessingConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .batch_size(cli.batch_size)
        .context_size(cli.context_size)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
