//! CLI binary for pdf-digest.
//!
//! A thin shim over the library crate: maps flags to `IngestConfig`, reads
//! the input, and prints records and summaries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_digest::parser::PdfParser;
use pdf_digest::pipeline::extract::{extract_content, ExtractLimits};
use pdf_digest::pipeline::input::load_input;
use pdf_digest::{
    default_parser, ArtifactStore, ExtractionStatus, FsArtifactStore, IngestConfig,
    IngestProgressCallback, Ingestor, LlmCompletion, ProgressCallback, Stage, UploadRecord,
};
use std::io;
use std::path::PathBuf;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the current ingestion stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_stage(&self, filename: &str, stage: Stage) {
        if stage == Stage::Done {
            self.bar.finish_and_clear();
        } else {
            self.bar.set_message(format!("{filename}: {stage}…"));
        }
    }

    fn on_degraded(&self, _filename: &str, failed_pages: &[usize]) {
        self.bar.println(format!(
            "  {} pages {:?} could not be read and were skipped",
            cyan("⚠"),
            failed_pages
        ));
    }

    fn on_failed(&self, _filename: &str, stage: Stage, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} failed while {}: {}", red("✘"), stage, error);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a local PDF and store it
  pdfdigest ingest report.pdf

  # Ingest from a URL, machine-readable output
  pdfdigest ingest https://arxiv.org/pdf/1706.03762 --json

  # Show the stored summary of a record
  pdfdigest summary 3f1c2a9e-...

  # Last 10 uploads
  pdfdigest history --limit 10

  # Page, image and table counts only (no API key needed)
  pdfdigest inspect report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDF_DIGEST_STORAGE_DIR  Storage root (default ./storage)
  RUST_LOG                Log filter, e.g. pdf_digest=debug

A .env file in the working directory is loaded first.
"#;

/// Ingest PDFs, summarise them with an LLM and browse the upload history.
#[derive(Parser, Debug)]
#[command(
    name = "pdfdigest",
    version,
    about = "Ingest PDFs, summarise them with an LLM and browse the upload history",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the artifact store.
    #[arg(long, global = true, env = "PDF_DIGEST_STORAGE_DIR", default_value = "storage")]
    storage_dir: PathBuf,

    /// Maximum upload size in MB.
    #[arg(long, global = true, env = "PDF_DIGEST_MAX_FILE_SIZE_MB", default_value_t = 50)]
    max_file_size_mb: u64,

    /// Maximum number of pages.
    #[arg(long, global = true, env = "PDF_DIGEST_MAX_PAGES", default_value_t = 100)]
    max_pages: usize,

    /// Print machine-readable JSON.
    #[arg(long, global = true, env = "PDF_DIGEST_JSON")]
    json: bool,

    /// Use the pdfium backend instead of the built-in parser.
    #[cfg(feature = "pdfium")]
    #[arg(long, global = true, env = "PDF_DIGEST_PDFIUM")]
    pdfium: bool,

    /// Increase log verbosity (-v for INFO, -vv for DEBUG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "PDF_DIGEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a PDF (local path or HTTP/HTTPS URL) and print its summary.
    Ingest {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        #[command(flatten)]
        llm: LlmArgs,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "PDF_DIGEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },

    /// Print the stored summary of a record.
    Summary {
        /// Record id as printed by `ingest` or `history`.
        id: String,
    },

    /// List the most recent uploads, newest first.
    History {
        /// Number of records to show.
        #[arg(short, long, env = "PDF_DIGEST_HISTORY_LIMIT", default_value_t = 5)]
        limit: usize,
    },

    /// Extract and print document structure without summarising or storing.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "PDF_DIGEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },
}

#[derive(clap::Args, Debug)]
struct LlmArgs {
    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Language of the summary.
    #[arg(long, env = "PDF_DIGEST_LANGUAGE", default_value = "English")]
    language: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF_DIGEST_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "PDF_DIGEST_MAX_TOKENS", default_value_t = 800)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF_DIGEST_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Retries on transient LLM failure.
    #[arg(long, env = "PDF_DIGEST_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF_DIGEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Overall summarisation deadline in seconds.
    #[arg(long, env = "PDF_DIGEST_SUMMARIZE_DEADLINE", default_value_t = 120)]
    deadline: u64,

    /// Character budget of the excerpt sent to the model.
    #[arg(long, env = "PDF_DIGEST_MAX_PROMPT_CHARS", default_value_t = 12_000)]
    max_prompt_chars: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "pdf_digest=info,warn",
        (false, _) => "pdf_digest=debug,info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Ingest {
            input,
            llm,
            download_timeout,
        } => run_ingest(&cli, input, llm, *download_timeout).await,
        Command::Summary { id } => run_summary(&cli, id).await,
        Command::History { limit } => run_history(&cli, *limit).await,
        Command::Inspect {
            input,
            download_timeout,
        } => run_inspect(&cli, input, *download_timeout).await,
    }
}

fn select_parser(cli: &Cli) -> Result<Arc<dyn PdfParser>> {
    #[cfg(feature = "pdfium")]
    if cli.pdfium {
        let parser = pdf_digest::parser::PdfiumParser::bind().context("Failed to load pdfium")?;
        return Ok(Arc::new(parser));
    }
    let _ = cli;
    Ok(default_parser())
}

async fn run_ingest(cli: &Cli, input: &str, llm: &LlmArgs, download_timeout: u64) -> Result<()> {
    let show_progress = !cli.quiet && !cli.json;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, llm, download_timeout, progress).await?;

    let loaded = load_input(input, config.download_timeout_secs, config.max_file_size_bytes())
        .await
        .context("Failed to read input")?;

    let completion = LlmCompletion::from_config(&config).context("No LLM provider available")?;
    let store = FsArtifactStore::open(config.storage_dir.clone())
        .await
        .context("Failed to open storage")?;
    let ingestor = Ingestor::new(config, select_parser(cli)?, Arc::new(completion), Arc::new(store));

    let outcome = match ingestor.ingest(loaded.bytes, &loaded.filename).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if !show_progress {
                eprintln!("{} {}", red("✘"), e.user_message());
            }
            return Err(anyhow::Error::new(e).context("Ingestion failed"));
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let r = &outcome.record;
    if !cli.quiet {
        let status = if outcome.duplicate {
            cyan("already stored")
        } else {
            green("stored")
        };
        eprintln!("{} {}  {}", green("✔"), bold(&r.original_filename), status);
        print_record_details(r);
        if outcome.excerpt_truncated {
            eprintln!("  {}", dim("summary based on an excerpt of the text"));
        }
        eprintln!();
    }
    println!("{}", outcome.summary);
    Ok(())
}

async fn run_summary(cli: &Cli, id: &str) -> Result<()> {
    let store = FsArtifactStore::open(cli.storage_dir.clone())
        .await
        .context("Failed to open storage")?;
    let record = store
        .get_record(id)
        .await
        .with_context(|| format!("No record {id}"))?;
    let summary = store
        .get_summary(id)
        .await
        .context("Failed to read summary")?;

    if cli.json {
        let value = serde_json::json!({ "record": record, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        if !cli.quiet {
            eprintln!("{}", bold(&record.original_filename));
            print_record_details(&record);
            eprintln!();
        }
        println!("{summary}");
    }
    Ok(())
}

async fn run_history(cli: &Cli, limit: usize) -> Result<()> {
    let store = FsArtifactStore::open(cli.storage_dir.clone())
        .await
        .context("Failed to open storage")?;
    let records = store.list_recent(limit).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        eprintln!("{}", dim("No uploads yet."));
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  {}  {}  {}",
            dim(&r.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            r.id,
            bold(&r.original_filename),
            dim(&format!("{} pages, {:.2} MB", r.pages, r.size_mb)),
        );
    }
    Ok(())
}

async fn run_inspect(cli: &Cli, input: &str, download_timeout: u64) -> Result<()> {
    let config = IngestConfig::builder()
        .max_file_size_mb(cli.max_file_size_mb)
        .max_pages(cli.max_pages)
        .build()
        .context("Invalid configuration")?;
    let loaded = load_input(input, download_timeout, config.max_file_size_bytes())
        .await
        .context("Failed to read input")?;

    let content = extract_content(
        select_parser(cli)?,
        Arc::new(loaded.bytes),
        ExtractLimits::from(&config),
    )
    .await
    .context("Failed to inspect PDF")?;

    let failed_pages: Vec<usize> = match &content.status {
        ExtractionStatus::Complete => Vec::new(),
        ExtractionStatus::Degraded { failed_pages } => {
            failed_pages.iter().map(|f| f.page).collect()
        }
    };

    if cli.json {
        let value = serde_json::json!({
            "filename": loaded.filename,
            "pages": content.page_count,
            "size_mb": content.size_mb,
            "text_length": content.text_length(),
            "image_count": content.image_count,
            "table_count": content.table_count,
            "failed_pages": failed_pages,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("File:         {}", loaded.filename);
        println!("Pages:        {}", content.page_count);
        println!("Size:         {:.2} MB", content.size_mb);
        println!("Text length:  {} chars", content.text_length());
        println!("Images:       {}", content.image_count);
        println!("Tables:       {}", content.table_count);
        if !failed_pages.is_empty() {
            println!("Unreadable:   pages {failed_pages:?}");
        }
    }
    Ok(())
}

fn print_record_details(r: &UploadRecord) {
    eprintln!("  {} {}", dim("id:     "), r.id);
    eprintln!(
        "  {} {} pages, {:.2} MB, {} images, {} tables",
        dim("content:"),
        r.pages,
        r.size_mb,
        r.image_count,
        r.table_count
    );
    eprintln!(
        "  {} {}",
        dim("stored: "),
        r.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

/// Map CLI args to `IngestConfig`.
async fn build_config(
    cli: &Cli,
    llm: &LlmArgs,
    download_timeout: u64,
    progress: Option<ProgressCallback>,
) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .storage_dir(cli.storage_dir.clone())
        .max_file_size_mb(cli.max_file_size_mb)
        .max_pages(cli.max_pages)
        .model(llm.model.clone())
        .language(llm.language.clone())
        .max_tokens(llm.max_tokens)
        .temperature(llm.temperature)
        .max_retries(llm.max_retries)
        .api_timeout_secs(llm.api_timeout)
        .summarize_deadline_secs(llm.deadline)
        .max_prompt_chars(llm.max_prompt_chars)
        .download_timeout_secs(download_timeout);

    if let Some(ref name) = llm.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref path) = llm.system_prompt {
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
