//! CLI binary for edgequake-minutebook.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`,
//! places inputs in a filesystem-backed store and runs either the whole
//! pipeline or a single stage.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_minutebook::keys;
use edgequake_minutebook::pipeline::input::resolve_input;
use edgequake_minutebook::{
    AggregationPolicy, AggregationReport, CompletionStrategy, FsStore, LocalPipeline, PageReady,
    PageStore, PipelineConfig, PipelineProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
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

/// Live progress bar over page recognition, plus one log line per page and
/// per section. Pages finish out of order, so the bar only counts.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Splitting");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn truncate(error: &str) -> String {
        if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_document_split(&self, name: &str, total_pages: u32) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Recognizing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{name}: {total_pages} pages"))
        ));
    }

    fn on_page_recognized(&self, page: u32, total_pages: u32, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, total_pages: u32, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page,
            total_pages,
            red(&Self::truncate(error)),
        ));
        self.bar.inc(1);
    }

    fn on_section_complete(&self, section: &str) {
        self.bar.set_prefix("Parsing");
        self.bar.println(format!("  {} {}", green("✓"), section));
    }

    fn on_section_error(&self, section: &str, error: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            section,
            red(&Self::truncate(error))
        ));
    }

    fn on_document_complete(&self, name: &str, sections_ok: usize, sections_total: usize) {
        self.bar.finish_and_clear();
        let mark = if sections_ok == sections_total && self.errors.load(Ordering::SeqCst) == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} {}  {}/{} sections",
            mark,
            bold(name),
            sections_ok,
            sections_total
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole pipeline on a local scan
  minutebook run acme_minutes.pdf

  # From a URL, keeping state under ./data
  minutebook --store-dir ./data run https://example.com/acme.pdf

  # Stage by stage
  minutebook split input/acme.pdf > pages.jsonl
  minutebook recognize '{"file":"output/pdf/acme_page_1.pdf","page":1,"total_pages":3}'
  minutebook parse output/txt/acme

STORE LAYOUT:
  input/<name>.pdf                  upload, deleted after split
  output/pdf/<name>_page_<n>.pdf    split pages
  output/txt/<name>_page_<n>.txt    recognized text
  temp/<name>_<section>.json        per-section output
  output/final/<name>.json          aggregated output

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium
"#;

/// Extract directors, quorum rules and share restrictions from minute books.
#[derive(Parser, Debug)]
#[command(
    name = "minutebook",
    version,
    about = "Extract directors, quorum rules and share restrictions from scanned minute books",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: Opts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split, recognize, parse and aggregate one minute book.
    Run {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
    },
    /// Split an uploaded `input/<name>.pdf`; prints one page event per line.
    Split { input_key: String },
    /// Recognize one page from a page event (JSON); prints the
    /// document-ready event if this page completed the document.
    Recognize { event: String },
    /// Parse and aggregate a recognized document (`output/txt/<name>`).
    Parse { prefix: String },
}

#[derive(Args, Debug)]
struct Opts {
    /// Directory backing the object store.
    #[arg(long, global = true, env = "MINUTEBOOK_STORE_DIR", default_value = "./minutebook-data")]
    store_dir: PathBuf,

    /// Bucket name used in provenance links.
    #[arg(long, global = true, env = "MINUTEBOOK_BUCKET")]
    bucket: Option<String>,

    /// Base URL of provenance links.
    #[arg(long, global = true, env = "MINUTEBOOK_PROVENANCE_BASE_URL")]
    provenance_base_url: Option<String>,

    /// LLM model ID.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Token budget of one director-election window.
    #[arg(long, global = true, env = "MINUTEBOOK_DIRECTOR_BUDGET")]
    director_budget: Option<usize>,

    /// Token budget of one quorum window.
    #[arg(long, global = true, env = "MINUTEBOOK_QUORUM_BUDGET")]
    quorum_budget: Option<usize>,

    /// Number of pages recognized concurrently.
    #[arg(short, long, global = true, env = "MINUTEBOOK_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Fail instead of writing a partial final output.
    #[arg(long, global = true, env = "MINUTEBOOK_STRICT")]
    strict: bool,

    /// Detect completion by listing recognized pages instead of a counter.
    #[arg(long, global = true, env = "MINUTEBOOK_RECOUNT")]
    recount: bool,

    /// Keep `input/<name>.pdf` after splitting.
    #[arg(long, global = true, env = "MINUTEBOOK_KEEP_INPUT")]
    keep_input: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "MINUTEBOOK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "MINUTEBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MINUTEBOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MINUTEBOOK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // Library INFO logs would interleave with the bar.
    let show_progress =
        !opts.quiet && !opts.no_progress && matches!(cli.command, Command::Run { .. });
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    let progress: Option<ProgressCallback> = show_progress
        .then(|| CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>);
    let config = build_config(opts, progress)?;
    let store: Arc<dyn PageStore> = Arc::new(FsStore::new(opts.store_dir.clone()));

    match &cli.command {
        Command::Run { input } => run(input, opts, store, config).await,
        Command::Split { input_key } => {
            let pipeline = LocalPipeline::from_config(store, config)
                .context("Failed to set up pipeline")?;
            let events = pipeline.split(input_key).await.context("Split failed")?;
            for event in &events {
                print_json_line(event)?;
            }
            Ok(())
        }
        Command::Recognize { event } => {
            let event: PageReady =
                serde_json::from_str(event).context("Page event is not valid JSON")?;
            let pipeline = LocalPipeline::from_config(store, config)
                .context("Failed to set up pipeline")?;
            if let Some(ready) = pipeline
                .recognize(&event)
                .await
                .context("Recognition failed")?
            {
                print_json_line(&ready)?;
            }
            Ok(())
        }
        Command::Parse { prefix } => {
            let pipeline = LocalPipeline::from_config(store.clone(), config)
                .context("Failed to set up pipeline")?;
            match pipeline.parse(prefix).await.context("Parse failed")? {
                Some(report) => print_final(store.as_ref(), &report, opts.quiet).await,
                None => {
                    if !opts.quiet {
                        eprintln!("{} no recognized pages under {}", cyan("⚠"), prefix);
                    }
                    Ok(())
                }
            }
        }
    }
}

async fn run(
    input: &str,
    opts: &Opts,
    store: Arc<dyn PageStore>,
    config: PipelineConfig,
) -> Result<()> {
    let doc = resolve_input(input, opts.download_timeout)
        .await
        .with_context(|| format!("Failed to read {input}"))?;
    let stem = doc
        .file_name
        .strip_suffix(".pdf")
        .unwrap_or(&doc.file_name)
        .to_string();
    let input_key = keys::input_key(&stem);
    store
        .put(&input_key, doc.bytes)
        .await
        .with_context(|| format!("Failed to store {input_key}"))?;

    let pipeline =
        LocalPipeline::from_config(store.clone(), config).context("Failed to set up pipeline")?;
    let summary = pipeline.run(&input_key).await.context("Pipeline failed")?;

    if !opts.quiet {
        for (page, error) in &summary.page_failures {
            eprintln!("{} page {}: {}", red("✗"), page, error);
        }
        if !summary.page_failures.is_empty() {
            eprintln!(
                "{} {}/{} pages recognized; document not parsed",
                red("✘"),
                summary.recognized_pages,
                summary.total_pages
            );
        }
    }
    for report in &summary.reports {
        print_final(store.as_ref(), report, opts.quiet).await?;
    }
    if !summary.page_failures.is_empty() {
        anyhow::bail!("{} pages failed recognition", summary.page_failures.len());
    }
    Ok(())
}

fn build_config(opts: &Opts, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .page_concurrency(opts.concurrency)
        .delete_input_after_split(!opts.keep_input)
        .aggregation(if opts.strict {
            AggregationPolicy::Strict
        } else {
            AggregationPolicy::BestEffort
        })
        .completion(if opts.recount {
            CompletionStrategy::Recount
        } else {
            CompletionStrategy::Countdown
        });

    if let Some(ref bucket) = opts.bucket {
        builder = builder.bucket(bucket);
    }
    if let Some(ref base) = opts.provenance_base_url {
        builder = builder.provenance_base_url(base);
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(n) = opts.director_budget {
        builder = builder.director_token_budget(n);
    }
    if let Some(n) = opts.quorum_budget {
        builder = builder.quorum_token_budget(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Copy the final object to stdout and summarise the report on stderr.
async fn print_final(store: &dyn PageStore, report: &AggregationReport, quiet: bool) -> Result<()> {
    let Some(ref key) = report.final_key else {
        return Ok(());
    };
    let body = store
        .get(key)
        .await
        .with_context(|| format!("Failed to read {key}"))?
        .with_context(|| format!("{key} is missing"))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(&body).context("Failed to write to stdout")?;
    handle.flush().ok();

    if !quiet {
        eprintln!(
            "{}  {}  {} sections  {}",
            if report.is_complete() { green("✔") } else { cyan("⚠") },
            bold(key),
            report.sections.len(),
            dim(&format!("{} bytes", report.bytes)),
        );
        for failure in &report.failures {
            eprintln!("   {} {}", red("missing"), failure);
        }
    }
    Ok(())
}

fn print_json_line<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(value).context("Failed to serialise event")?
    );
    Ok(())
}
