//! CLI binary for edgequake-pdf2pptx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, writes the deck, and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2pptx::pipeline::input;
use edgequake_pdf2pptx::{
    convert_from_bytes, write_deck, CancelFlag, ConversionConfig, ConversionProgressCallback,
    PageFailurePolicy, PageSelection, ProgressCallback, RetryPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a live progress bar plus one log line per
/// slide. Pages are processed sequentially, so one start time suffices.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner only until `on_conversion_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rebuilding");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rebuilding {total_pages} slides…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_rate_limited(&self, page_num: usize, attempt: u32, next_delay: Duration) {
        self.bar.set_message(format!(
            "page {page_num}: rate limited (attempt {attempt}), waiting {}s",
            next_delay.as_secs()
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, shapes: usize) {
        let elapsed = self.page_elapsed();
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{shapes:>3} shapes")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed();

        // Keep the line on one terminal row.
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} slides rebuilt",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} slides rebuilt  ({} placeholders)",
                yellow("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rebuild a deck (writes rebuilt_slides.pptx)
  pdf2pptx slides.pdf

  # Choose the output file
  pdf2pptx slides.pdf -o editable.pptx

  # A few pages only, keep going past pages the model cannot read
  pdf2pptx --pages 2-6 --on-failure placeholder slides.pdf

  # Use a specific model
  pdf2pptx --provider gemini --model gemini-2.5-pro slides.pdf

  # Rebuild straight from a URL
  pdf2pptx https://example.com/keynote.pdf

  # Per-page JSON report (layouts, counts, timings; never slide text)
  pdf2pptx --json slides.pdf > report.json

RATE LIMITS:
  Every model call waits --initial-delay seconds first. Each rate-limit
  response adds --delay-increment seconds (up to --max-delay) and retries
  the same page. The wait starts over on the next page.
  --max-delay 0 and --max-attempts 0 remove the respective ceiling.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when set)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  PDF2PPTX_PROVIDER       Same as --provider
  PDF2PPTX_MODEL          Same as --model
  EDGEQUAKE_LLM_PROVIDER  Provider used when neither is given (needs EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Model paired with EDGEQUAKE_LLM_PROVIDER
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, e.g. edgequake_pdf2pptx=debug
"#;

/// Rebuild flattened PDF slide decks as editable PowerPoint files.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2pptx",
    version,
    about = "Rebuild flattened PDF slide decks as editable PowerPoint files",
    long_about = "Rasterise each page of a PDF slide deck, ask a Vision Language Model \
for its layout, text, speaker notes and figure positions, and rebuild the slide \
as native PowerPoint shapes. Supports Gemini, OpenAI, Anthropic, and any \
OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output .pptx path. Default: rebuilt_<input name>.pptx
    #[arg(short, long, env = "PDF2PPTX_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "PDF2PPTX_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "PDF2PPTX_PROVIDER")]
    provider: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2PPTX_PAGES", default_value = "all")]
    pages: String,

    /// What to do with a page the model cannot analyse.
    #[arg(long, env = "PDF2PPTX_ON_FAILURE", value_enum, default_value = "abort")]
    on_failure: FailureArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2PPTX_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2PPTX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max model output tokens per page.
    #[arg(long, env = "PDF2PPTX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "PDF2PPTX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Longest edge in pixels of the page image sent to the model.
    #[arg(long, env = "PDF2PPTX_ORACLE_MAX_PIXELS", default_value_t = 2000)]
    oracle_max_pixels: u32,

    /// Seconds to wait before every model call.
    #[arg(long, env = "PDF2PPTX_INITIAL_DELAY", default_value_t = 5)]
    initial_delay: u64,

    /// Seconds added to the wait after each rate-limit response.
    #[arg(long, env = "PDF2PPTX_DELAY_INCREMENT", default_value_t = 5)]
    delay_increment: u64,

    /// Longest wait between calls in seconds (0 = no cap).
    #[arg(long, env = "PDF2PPTX_MAX_DELAY", default_value_t = 60)]
    max_delay: u64,

    /// Model calls per page before giving up (0 = unlimited).
    #[arg(long, env = "PDF2PPTX_MAX_ATTEMPTS", default_value_t = 8)]
    max_attempts: u32,

    /// Print a JSON report of per-page metadata to stdout.
    #[arg(long, env = "PDF2PPTX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2PPTX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2PPTX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2PPTX_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2PPTX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "PDF2PPTX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FailureArg {
    Abort,
    Placeholder,
}

impl From<FailureArg> for PageFailurePolicy {
    fn from(v: FailureArg) -> Self {
        match v {
            FailureArg::Abort => PageFailurePolicy::Abort,
            FailureArg::Placeholder => PageFailurePolicy::Placeholder,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback, so INFO logs are
    // hidden while it is shown unless --verbose asks for them.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let cancel = CancelFlag::new();
    let config = build_config(&cli, progress_cb, cancel.clone()).await?;

    // First Ctrl-C abandons the current page; a second one exits at once.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", yellow("Cancelling… press Ctrl-C again to force quit"));
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Run conversion ───────────────────────────────────────────────────
    let bytes = input::resolve_input(&cli.input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to read '{}'", cli.input))?;
    let output = convert_from_bytes(&bytes, &config)
        .await
        .context("Conversion failed")?;
    write_deck(&output_path, &output.deck)
        .await
        .context("Failed to write deck")?;

    if cli.json {
        let report = serde_json::json!({
            "output": output_path.display().to_string(),
            "stats": output.stats,
            "pages": output.pages,
        });
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} slides  {}ms  →  {}",
            if stats.placeholders == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            stats.reconstructed,
            stats.total_pages,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if stats.rate_limited_retries > 0 {
            eprintln!(
                "   {}",
                dim(&format!("{} rate-limit retries", stats.rate_limited_retries))
            );
        }
    }

    Ok(())
}

/// `rebuilt_<stem>.pptx` in the working directory.
fn default_output_path(input_str: &str) -> PathBuf {
    PathBuf::from(format!("rebuilt_{}.pptx", input::source_stem(input_str)))
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .pages(parse_pages(&cli.pages)?)
        .on_page_failure(cli.on_failure.into())
        .retry_policy(retry_policy(cli))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .oracle_max_pixels(cli.oracle_max_pixels)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .cancel_flag(cancel);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn retry_policy(cli: &Cli) -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_secs(cli.initial_delay),
        increment: Duration::from_secs(cli.delay_increment),
        max_delay: (cli.max_delay > 0).then(|| Duration::from_secs(cli.max_delay)),
        max_attempts: (cli.max_attempts > 0).then_some(cli.max_attempts),
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_flag_env_var_is_namespaced() {
        let cmd = Cli::command();
        for arg in cmd.get_arguments() {
            if let Some(env) = arg.get_env() {
                let env = env.to_string_lossy();
                assert!(env.starts_with("PDF2PPTX_"), "{} reads {env}", arg.get_id());
            }
        }
        let provider = cmd
            .get_arguments()
            .find(|a| a.get_id() == "provider")
            .and_then(|a| a.get_env())
            .unwrap();
        assert_eq!(provider, "PDF2PPTX_PROVIDER");
    }

    #[test]
    fn parses_page_selections() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages(" 4 ").unwrap(), PageSelection::Single(4));
        assert_eq!(parse_pages("2-5").unwrap(), PageSelection::Range(2, 5));
        assert_eq!(
            parse_pages("1,3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("1,x").is_err());
    }

    #[test]
    fn default_output_is_prefixed_stem() {
        assert_eq!(
            default_output_path("/decks/q3 review.pdf"),
            PathBuf::from("rebuilt_q3 review.pptx")
        );
        assert_eq!(
            default_output_path("https://example.com/talk.pdf"),
            PathBuf::from("rebuilt_talk.pptx")
        );
    }

    #[test]
    fn zero_ceilings_mean_unbounded() {
        let cli = Cli::parse_from(["pdf2pptx", "a.pdf", "--max-delay", "0", "--max-attempts", "0"]);
        let policy = retry_policy(&cli);
        assert_eq!(policy.max_delay, None);
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn defaults_match_library_policy() {
        let cli = Cli::parse_from(["pdf2pptx", "a.pdf"]);
        assert_eq!(retry_policy(&cli), RetryPolicy::default());
    }
}
