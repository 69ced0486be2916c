use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, warn};

use refextract_core::config_file::{self, ConfigFile};
use refextract_core::{DocumentResult, PlainTextBackend, TextBackend, TitleFormat};
use refextract_parsing::{
    KnowledgeBases, ParsingConfig, ParsingConfigBuilder, ParsingError, ReferenceExtractor,
    ReportNumberKnowledgeBase, TitleKnowledgeBase,
};
use refextract_pdftotext::PdftotextBackend;
use refextract_reporting::{render, ExportFormat};

mod output;

use output::ColorMode;

const TITLES_KB_ENV: &str = "REFEXTRACT_TITLES_KB";
const REPORTS_KB_ENV: &str = "REFEXTRACT_REPORTS_KB";

/// Reference extractor - Pull structured citations out of scholarly PDFs and text files
#[derive(Parser, Debug)]
#[command(name = "refextract", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract references from PDF or plain-text documents
    Extract(ExtractArgs),

    /// Validate knowledge base files
    CheckKb {
        /// Periodical-title knowledge base
        titles: PathBuf,

        /// Report-number knowledge base
        #[arg(long)]
        reports: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Documents to process (.pdf, or .txt read as lines)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format: json, xml or text
    #[arg(short, long)]
    format: Option<ExportFormat>,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Render titles as `Title,Volume,Page`
    #[arg(long)]
    inspire: bool,

    /// Periodical-title knowledge base (default: bundled)
    #[arg(long)]
    titles_kb: Option<PathBuf>,

    /// Report-number knowledge base (default: bundled)
    #[arg(long)]
    reports_kb: Option<PathBuf>,

    /// Number of documents processed in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Treat every input as plain text
    #[arg(long)]
    text: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let config = config_file::load_config();
    let color = ColorMode(
        !cli.no_color
            && config
                .output
                .as_ref()
                .and_then(|o| o.color)
                .unwrap_or(true),
    );

    match cli.command {
        Command::Extract(args) => extract(args, &config, color),
        Command::CheckKb { titles, reports } => check_kb(&titles, reports.as_deref(), color),
        Command::Config => print_config(&config),
    }
}

fn init_tracing(verbose: u8, no_color: bool) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        1 => tracing_subscriber::EnvFilter::new("info"),
        _ => tracing_subscriber::EnvFilter::new("debug"),
    };
    // fails only when a subscriber is already installed, which leaves logging working
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(filter)
        .try_init();
}

/// CLI flag > environment variable > config file. `None` means bundled.
fn resolve_kb_path(
    flag: Option<PathBuf>,
    env_var: &str,
    configured: Option<&str>,
) -> Option<PathBuf> {
    flag.or_else(|| std::env::var(env_var).ok().map(PathBuf::from))
        .or_else(|| configured.map(PathBuf::from))
}

fn kb_paths(
    config: &ConfigFile,
    titles: Option<PathBuf>,
    reports: Option<PathBuf>,
) -> (Option<PathBuf>, Option<PathBuf>) {
    let kb = config.knowledge_bases.as_ref();
    (
        resolve_kb_path(titles, TITLES_KB_ENV, kb.and_then(|k| k.titles.as_deref())),
        resolve_kb_path(
            reports,
            REPORTS_KB_ENV,
            kb.and_then(|k| k.report_numbers.as_deref()),
        ),
    )
}

/// Build the pipeline configuration from the `[extraction]` table.
fn parsing_config(config: &ConfigFile, inspire: bool) -> anyhow::Result<ParsingConfig> {
    let extraction = config.extraction.clone().unwrap_or_default();
    let mut builder = ParsingConfigBuilder::new();

    if let Some(strip) = extraction.strip_page_furniture {
        builder = builder.strip_page_furniture(strip);
    }
    if let Some(n) = extraction.semicolon_misc_sensitivity {
        builder = builder.semicolon_misc_sensitivity(n);
    }
    if let Some(n) = extraction.adjacent_author_gap {
        builder = builder.adjacent_author_gap(n);
    }
    if let Some(n) = extraction.min_misc_len {
        builder = builder.min_misc_len(n);
    }
    if let Some(n) = extraction.max_misc_len {
        builder = builder.max_misc_len(n);
    }
    if let Some(n) = extraction.end_marker_lookahead {
        builder = builder.end_marker_lookahead(n);
    }
    if let Some(ms) = extraction.line_time_budget_ms {
        builder = builder.line_time_budget(Duration::from_millis(ms));
    }
    if inspire || extraction.inspire_format.unwrap_or(false) {
        builder = builder.title_format(TitleFormat::Inspire);
    }

    builder.build().context("invalid extraction pattern")
}

fn export_format(flag: Option<ExportFormat>, config: &ConfigFile) -> anyhow::Result<ExportFormat> {
    if let Some(format) = flag {
        return Ok(format);
    }
    match config.output.as_ref().and_then(|o| o.format.as_deref()) {
        Some(name) => name.parse().map_err(anyhow::Error::msg),
        None => Ok(ExportFormat::default()),
    }
}

fn is_plain_text(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} documents (eta {eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn extract(args: ExtractArgs, config: &ConfigFile, color: ColorMode) -> anyhow::Result<()> {
    for path in &args.paths {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let (titles_kb, reports_kb) = kb_paths(config, args.titles_kb, args.reports_kb);
    let kbs = KnowledgeBases::load(titles_kb.as_deref(), reports_kb.as_deref())
        .context("failed to load knowledge bases")?;
    debug!(
        titles = kbs.titles.len(),
        report_numbers = kbs.report_numbers.len(),
        "loaded knowledge bases"
    );

    let parsing_config = parsing_config(config, args.inspire)?;
    let title_format = parsing_config.title_format();
    let format = export_format(args.format, config)?;
    let extractor = ReferenceExtractor::with_config(Arc::new(kbs), parsing_config);

    let jobs = args
        .jobs
        .or_else(|| config.concurrency.as_ref().and_then(|c| c.jobs));
    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool.build().context("failed to start worker pool")?;

    let pdftotext = PdftotextBackend::default();
    let force_text = args.text;
    let progress = progress_bar(args.paths.len());
    let outcomes: Vec<Result<DocumentResult, ParsingError>> = pool.install(|| {
        args.paths
            .par_iter()
            .map(|path| {
                let backend: &dyn TextBackend = if force_text || is_plain_text(path) {
                    &PlainTextBackend
                } else {
                    &pdftotext
                };
                let outcome = extractor.extract_from_path(path, backend);
                progress.inc(1);
                outcome
            })
            .collect()
    });
    progress.finish_and_clear();

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (path, outcome) in args.paths.iter().zip(outcomes) {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to process document");
                failures.push((path.display().to_string(), e.to_string()));
            }
        }
    }

    let rendered = render(&results, format, title_format)?;
    match &args.output {
        Some(path) => {
            let path = if path.extension().is_none() {
                path.with_extension(format.extension())
            } else {
                path.clone()
            };
            std::fs::write(&path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if !rendered.ends_with('\n') {
                writeln!(stdout)?;
            }
        }
    }

    let mut stderr = std::io::stderr().lock();
    output::print_summary(&mut stderr, &results, &failures, color)?;

    if results.is_empty() {
        anyhow::bail!("no document could be processed");
    }
    Ok(())
}

fn check_kb(titles: &Path, reports: Option<&Path>, color: ColorMode) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();

    let kb = TitleKnowledgeBase::load_from_path(titles)
        .with_context(|| format!("invalid title knowledge base {}", titles.display()))?;
    output::print_kb_summary(&mut stdout, titles, "title", kb.len(), color)?;

    if let Some(reports) = reports {
        let kb = ReportNumberKnowledgeBase::load_from_path(reports)
            .with_context(|| format!("invalid report-number knowledge base {}", reports.display()))?;
        output::print_kb_summary(&mut stdout, reports, "report-number", kb.len(), color)?;
    }
    Ok(())
}

fn print_config(config: &ConfigFile) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();

    match config_file::config_path() {
        Some(path) if path.exists() => writeln!(stdout, "# platform config: {}", path.display())?,
        Some(path) => writeln!(stdout, "# platform config: {} (not found)", path.display())?,
        None => writeln!(stdout, "# platform config: unavailable")?,
    }
    let (titles, reports) = kb_paths(config, None, None);
    let describe = |p: Option<PathBuf>| p.map_or("bundled".to_string(), |p| p.display().to_string());
    writeln!(stdout, "# title knowledge base: {}", describe(titles))?;
    writeln!(stdout, "# report-number knowledge base: {}", describe(reports))?;
    writeln!(stdout)?;

    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    write!(stdout, "{rendered}")?;
    Ok(())
}
