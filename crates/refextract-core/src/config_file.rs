use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub knowledge_bases: Option<KnowledgeBaseConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub output: Option<OutputConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Periodical-title KB file.
    pub titles: Option<String>,
    /// Institutional report-number KB file.
    pub report_numbers: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub inspire_format: Option<bool>,
    pub strip_page_furniture: Option<bool>,
    pub semicolon_misc_sensitivity: Option<usize>,
    pub adjacent_author_gap: Option<usize>,
    pub min_misc_len: Option<usize>,
    pub max_misc_len: Option<usize>,
    pub end_marker_lookahead: Option<usize>,
    pub line_time_budget_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// `json`, `xml` or `text`.
    pub format: Option<String>,
    pub color: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub jobs: Option<usize>,
}

/// Platform config directory path: `<config_dir>/refextract/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("refextract").join("config.toml"))
}

/// Load config by cascading CWD `.refextract.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".refextract.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    get: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&get)
        .or_else(|| base.as_ref().and_then(&get))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bk, ok) = (&base.knowledge_bases, &overlay.knowledge_bases);
    let (be, oe) = (&base.extraction, &overlay.extraction);
    let (bo, oo) = (&base.output, &overlay.output);
    let (bc, oc) = (&base.concurrency, &overlay.concurrency);

    ConfigFile {
        knowledge_bases: Some(KnowledgeBaseConfig {
            titles: pick(ok, bk, |k| k.titles.clone()),
            report_numbers: pick(ok, bk, |k| k.report_numbers.clone()),
        }),
        extraction: Some(ExtractionConfig {
            inspire_format: pick(oe, be, |e| e.inspire_format),
            strip_page_furniture: pick(oe, be, |e| e.strip_page_furniture),
            semicolon_misc_sensitivity: pick(oe, be, |e| e.semicolon_misc_sensitivity),
            adjacent_author_gap: pick(oe, be, |e| e.adjacent_author_gap),
            min_misc_len: pick(oe, be, |e| e.min_misc_len),
            max_misc_len: pick(oe, be, |e| e.max_misc_len),
            end_marker_lookahead: pick(oe, be, |e| e.end_marker_lookahead),
            line_time_budget_ms: pick(oe, be, |e| e.line_time_budget_ms),
        }),
        output: Some(OutputConfig {
            format: pick(oo, bo, |o| o.format.clone()),
            color: pick(oo, bo, |o| o.color),
        }),
        concurrency: Some(ConcurrencyConfig {
            jobs: pick(oc, bc, |c| c.jobs),
        }),
    }
}
