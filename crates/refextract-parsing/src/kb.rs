//! Knowledge bases of periodical titles and institutional report numbers.
//!
//! Both are plain-text files. The title KB maps non-standard title phrases to
//! their standard abbreviation:
//!
//! ```text
//! ASTRONOMY AND ASTROPHYSICS --- Astron. Astrophys.
//! NUCLEAR PHYSICS --- Nucl. Phys.
//! ```
//!
//! The report-number KB is made of institute blocks holding numeration
//! templates and category mappings:
//!
//! ```text
//! #####CERN#####
//! <s9999 999>
//! CERN EP --- CERN-EP
//! ```

use std::ops::Range;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

static BUNDLED_TITLES: &str = include_str!("../kbs/titles.kb");
static BUNDLED_REPORT_NUMBERS: &str = include_str!("../kbs/report-numbers.kb");

/// Punctuation turned into spaces both in KB seek phrases and in the
/// working copy of a reference line.
pub(crate) const WORKING_PUNCTUATION: &[char] = &['.', ',', ';', '\'', '(', ')', '-'];

#[derive(Error, Debug)]
pub enum KbError {
    #[error("failed to read knowledge base {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed title knowledge base line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("invalid pattern built from knowledge base line {line}: {source}")]
    Pattern {
        line: usize,
        #[source]
        source: regex::Error,
    },
}

/// Normalize a phrase the way the working copy of a line is normalized:
/// upper-cased, punctuation replaced by spaces, whitespace collapsed.
pub fn normalize_phrase(phrase: &str) -> String {
    let upper: String = phrase
        .to_uppercase()
        .chars()
        .map(|c| if WORKING_PUNCTUATION.contains(&c) { ' ' } else { c })
        .collect();
    upper.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_kb(path: &Path) -> Result<String, KbError> {
    std::fs::read_to_string(path).map_err(|source| KbError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// One non-standard title phrase and the standard title it maps to.
#[derive(Debug, Clone)]
pub struct TitleEntry {
    /// Normalized seek phrase.
    pub seek: String,
    /// Standard title without series.
    pub title: String,
    pub series: Option<String>,
    pattern: Regex,
}

impl TitleEntry {
    fn new(seek: String, replacement: &str, line: usize) -> Result<Self, KbError> {
        let (title, series) = split_series(replacement);
        let pattern = Regex::new(&format!(r"\b({})(?:[^A-Z0-9]|$)", regex::escape(&seek)))
            .map_err(|source| KbError::Pattern { line, source })?;
        Ok(Self {
            seek,
            title,
            series,
            pattern,
        })
    }

    /// Find every occurrence of the seek phrase in a working line.
    ///
    /// Returns the byte span of the phrase itself. Occurrences directly
    /// preceded by a slash are part of a URL or report number and skipped.
    pub fn find_in<'a>(&'a self, working: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.pattern.captures_iter(working).filter_map(move |caps| {
            let m = caps.get(1)?;
            if m.start() > 0 && working.as_bytes()[m.start() - 1] == b'/' {
                return None;
            }
            Some((m.start(), m.end()))
        })
    }

    /// Standard title including the series, e.g. `Phys. Rev. D`.
    pub fn full_title(&self) -> String {
        match &self.series {
            Some(s) => format!("{} {}", self.title, s),
            None => self.title.clone(),
        }
    }
}

fn split_series(replacement: &str) -> (String, Option<String>) {
    match replacement.split_once(';') {
        Some((title, series)) if !series.trim().is_empty() => {
            (title.trim().to_string(), Some(series.trim().to_string()))
        }
        Some((title, _)) => (title.trim().to_string(), None),
        None => (replacement.trim().to_string(), None),
    }
}

/// Periodical title synonyms, tried longest seek phrase first.
#[derive(Debug, Clone, Default)]
pub struct TitleKnowledgeBase {
    entries: Vec<TitleEntry>,
}

impl TitleKnowledgeBase {
    /// Parse a title KB. Any line that is not `seek --- replace`, blank, a
    /// `#` comment or a line containing a backslash is a fatal error.
    pub fn parse(text: &str) -> Result<Self, KbError> {
        static LINE_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(.+?)\s*---\s*(.+?)$").unwrap());

        let mut seen: Vec<String> = Vec::new();
        let mut entries: Vec<TitleEntry> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.contains('\\') {
                continue;
            }
            let caps = LINE_RE
                .captures(line)
                .ok_or_else(|| KbError::MalformedLine {
                    line: line_no,
                    content: raw.to_string(),
                })?;
            let seek = normalize_phrase(&caps[1]);
            let replacement = caps[2].trim();
            if seek.is_empty() || replacement.is_empty() {
                return Err(KbError::MalformedLine {
                    line: line_no,
                    content: raw.to_string(),
                });
            }

            if !seen.contains(&seek) {
                seen.push(seek.clone());
                entries.push(TitleEntry::new(seek, replacement, line_no)?);
            }

            // The standard form is itself a searchable phrase.
            let (title, series) = split_series(replacement);
            let standard_seek = normalize_phrase(&match &series {
                Some(s) => format!("{} {}", title, s),
                None => title,
            });
            if !standard_seek.is_empty() && !seen.contains(&standard_seek) {
                seen.push(standard_seek.clone());
                entries.push(TitleEntry::new(standard_seek, replacement, line_no)?);
            }
        }

        entries.sort_by(|a, b| b.seek.len().cmp(&a.seek.len()));
        debug!(entries = entries.len(), "parsed title knowledge base");
        Ok(Self { entries })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, KbError> {
        Self::parse(&read_kb(path)?)
    }

    pub fn entries(&self) -> &[TitleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A compiled report-number category of one institute.
#[derive(Debug, Clone)]
pub struct ReportNumberEntry {
    /// KB line at which the institute block was compiled.
    pub block_line: usize,
    /// Category as written in the KB (left-hand side).
    pub category: String,
    /// Standard category (right-hand side).
    pub standard: String,
    pattern: Regex,
}

impl ReportNumberEntry {
    /// Find report numbers of this category in a search line.
    ///
    /// Yields the byte span of the whole report number (including an
    /// enclosing bracket) and the span of its numeration.
    pub fn find_in<'a>(
        &'a self,
        line: &'a str,
    ) -> impl Iterator<Item = (Range<usize>, Range<usize>)> + 'a {
        self.pattern.captures_iter(line).filter_map(|caps| {
            let whole = caps.get(1)?;
            let numn = caps.name("numn")?;
            Some((whole.range(), numn.range()))
        })
    }
}

/// Institutional report-number patterns, tried longest category first.
#[derive(Debug, Clone, Default)]
pub struct ReportNumberKnowledgeBase {
    entries: Vec<ReportNumberEntry>,
}

impl ReportNumberKnowledgeBase {
    /// Parse a report-number KB. Unrecognised lines are ignored.
    pub fn parse(text: &str) -> Result<Self, KbError> {
        static HEADER_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(?:#{5}|\*{5})\s*(.+?)\s*(?:#{5}|\*{5})$").unwrap());
        static CATEGORY_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(\w.*?)\s*---\s*(\w.*?)$").unwrap());
        static NUMERATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<(.+)>$").unwrap());

        let mut entries = Vec::new();
        let mut institute: Option<String> = None;
        let mut categories: Vec<(String, String)> = Vec::new();
        let mut templates: Vec<String> = Vec::new();
        let mut line_no = 0;

        for (idx, raw) in text.lines().enumerate() {
            line_no = idx + 1;
            let line = raw.trim();

            if let Some(caps) = HEADER_RE.captures(line) {
                flush_institute(
                    institute.as_deref(),
                    &mut categories,
                    &mut templates,
                    line_no,
                    &mut entries,
                )?;
                institute = Some(caps[1].to_string());
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            if let Some(caps) = CATEGORY_RE.captures(line) {
                categories.push((caps[1].to_string(), caps[2].to_string()));
                continue;
            }
            if let Some(caps) = NUMERATION_RE.captures(line) {
                templates.push(caps[1].to_string());
            }
        }
        flush_institute(
            institute.as_deref(),
            &mut categories,
            &mut templates,
            line_no,
            &mut entries,
        )?;

        entries.sort_by(|a, b| b.category.len().cmp(&a.category.len()));
        debug!(entries = entries.len(), "parsed report-number knowledge base");
        Ok(Self { entries })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, KbError> {
        Self::parse(&read_kb(path)?)
    }

    pub fn entries(&self) -> &[ReportNumberEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn flush_institute(
    institute: Option<&str>,
    categories: &mut Vec<(String, String)>,
    templates: &mut Vec<String>,
    line_no: usize,
    entries: &mut Vec<ReportNumberEntry>,
) -> Result<(), KbError> {
    let categories = std::mem::take(categories);
    let mut templates = std::mem::take(templates);
    if categories.is_empty() || templates.is_empty() {
        return Ok(());
    }

    templates.sort_by_key(|t| std::cmp::Reverse(template_len(t)));
    let numeration = templates
        .iter()
        .map(|t| template_to_regex(t))
        .collect::<Vec<_>>()
        .join("|");

    for (category, standard) in categories {
        let seek = normalize_phrase(&category);
        let pattern = format!(
            r"(?:^|[^a-zA-Z0-9/.\-])([\[(]?(?P<categ>{})(?P<numn>{})[\])]?)",
            regex::escape(&seek).replace(' ', r"\s*"),
            numeration
        );
        let pattern =
            Regex::new(&pattern).map_err(|source| KbError::Pattern { line: line_no, source })?;
        entries.push(ReportNumberEntry {
            block_line: line_no,
            category,
            standard: standard.trim().to_string(),
            pattern,
        });
    }
    debug!(institute, line = line_no, "compiled institute report-number block");
    Ok(())
}

/// Length of a numeration template with each `[...]` group counted once.
fn template_len(template: &str) -> usize {
    static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]+\]").unwrap());
    CLASS_RE.replace_all(template, "1").chars().count()
}

/// Convert a numeration template into a regex fragment.
///
/// `9` digit, `9+` digits, `w+` word, `a` letter, `v` `[Vv]`, `mm` month,
/// `yyyy` four-digit year, `yy` two digits, `s` optional whitespace,
/// `"text"` literal text, `[...]` optional group. Anything else is literal.
pub fn template_to_regex(template: &str) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    convert_template(&chars, &mut out);
    out
}

fn convert_template(chars: &[char], out: &mut String) {
    let starts_with = |i: usize, s: &str| {
        let pat: Vec<char> = s.chars().collect();
        chars.len() >= i + pat.len() && chars[i..i + pat.len()] == pat[..]
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            let close = chars[i + 1..].iter().position(|&c| c == '"');
            if let Some(len) = close {
                let literal: String = chars[i + 1..i + 1 + len].iter().collect();
                out.push_str(&regex::escape(&literal));
                i += len + 2;
                continue;
            }
        }
        if c == '[' {
            let close = chars[i + 1..].iter().position(|&c| c == ']');
            if let Some(len) = close {
                out.push_str("(?:");
                convert_template(&chars[i + 1..i + 1 + len], out);
                out.push_str(")?");
                i += len + 2;
                continue;
            }
        }
        if starts_with(i, "yyyy") {
            out.push_str(r"[12]\d{3}");
            i += 4;
        } else if starts_with(i, "yy") {
            out.push_str(r"\d\d");
            i += 2;
        } else if starts_with(i, "mm") {
            out.push_str(r"(?:0[1-9]|1[0-2])");
            i += 2;
        } else if starts_with(i, "9+") {
            out.push_str(r"\d+");
            i += 2;
        } else if starts_with(i, "w+") {
            out.push_str(r"\w+");
            i += 2;
        } else {
            match c {
                '9' => out.push_str(r"\d"),
                'a' => out.push_str("[A-Za-z]"),
                'v' => out.push_str("[Vv]"),
                's' => out.push_str(r"\s*"),
                '/' => out.push('/'),
                ' ' => out.push(' '),
                other => out.push_str(&regex::escape(&other.to_string())),
            }
            i += 1;
        }
    }
}

/// The title and report-number knowledge bases, loaded once and shared.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBases {
    pub titles: TitleKnowledgeBase,
    pub report_numbers: ReportNumberKnowledgeBase,
}

impl KnowledgeBases {
    pub fn new(titles: TitleKnowledgeBase, report_numbers: ReportNumberKnowledgeBase) -> Self {
        Self {
            titles,
            report_numbers,
        }
    }

    /// The small knowledge bases compiled into the crate.
    pub fn bundled() -> Result<Self, KbError> {
        Ok(Self {
            titles: TitleKnowledgeBase::parse(BUNDLED_TITLES)?,
            report_numbers: ReportNumberKnowledgeBase::parse(BUNDLED_REPORT_NUMBERS)?,
        })
    }

    /// Load KB files, falling back to the bundled KB for any path not given.
    pub fn load(titles: Option<&Path>, report_numbers: Option<&Path>) -> Result<Self, KbError> {
        let titles = match titles {
            Some(p) => TitleKnowledgeBase::load_from_path(p)?,
            None => TitleKnowledgeBase::parse(BUNDLED_TITLES)?,
        };
        let report_numbers = match report_numbers {
            Some(p) => ReportNumberKnowledgeBase::load_from_path(p)?,
            None => ReportNumberKnowledgeBase::parse(BUNDLED_REPORT_NUMBERS)?,
        };
        Ok(Self {
            titles,
            report_numbers,
        })
    }
}
