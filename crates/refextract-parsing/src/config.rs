use std::time::Duration;

use regex::Regex;
use refextract_core::TitleFormat;

/// Extra regexes layered over a built-in pattern set.
///
/// Built-in patterns are tried first, then the extra ones in the order they
/// were added. With `replaces_builtin` only the extra patterns are used.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    extra: Vec<Regex>,
    replaces_builtin: bool,
}

impl PatternList {
    fn compile(patterns: &[String], replaces_builtin: bool) -> Result<Self, regex::Error> {
        let extra = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            extra,
            replaces_builtin,
        })
    }

    /// The patterns to try, in order.
    pub fn active<'a>(&'a self, builtin: &'a [Regex]) -> Vec<&'a Regex> {
        let builtin = if self.replaces_builtin { &[][..] } else { builtin };
        builtin.iter().chain(&self.extra).collect()
    }

    pub fn extra(&self) -> &[Regex] {
        &self.extra
    }

    pub fn replaces_builtin(&self) -> bool {
        self.replaces_builtin
    }
}

/// Configuration for the reference extraction pipeline.
///
/// Every heuristic threshold lives here so no stage reads global state.
/// Use [`ParsingConfigBuilder`] to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── page.rs ──
    /// Remove running headers, footers and page breaks before detection.
    pub(crate) strip_page_furniture: bool,

    // ── section.rs ──
    /// Patterns recognising a reference-section title line. A named group
    /// `title` selects the title text; without it the whole match is used.
    pub(crate) section_title_patterns: PatternList,
    /// Patterns recognising the title of a section following the references.
    pub(crate) post_section_patterns: PatternList,
    /// Lines, title included, searched for the first marker (default: 6).
    pub(crate) title_marker_lookahead: usize,
    /// Lines searched for marker 2 to confirm a no-title start (default: 10).
    pub(crate) marker_confirm_window: usize,
    /// A no-title start is accepted unconfirmed when fewer lines follow it (default: 5).
    pub(crate) marker_min_tail: usize,
    /// Lines searched for the next marker after a post-section title (default: 5).
    pub(crate) end_marker_lookahead: usize,

    // ── tagger.rs ──
    /// Wall-clock budget for tagging a single line (default: 2s).
    pub(crate) line_time_budget: Duration,

    // ── assemble.rs ──
    /// Misc characters that let a semicolon split a record without a title (default: 60).
    pub(crate) semicolon_misc_sensitivity: usize,
    /// Largest gap in characters between two author groups merged as one (default: 10).
    pub(crate) adjacent_author_gap: usize,
    /// Misc-only records shorter than this are dropped (default: 4).
    pub(crate) min_misc_len: usize,
    /// Misc-only records longer than this are dropped (default: 1024).
    pub(crate) max_misc_len: usize,
    /// Rendering of title fields.
    pub(crate) title_format: TitleFormat,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            strip_page_furniture: true,
            section_title_patterns: PatternList::default(),
            post_section_patterns: PatternList::default(),
            title_marker_lookahead: 6,
            marker_confirm_window: 10,
            marker_min_tail: 5,
            end_marker_lookahead: 5,
            line_time_budget: Duration::from_secs(2),
            semicolon_misc_sensitivity: 60,
            adjacent_author_gap: 10,
            min_misc_len: 4,
            max_misc_len: 1024,
            title_format: TitleFormat::Standard,
        }
    }
}

impl ParsingConfig {
    pub fn title_format(&self) -> TitleFormat {
        self.title_format
    }

    pub fn line_time_budget(&self) -> Duration {
        self.line_time_budget
    }
}

/// Builder for [`ParsingConfig`].
///
/// Accepts string patterns that are compiled to `Regex` in [`build()`](Self::build).
/// Fails fast with `regex::Error` if any pattern is invalid.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    strip_page_furniture: Option<bool>,
    section_titles: Vec<String>,
    replace_section_titles: bool,
    post_section_titles: Vec<String>,
    replace_post_section_titles: bool,
    title_marker_lookahead: Option<usize>,
    marker_confirm_window: Option<usize>,
    marker_min_tail: Option<usize>,
    end_marker_lookahead: Option<usize>,
    line_time_budget: Option<Duration>,
    semicolon_misc_sensitivity: Option<usize>,
    adjacent_author_gap: Option<usize>,
    min_misc_len: Option<usize>,
    max_misc_len: Option<usize>,
    title_format: Option<TitleFormat>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strip_page_furniture(mut self, strip: bool) -> Self {
        self.strip_page_furniture = Some(strip);
        self
    }

    // ── Section titles ──

    /// Use only these section-title patterns, dropping the built-in ones.
    pub fn set_section_title_patterns(mut self, patterns: Vec<String>) -> Self {
        self.section_titles = patterns;
        self.replace_section_titles = true;
        self
    }

    /// Also accept this section-title pattern.
    pub fn add_section_title_pattern(mut self, pattern: String) -> Self {
        self.section_titles.push(pattern);
        self
    }

    /// Use only these post-section title patterns, dropping the built-in ones.
    pub fn set_post_section_patterns(mut self, patterns: Vec<String>) -> Self {
        self.post_section_titles = patterns;
        self.replace_post_section_titles = true;
        self
    }

    pub fn add_post_section_pattern(mut self, pattern: String) -> Self {
        self.post_section_titles.push(pattern);
        self
    }

    // ── Boundary windows ──

    pub fn title_marker_lookahead(mut self, n: usize) -> Self {
        self.title_marker_lookahead = Some(n);
        self
    }

    pub fn marker_confirm_window(mut self, n: usize) -> Self {
        self.marker_confirm_window = Some(n);
        self
    }

    pub fn marker_min_tail(mut self, n: usize) -> Self {
        self.marker_min_tail = Some(n);
        self
    }

    pub fn end_marker_lookahead(mut self, n: usize) -> Self {
        self.end_marker_lookahead = Some(n);
        self
    }

    // ── Tagging and assembly ──

    pub fn line_time_budget(mut self, budget: Duration) -> Self {
        self.line_time_budget = Some(budget);
        self
    }

    pub fn semicolon_misc_sensitivity(mut self, n: usize) -> Self {
        self.semicolon_misc_sensitivity = Some(n);
        self
    }

    pub fn adjacent_author_gap(mut self, n: usize) -> Self {
        self.adjacent_author_gap = Some(n);
        self
    }

    pub fn min_misc_len(mut self, n: usize) -> Self {
        self.min_misc_len = Some(n);
        self
    }

    pub fn max_misc_len(mut self, n: usize) -> Self {
        self.max_misc_len = Some(n);
        self
    }

    pub fn title_format(mut self, format: TitleFormat) -> Self {
        self.title_format = Some(format);
        self
    }

    /// Compile all string patterns into regexes and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, regex::Error> {
        let defaults = ParsingConfig::default();
        Ok(ParsingConfig {
            strip_page_furniture: self
                .strip_page_furniture
                .unwrap_or(defaults.strip_page_furniture),
            section_title_patterns: PatternList::compile(
                &self.section_titles,
                self.replace_section_titles,
            )?,
            post_section_patterns: PatternList::compile(
                &self.post_section_titles,
                self.replace_post_section_titles,
            )?,
            title_marker_lookahead: self
                .title_marker_lookahead
                .unwrap_or(defaults.title_marker_lookahead),
            marker_confirm_window: self
                .marker_confirm_window
                .unwrap_or(defaults.marker_confirm_window),
            marker_min_tail: self.marker_min_tail.unwrap_or(defaults.marker_min_tail),
            end_marker_lookahead: self
                .end_marker_lookahead
                .unwrap_or(defaults.end_marker_lookahead),
            line_time_budget: self.line_time_budget.unwrap_or(defaults.line_time_budget),
            semicolon_misc_sensitivity: self
                .semicolon_misc_sensitivity
                .unwrap_or(defaults.semicolon_misc_sensitivity),
            adjacent_author_gap: self
                .adjacent_author_gap
                .unwrap_or(defaults.adjacent_author_gap),
            min_misc_len: self.min_misc_len.unwrap_or(defaults.min_misc_len),
            max_misc_len: self.max_misc_len.unwrap_or(defaults.max_misc_len),
            title_format: self.title_format.unwrap_or(defaults.title_format),
        })
    }
}
