use once_cell::sync::Lazy;
use regex::Regex;
use refextract_core::HowFound;
use tracing::debug;

use crate::config::ParsingConfig;

/// A recognised reference-line marker at the start of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    /// The marker text, e.g. `[12]` or `3.`.
    pub mark: String,
    /// The marker number, when the marker style carries one.
    pub marknum: Option<u32>,
    /// Byte offset just past the marker (and any whitespace it swallowed).
    pub end: usize,
}

/// One style of reference-line marker (`[n]`, `n.`, `{n}`, ...).
#[derive(Debug, Clone)]
pub struct MarkerPattern {
    body: String,
    anchored: Regex,
    floating: Regex,
    /// Reject the match when a digit follows it, so `1.5` is not `1.`.
    no_digit_after: bool,
}

impl MarkerPattern {
    fn new(body: &str, no_digit_after: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            body: body.to_string(),
            anchored: Regex::new(&format!(r"^\s*(?P<mark>{body})"))?,
            floating: Regex::new(&format!(r"(?P<mark>{body})"))?,
            no_digit_after,
        })
    }

    fn accept(&self, text: &str, caps: &regex::Captures) -> Option<MarkerMatch> {
        let whole = caps.get(0)?;
        if self.no_digit_after
            && text[whole.end()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            return None;
        }
        Some(MarkerMatch {
            mark: caps.name("mark")?.as_str().trim().to_string(),
            marknum: caps.name("marknum").and_then(|m| m.as_str().parse().ok()),
            end: whole.end(),
        })
    }

    /// Match a marker at the start of `line`.
    pub fn match_start(&self, line: &str) -> Option<MarkerMatch> {
        let caps = self.anchored.captures(line)?;
        self.accept(line, &caps)
    }

    /// Find markers anywhere in `text` that start a word. Returned offsets
    /// are the byte position of the marker.
    pub fn find_in<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (usize, MarkerMatch)> + 'a {
        self.floating.captures_iter(text).filter_map(move |caps| {
            let start = caps.get(0)?.start();
            let word_start = text[..start]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace);
            if !word_start {
                return None;
            }
            self.accept(text, &caps).map(|m| (start, m))
        })
    }

    /// Match a marker following the section title on the same line.
    fn match_after_title(&self, line: &str, title: &str) -> Option<MarkerMatch> {
        let re = Regex::new(&format!(
            r"^.*?{}\s*(?P<mark>{})",
            regex::escape(title),
            self.body
        ))
        .ok()?;
        let caps = re.captures(line)?;
        self.accept(line, &caps)
    }

    /// True when the matched marker is a bare number such as `12`.
    pub fn is_bare_number(mark: &str) -> bool {
        !mark.is_empty() && mark.chars().all(|c| c.is_ascii_digit())
    }
}

fn build_markers(bodies: &[(&str, bool)]) -> Vec<MarkerPattern> {
    bodies
        .iter()
        .map(|(body, strict)| MarkerPattern::new(body, *strict).unwrap())
        .collect()
}

/// All marker styles, in the order they are tried.
static MARKER_PATTERNS: Lazy<Vec<MarkerPattern>> = Lazy::new(|| {
    build_markers(&[
        (r"\[\s*(?P<marknum>\d+)\s*\]", false),
        (r"\[\s*[a-zA-Z:-]+\+?\s?(?:\d{1,4}[A-Za-z:-]?)?\s*\]", false),
        (r"\{\s*(?P<marknum>\d+)\s*\}", false),
        (r"<\s*(?P<marknum>\d+)\s*>", false),
        (r"\(\s*(?P<marknum>\d+)\s*\)", false),
        (r"(?P<marknum>\d+)\s*\.", true),
        (r"(?P<marknum>\d+)\s+", false),
        (r"(?P<marknum>\d+)\s*\]", false),
        (r"(?P<marknum>\d+)\s*\}", false),
        (r"(?P<marknum>\d+)\s*\)", false),
        (r"(?P<marknum>\d+)\s*>", false),
        (r"\[\s*\d+\.\d+\s*\]", false),
        (r"\[\s*\]", false),
        (r"\*", false),
    ])
});

static BRACKET_MARKER: Lazy<MarkerPattern> =
    Lazy::new(|| MarkerPattern::new(r"[\[\{]\s*(?P<marknum>\d+)\s*[\]\}]", false).unwrap());
static DOT_MARKER: Lazy<MarkerPattern> =
    Lazy::new(|| MarkerPattern::new(r"(?P<marknum>\d+)\s*\.", true).unwrap());
static NUMBER_MARKER: Lazy<MarkerPattern> =
    Lazy::new(|| MarkerPattern::new(r"(?P<marknum>\d+)(?:\s+|$)", false).unwrap());

/// The default marker styles.
pub fn marker_patterns() -> &'static [MarkerPattern] {
    &MARKER_PATTERNS
}

fn match_any_marker(line: &str, patterns: &[MarkerPattern]) -> Option<(usize, MarkerMatch)> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(i, p)| p.match_start(line).map(|m| (i, m)))
}

/// Letters of `word` separated by optional whitespace.
fn spaced(word: &str) -> String {
    word.chars()
        .map(|c| {
            if c == ' ' {
                String::new()
            } else {
                regex::escape(&c.to_string())
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(r"\s*")
}

static SECTION_TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    const TITLES: &[&str] = &[
        "references",
        "r\u{e9}f\u{e9}rences",
        "r\u{e9}ferences",
        "bibliography",
        "bibliographie",
        "literaturverzeichnis",
        "citations",
        "refs",
        "publications",
        "r\u{e9}fs",
        "reference",
        "r\u{e9}f\u{e9}rence",
    ];
    const NUMBERED_HEAD: &str =
        r"^\s*[\[\-\{\(]?\s*(?:\w{1,5}(?:[\.\-,]\w{1,5})?\s*[\.\-\}\)\]]\s*)?";
    const BARE_NUMBER_HEAD: &str = r"^\d{1,3}\s*";
    const TAIL: &str = r"\.?[\)\}\]]?(?:$|\s*[\[\{\(<]\s*[1a-z]\s*[\}\)>\]]|:$)";

    let section = spaced("section");
    let mut patterns = Vec::new();
    for head in [NUMBERED_HEAD, BARE_NUMBER_HEAD] {
        for title in TITLES {
            patterns.push(format!(
                r"(?i){head}(?P<title>{}\s*(?:{section}\s*)?){TAIL}",
                spaced(title)
            ));
        }
    }
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
});

static POST_SECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    const TITLES: &[&str] = &[
        "appendix",
        "appendices",
        "acknowledgements",
        "acknowledgement",
        "acknowledgments",
        "acknowledgment",
        "tables",
        "table",
        "figures",
        "figure",
        "list of figures",
        "list of figure",
        "annexes",
        "annex",
        "discussions",
        "discussion",
        "remerciements",
        "remerciement",
        "index",
        "summary",
    ];
    const HEAD: &str = r"^\s*(?:[\{\(<\[]?\s*\w\s*[\)\}>\.\-\]]?\s*)?";
    const NUMERATION: &str = r"(?:\d+|\w\b|i{1,3}v?|vi{0,3})[\.,]{0,2}\b";

    let alternation = TITLES
        .iter()
        .map(|t| spaced(t))
        .collect::<Vec<_>>()
        .join("|");
    [
        format!(r"(?i){HEAD}(?:{alternation})(?:\s*:\s*)?$"),
        format!(r"(?i)^\s*(?:figure|fig\.?|table|tab\.?)\s*{NUMERATION}"),
        r"^\s*[LVIX]\.?\s*[Cc]onclusion[\w\s]*$".to_string(),
        r"^\s*Appendix\s[A-Z]\s*:\s*[a-zA-Z]+\s*".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Boilerplate left by authoring tools at the end of a paper.
static POST_SECTION_KEYWORDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*(?:prepared|created).*(?:AAS\s*)?\sLATEX",
        r"(?i)^\s*AAS\s+LATEX\s+macros\s+v",
        r"(?i)^\s*This paper has been produced using",
        r"(?i)^\s*This article was processed by the author using Springer-Verlag LATEX",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Location of the reference section within a document.
#[derive(Debug, Clone)]
pub struct SectionBounds {
    /// Index of the title line, or of the first marker line when no title was found.
    pub start_line: usize,
    /// Index of the last line of the section, once known.
    pub end_line: Option<usize>,
    /// Section title as it appears in the document.
    pub title: Option<String>,
    /// Marker of the first reference line.
    pub marker: Option<String>,
    /// Marker style used by the section.
    pub marker_pattern: Option<MarkerPattern>,
    /// The first marker shares the title line.
    pub title_marker_same_line: bool,
    pub how_found: HowFound,
}

fn match_section_title(line: &str, patterns: &[&Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(line)?;
        let title = caps.name("title").or_else(|| caps.get(0))?;
        let title = title.as_str().trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}

/// Marker found near a section title.
struct TitleNumeration {
    marker: Option<String>,
    pattern: Option<MarkerPattern>,
    same_line: bool,
    /// The marker is number 1, so this title starts the references.
    confirmed: bool,
}

impl TitleNumeration {
    fn none() -> Self {
        Self {
            marker: None,
            pattern: None,
            same_line: false,
            confirmed: false,
        }
    }
}

/// Look for the first reference marker on the title line or below it.
fn find_numeration(window: &[String], title: &str) -> TitleNumeration {
    let Some((title_line, body)) = window.split_first() else {
        return TitleNumeration::none();
    };

    for pattern in MARKER_PATTERNS.iter() {
        if let Some(m) = pattern.match_after_title(title_line, title) {
            if m.marknum == Some(1) {
                return TitleNumeration {
                    marker: Some(m.mark),
                    pattern: Some(pattern.clone()),
                    same_line: true,
                    confirmed: true,
                };
            }
        }
    }

    for line in body {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((idx, m)) = match_any_marker(line, &MARKER_PATTERNS) else {
            continue;
        };
        match m.marknum {
            Some(1) | None => {
                return TitleNumeration {
                    confirmed: m.marknum.is_some(),
                    marker: Some(m.mark),
                    pattern: Some(MARKER_PATTERNS[idx].clone()),
                    same_line: false,
                };
            }
            Some(_) => continue,
        }
    }
    TitleNumeration::none()
}

fn find_start_by_title(lines: &[String], config: &ParsingConfig) -> Option<SectionBounds> {
    let title_patterns = config.section_title_patterns.active(&SECTION_TITLE_PATTERNS);
    let mut candidate: Option<SectionBounds> = None;

    for (index, line) in lines.iter().enumerate().rev() {
        let Some(title) = match_section_title(line, &title_patterns) else {
            continue;
        };
        let window_end = (index + config.title_marker_lookahead).min(lines.len());
        let numeration = find_numeration(&lines[index..window_end], &title);

        // never trade a candidate with a marker for one without
        if candidate.as_ref().is_some_and(|c| c.marker.is_some()) && numeration.marker.is_none() {
            continue;
        }
        debug!(line = index, %title, confirmed = numeration.confirmed, "section title candidate");
        candidate = Some(SectionBounds {
            start_line: index,
            end_line: None,
            title: Some(title),
            marker: numeration.marker,
            marker_pattern: numeration.pattern,
            title_marker_same_line: numeration.same_line,
            how_found: HowFound::Title,
        });
        if numeration.confirmed {
            break;
        }
    }
    candidate
}

/// Scan backwards for the line marked `1`, confirmed by a marker `2` shortly after.
fn find_start_by_markers(
    lines: &[String],
    pattern: &MarkerPattern,
    how_found: HowFound,
    config: &ParsingConfig,
) -> Option<SectionBounds> {
    for (index, line) in lines.iter().enumerate().rev() {
        let Some(m) = pattern.match_start(line.trim()) else {
            continue;
        };
        if m.marknum != Some(1) {
            continue;
        }
        let zone_end = (index + 1 + config.marker_confirm_window).min(lines.len());
        let zone = &lines[index + 1..zone_end];
        let confirmed = zone.len() < config.marker_min_tail
            || zone.iter().any(|l| {
                pattern
                    .match_start(l.trim())
                    .is_some_and(|m| m.marknum == Some(2))
            });
        if confirmed {
            return Some(SectionBounds {
                start_line: index,
                end_line: None,
                title: None,
                marker: Some(m.mark),
                marker_pattern: Some(pattern.clone()),
                title_marker_same_line: false,
                how_found,
            });
        }
    }
    None
}

/// Locate the first line of the reference section.
///
/// Tries the section title first, then bracket, dot and bare-number
/// markers. The strategy that succeeded is recorded in `how_found`.
pub fn find_section_start(lines: &[String]) -> Option<SectionBounds> {
    find_section_start_with_config(lines, &ParsingConfig::default())
}

/// Config-aware version of [`find_section_start`].
pub(crate) fn find_section_start_with_config(
    lines: &[String],
    config: &ParsingConfig,
) -> Option<SectionBounds> {
    if lines.is_empty() {
        return None;
    }
    if let Some(bounds) = find_start_by_title(lines, config) {
        return Some(bounds);
    }
    let strategies: [(&MarkerPattern, HowFound); 3] = [
        (&BRACKET_MARKER, HowFound::Brackets),
        (&DOT_MARKER, HowFound::Dots),
        (&NUMBER_MARKER, HowFound::Numbers),
    ];
    strategies
        .into_iter()
        .find_map(|(pattern, how)| find_start_by_markers(lines, pattern, how, config))
}

fn is_digit_line(line: &str) -> bool {
    let digits: String = line
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-' | '+' | '\u{00D7}' | '\u{2212}'))
        .collect();
    let digits = digits.trim();
    digits.len() > 10 && digits.chars().all(|c| c.is_ascii_digit())
}

/// At least four lines of long digit runs (data tables) start at `x`.
fn digit_block_starts(lines: &[String], x: usize) -> bool {
    const MIN_DIGIT_LINES: usize = 4;
    if !is_digit_line(&lines[x]) {
        return false;
    }
    let mut count = 1;
    for line in &lines[x + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        if !is_digit_line(line) {
            return false;
        }
        count += 1;
        if count >= MIN_DIGIT_LINES {
            return true;
        }
    }
    false
}

fn next_marker_follows(
    lines: &[String],
    x: usize,
    current: u32,
    markers: &[MarkerPattern],
    lookahead: usize,
) -> bool {
    let end = (x + 1 + lookahead).min(lines.len());
    lines[(x + 1).min(end)..end].iter().any(|line| {
        let line = line.trim();
        match match_any_marker(line, markers) {
            Some((_, m)) if !MarkerPattern::is_bare_number(line[..m.end].trim()) => {
                m.marknum.is_none_or(|n| n == current + 1)
            }
            _ => false,
        }
    })
}

/// Find the last line of the reference section starting at `bounds.start_line`.
///
/// Returns `None` when the start is out of range. The returned index may
/// precede the first reference line when the section is empty.
pub fn find_section_end(lines: &[String], bounds: &SectionBounds) -> Option<usize> {
    find_section_end_with_config(lines, bounds, &ParsingConfig::default())
}

/// Config-aware version of [`find_section_end`].
pub(crate) fn find_section_end_with_config(
    lines: &[String],
    bounds: &SectionBounds,
    config: &ParsingConfig,
) -> Option<usize> {
    if lines.is_empty() || bounds.start_line >= lines.len() {
        return None;
    }
    let markers: Vec<MarkerPattern> = match (&bounds.marker, &bounds.marker_pattern) {
        (Some(_), Some(pattern)) => vec![pattern.clone()],
        _ => MARKER_PATTERNS.clone(),
    };
    let post_titles = config.post_section_patterns.active(&POST_SECTION_PATTERNS);

    let mut current = 0;
    let mut x = bounds.start_line;
    while x < lines.len() {
        let line = lines[x].trim();
        if let Some(n) = match_any_marker(line, &markers).and_then(|(_, m)| m.marknum) {
            current = n;
        }

        let post_section = post_titles.iter().any(|re| re.is_match(line))
            || POST_SECTION_KEYWORDS.iter().any(|re| re.is_match(line));
        if post_section
            && !next_marker_follows(lines, x, current, &markers, config.end_marker_lookahead)
        {
            debug!(line = x, text = line, "reference section ends at post-section title");
            break;
        }
        if digit_block_starts(lines, x) {
            debug!(line = x, "reference section ends at digit block");
            break;
        }
        x += 1;
    }
    x.checked_sub(1)
}

/// Locate the whole reference section: start, end and marker style.
pub fn locate_reference_section(lines: &[String]) -> Option<SectionBounds> {
    locate_reference_section_with_config(lines, &ParsingConfig::default())
}

/// Config-aware version of [`locate_reference_section`].
pub(crate) fn locate_reference_section_with_config(
    lines: &[String],
    config: &ParsingConfig,
) -> Option<SectionBounds> {
    let mut bounds = find_section_start_with_config(lines, config)?;
    bounds.end_line = find_section_end_with_config(lines, &bounds, config);
    Some(bounds)
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*e-?mail").unwrap());
static PAGE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,3}\s*$").unwrap());

/// Take the reference lines out of the document.
///
/// The title is cut from the first line when the first marker shares it;
/// otherwise the title line is skipped. Running title footers, bare page
/// numbers and leading blank or e-mail lines are dropped.
pub fn section_lines(lines: &[String], bounds: &SectionBounds) -> Vec<String> {
    let Some(end) = bounds.end_line else {
        return Vec::new();
    };
    let end = end.min(lines.len().saturating_sub(1));
    let mut start = bounds.start_line;
    let mut first_line: Option<String> = None;

    match &bounds.title {
        Some(title) if bounds.title_marker_same_line => {
            let line = &lines[start];
            if let Some(pos) = line.find(title.as_str()) {
                first_line = Some(line[pos + title.len()..].to_string());
            }
        }
        Some(_) => start += 1,
        None => {}
    }
    if lines.is_empty() || start > end {
        return Vec::new();
    }

    let mut section: Vec<String> = lines[start..=end].to_vec();
    if let Some(first) = first_line {
        section[0] = first;
    }

    if let Some(title) = &bounds.title {
        if let Ok(footer) = Regex::new(&format!(
            r"^\(?\[?\d{{0,4}}\]?\)?\.?\s*{}\s*$",
            regex::escape(title)
        )) {
            section.retain(|l| !footer.is_match(l));
        }
    }
    let numbered_markers = bounds
        .marker
        .as_deref()
        .is_some_and(MarkerPattern::is_bare_number);
    if !numbered_markers {
        section.retain(|l| !PAGE_NUMBER_RE.is_match(l));
    }

    let garbage = section
        .iter()
        .take_while(|l| l.trim().is_empty() || EMAIL_RE.is_match(l))
        .count();
    section.drain(..garbage);
    section
}
