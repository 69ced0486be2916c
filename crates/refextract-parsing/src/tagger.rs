//! Citation tagging.
//!
//! Recognised spans of a reference line are replaced by typed tags that the
//! assembler reads back:
//!
//! ```text
//! <TITLE>Nucl. Phys.</TITLE> <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>
//! <REPORTNUMBER>hep-th/9901001</REPORTNUMBER> <AUTHSTND>J. Smith</AUTHSTND> <URL />
//! ```
//!
//! Knowledge-base lookups run on a working copy of the line: tags masked,
//! upper-cased, punctuation turned into spaces and space runs collapsed.
//! Offsets found there are mapped back through [`SpaceCorrections`].

use std::ops::Range;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

use crate::authors::tag_authors;
use crate::identifiers::{
    extract_dois, extract_urls, format_report_number, tag_arxiv_ids, FoundUrl,
};
use crate::kb::{
    KnowledgeBases, ReportNumberKnowledgeBase, TitleEntry, TitleKnowledgeBase,
    WORKING_PUNCTUATION,
};
use crate::numeration::standardize_numeration;
use crate::repair::wash_line;

/// Tags with content, in the form `<NAME>content</NAME>`.
pub(crate) const TAG_NAMES: &[&str] = &[
    "VOL",
    "YR",
    "PG",
    "SER",
    "TITLE",
    "TITLEIBID",
    "REPORTNUMBER",
    "AUTHSTND",
    "AUTHETAL",
    "AUTHINCL",
];

pub(crate) static TAG_SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    let mut alternatives: Vec<String> = TAG_NAMES
        .iter()
        .map(|name| format!("<{name}>[^<]*</{name}>"))
        .collect();
    alternatives.push(regex::escape(crate::identifiers::URL_PLACEHOLDER));
    alternatives.push(regex::escape(crate::identifiers::DOI_PLACEHOLDER));
    Regex::new(&alternatives.join("|")).unwrap()
});

static SERIES_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<SER>([^<]*)</SER>$").unwrap());

/// Byte spans of every tag in a line.
pub(crate) fn tag_spans(text: &str) -> Vec<Range<usize>> {
    TAG_SPAN_RE.find_iter(text).map(|m| m.range()).collect()
}

/// `Regex::replace_all`, leaving matches that touch an existing tag as they are.
pub(crate) fn replace_outside_tags(
    text: &str,
    re: &Regex,
    mut replace: impl FnMut(&Captures<'_>) -> String,
) -> String {
    let spans = tag_spans(text);
    re.replace_all(text, |caps: &Captures<'_>| {
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        if spans.iter().any(|s| s.start < m.end() && m.start() < s.end) {
            return m.as_str().to_string();
        }
        replace(caps)
    })
    .into_owned()
}

/// Replace every tag with underscores of the same byte length. With
/// `keep_series`, series tags keep their letter and lose only the markup.
pub(crate) fn mask_tags(line: &str, keep_series: bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for m in TAG_SPAN_RE.find_iter(line) {
        out.push_str(&line[last..m.start()]);
        match SERIES_TAG_RE.captures(m.as_str()) {
            Some(caps) if keep_series => {
                out.push_str("     ");
                out.push_str(&caps[1]);
                out.push_str("      ");
            }
            _ => out.push_str(&"_".repeat(m.len())),
        }
        last = m.end();
    }
    out.push_str(&line[last..]);
    out
}

/// The line ran out of its tagging time budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("tagging exceeded its time budget")]
pub struct BudgetExceeded;

/// Wall-clock limit for tagging one line.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now().checked_add(budget),
        }
    }

    pub fn check(&self) -> Result<(), BudgetExceeded> {
        match self.end {
            Some(end) if Instant::now() >= end => Err(BudgetExceeded),
            _ => Ok(()),
        }
    }
}

/// Record of the space runs removed when collapsing a working copy.
///
/// Each entry is `(position in the collapsed text, spaces removed up to it)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceCorrections {
    entries: Vec<(usize, usize)>,
}

impl SpaceCorrections {
    /// Map a byte offset in the collapsed text back to the original text.
    pub fn to_original(&self, pos: usize) -> usize {
        let idx = self.entries.partition_point(|&(at, _)| at <= pos);
        match idx.checked_sub(1) {
            Some(i) => pos + self.entries[i].1,
            None => pos,
        }
    }
}

/// Collapse runs of spaces to one space, recording what was removed.
pub fn collapse_spaces(text: &str) -> (String, SpaceCorrections) {
    let mut out = String::with_capacity(text.len());
    let mut corrections = SpaceCorrections::default();
    let mut removed = 0;
    let mut pending = 0;
    let mut prev_space = false;

    for c in text.chars() {
        if c == ' ' {
            if prev_space {
                pending += 1;
                continue;
            }
            prev_space = true;
        } else {
            if pending > 0 {
                removed += pending;
                corrections.entries.push((out.len(), removed));
                pending = 0;
            }
            prev_space = false;
        }
        out.push(c);
    }
    (out, corrections)
}

/// Upper-case a character only when that keeps its UTF-8 width, so byte
/// offsets stay valid.
fn upper_same_width(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) if u.len_utf8() == c.len_utf8() => u,
        _ => c,
    }
}

/// Upper-cased, punctuation-free, tag-masked copy of a line.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    pub text: String,
    pub corrections: SpaceCorrections,
}

impl WorkingCopy {
    /// Build the working copy. Report numbers are matched with slashes
    /// turned into spaces as well.
    pub fn new(line: &str, slash_as_space: bool) -> Self {
        let masked = mask_tags(line, true);
        let spaced: String = masked
            .chars()
            .map(|c| {
                if WORKING_PUNCTUATION.contains(&c) || (slash_as_space && c == '/') {
                    ' '
                } else {
                    upper_same_width(c)
                }
            })
            .collect();
        let (text, corrections) = collapse_spaces(&spaced);
        Self { text, corrections }
    }

    /// Hide a matched range from later searches.
    pub fn mask(&mut self, range: Range<usize>) {
        let len = range.len();
        self.text.replace_range(range, &"_".repeat(len));
    }

    pub fn original_range(&self, range: &Range<usize>) -> Range<usize> {
        self.corrections.to_original(range.start)..self.corrections.to_original(range.end)
    }
}

/// A fully tagged reference line and the identifiers its placeholders stand for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedLine {
    pub text: String,
    /// URLs, one per `<URL />` placeholder in order.
    pub urls: Vec<FoundUrl>,
    /// DOIs, one per `<DOI />` placeholder in order.
    pub dois: Vec<String>,
}

fn apply_replacements(line: &str, mut replacements: Vec<(Range<usize>, String)>) -> String {
    replacements.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for (range, text) in replacements {
        if range.start < last {
            continue;
        }
        out.push_str(&line[last..range.start]);
        out.push_str(&text);
        last = range.end;
    }
    out.push_str(&line[last..]);
    out
}

/// Tag institutional report numbers from the knowledge base.
pub fn tag_report_numbers(
    line: &str,
    kb: &ReportNumberKnowledgeBase,
    deadline: &Deadline,
) -> Result<String, BudgetExceeded> {
    let mut working = WorkingCopy::new(line, true);
    let mut replacements = Vec::new();

    for entry in kb.entries() {
        deadline.check()?;
        let found: Vec<_> = entry.find_in(&working.text).collect();
        for (whole, numeration) in found {
            let numeration = working.original_range(&numeration);
            let value = format_report_number(&entry.standard, &line[numeration]);
            debug!(category = %entry.category, report_number = %value, "found report number");
            replacements.push((
                working.original_range(&whole),
                format!("<REPORTNUMBER>{value}</REPORTNUMBER>"),
            ));
            working.mask(whole);
        }
    }
    Ok(apply_replacements(line, replacements))
}

/// A periodical title or an `ibid` found in a line.
enum TitleHit<'a> {
    Title {
        span: Range<usize>,
        entry: &'a TitleEntry,
    },
    Ibid {
        span: Range<usize>,
        series: Option<String>,
        /// A `<SER>` tag follows and carries the series itself.
        series_tagged: bool,
    },
}

impl TitleHit<'_> {
    fn start(&self) -> usize {
        match self {
            TitleHit::Title { span, .. } | TitleHit::Ibid { span, .. } => span.start,
        }
    }
}

/// Series letter of a `<SER>` tag directly after `pos`.
fn series_tag_after(line: &str, pos: usize) -> Option<String> {
    static FOLLOWING_SERIES_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[.,]?\s*<SER>([^<]+)</SER>").unwrap());
    FOLLOWING_SERIES_RE
        .captures(&line[pos..])
        .map(|caps| caps[1].to_string())
}

/// Grow a range that starts or ends inside a series tag to cover the tag,
/// and take in the abbreviation period right after a title.
fn extend_title_span(line: &str, mut span: Range<usize>, tags: &[Range<usize>]) -> Range<usize> {
    for tag in tags.iter().filter(|t| line[(*t).clone()].starts_with("<SER>")) {
        if tag.start < span.start && span.start < tag.end {
            span.start = tag.start;
        }
        if tag.start < span.end && span.end < tag.end {
            span.end = tag.end;
        }
    }
    if line[span.end..].starts_with('.') {
        span.end += 1;
    }
    span
}

fn find_ibids<'a>(line: &str, tags: &[Range<usize>]) -> Vec<TitleHit<'a>> {
    static IBID_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?P<ibid>\b(?i:ibid(?:em)?)\b\.?(?:\s+(?P<series>[A-H])\s*:|\s*:)?)(?:\s*<SER>(?P<tagged>[A-H])</SER>)?",
        )
        .unwrap()
    });

    IBID_RE
        .captures_iter(line)
        .filter_map(|caps| {
            let span = caps.name("ibid")?.range();
            if tags.iter().any(|t| t.start < span.end && span.start < t.end) {
                return None;
            }
            let tagged = caps.name("tagged");
            Some(TitleHit::Ibid {
                span,
                series: tagged
                    .or_else(|| caps.name("series"))
                    .map(|m| m.as_str().to_string()),
                series_tagged: tagged.is_some(),
            })
        })
        .collect()
}

/// Tag periodical titles and resolve `ibid` back-references to the nearest
/// previous title of the line.
pub fn tag_titles(
    line: &str,
    kb: &TitleKnowledgeBase,
    deadline: &Deadline,
) -> Result<String, BudgetExceeded> {
    let tags = tag_spans(line);
    let mut working = WorkingCopy::new(line, false);
    let mut hits: Vec<TitleHit> = Vec::new();

    for entry in kb.entries() {
        deadline.check()?;
        let found: Vec<Range<usize>> = entry.find_in(&working.text).map(|(s, e)| s..e).collect();
        for range in found {
            let span = extend_title_span(line, working.original_range(&range), &tags);
            hits.push(TitleHit::Title { span, entry });
            working.mask(range);
        }
    }
    hits.extend(find_ibids(line, &tags));
    hits.sort_by_key(TitleHit::start);

    let mut replacements = Vec::new();
    let mut last_title: Option<(String, Option<String>)> = None;
    let mut occupied_until = 0;

    for hit in hits {
        match hit {
            TitleHit::Title { span, entry } => {
                let series = series_tag_after(line, span.end).or_else(|| entry.series.clone());
                last_title = Some((entry.title.clone(), series));
                occupied_until = span.end;
                replacements.push((span, format!("<TITLE>{}</TITLE>", entry.full_title())));
            }
            TitleHit::Ibid {
                span,
                series,
                series_tagged,
            } => {
                if span.start < occupied_until {
                    continue;
                }
                let Some((title, remembered)) = last_title.as_mut() else {
                    debug!("ibid without a previous title left unresolved");
                    continue;
                };
                if series.is_some() {
                    *remembered = series;
                }
                let resolved = match (remembered.as_deref(), series_tagged) {
                    (Some(s), false) => format!("{title} {s}"),
                    _ => title.clone(),
                };
                replacements.push((span, format!("<TITLEIBID>{resolved}</TITLEIBID>")));
            }
        }
    }
    Ok(apply_replacements(line, replacements))
}

/// Tag a rebuilt reference line.
///
/// Stages run in order, each masking what it consumed: DOIs and URLs,
/// numeration, arXiv identifiers, KB report numbers, titles with `ibid`
/// resolution, and author groups. Tagging an already tagged line returns
/// it unchanged.
pub fn tag_line(
    line: &str,
    kbs: &KnowledgeBases,
    budget: Duration,
) -> Result<TaggedLine, BudgetExceeded> {
    let deadline = Deadline::after(budget);

    let washed = wash_line(line);
    let (text, dois) = extract_dois(&washed);
    let (text, urls) = extract_urls(&text);
    let text = standardize_numeration(&text);
    deadline.check()?;

    let text = tag_arxiv_ids(&text);
    let text = tag_report_numbers(&text, &kbs.report_numbers, &deadline)?;
    let text = tag_titles(&text, &kbs.titles, &deadline)?;
    let text = tag_authors(&text);
    deadline.check()?;

    debug!(
        urls = urls.len(),
        dois = dois.len(),
        tagged = %text,
        "tagged reference line"
    );
    Ok(TaggedLine { text, urls, dois })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kbs() -> KnowledgeBases {
        KnowledgeBases::bundled().unwrap()
    }

    fn tag(line: &str) -> String {
        tag_line(line, &kbs(), Duration::from_secs(5)).unwrap().text
    }

    #[test]
    fn test_collapse_spaces_corrections() {
        let (collapsed, corrections) = collapse_spaces("A  B   C");
        assert_eq!(collapsed, "A B C");
        assert_eq!(corrections.to_original(0), 0);
        assert_eq!(corrections.to_original(2), 3);
        assert_eq!(corrections.to_original(4), 7);
    }

    #[test]
    fn test_working_copy() {
        let working = WorkingCopy::new("Phys. Rev. <VOL>12</VOL> hep-th/99", true);
        assert_eq!(working.text, "PHYS REV _____________ HEP TH 99");
        let range = working.text.find("REV").unwrap();
        assert_eq!(working.original_range(&(range..range + 3)), 6..9);
    }

    #[test]
    fn test_working_copy_keeps_series_letter() {
        let working = WorkingCopy::new("Phys. Rev. <SER>D</SER> x", false);
        assert_eq!(working.text, "PHYS REV D x");
    }

    #[test]
    fn test_mask_tags_keeps_length() {
        let line = "é <AUTHSTND>J. Smith</AUTHSTND> <URL />";
        assert_eq!(mask_tags(line, false).len(), line.len());
    }

    #[test]
    fn test_title_standardization() {
        assert_eq!(
            tag("Astronomy and Astrophysics 12 (1999) 34"),
            "<TITLE>Astron. Astrophys.</TITLE> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>"
        );
    }

    #[test]
    fn test_title_with_series_in_kb() {
        assert_eq!(
            tag("Z. Phys. C 12 (1999) 34"),
            "<TITLE>Z. Phys. C</TITLE> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>"
        );
    }

    #[test]
    fn test_ibid_inherits_series() {
        assert_eq!(
            tag("Nucl. Phys. B 34 (1987) 1; ibid 36 (1988) 2"),
            "<TITLE>Nucl. Phys.</TITLE> <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>; \
             <TITLEIBID>Nucl. Phys. B</TITLEIBID> <VOL>36</VOL> <YR>(1988)</YR> <PG>2</PG>"
        );
    }

    #[test]
    fn test_ibid_own_series_overrides() {
        let tagged = tag("Phys. Lett. B 12 (1999) 34; ibid. D 5 (2000) 6; ibid. 7 (2001) 8");
        assert!(tagged.contains("<TITLEIBID>Phys. Lett.</TITLEIBID> <SER>D</SER> <VOL>5</VOL>"));
        assert!(tagged.contains("<TITLEIBID>Phys. Lett. D</TITLEIBID> <VOL>7</VOL>"));
    }

    #[test]
    fn test_unresolved_ibid_untouched() {
        let tagged = tag("ibid. 36 (1988) 2");
        assert_eq!(tagged, "ibid. <VOL>36</VOL> <YR>(1988)</YR> <PG>2</PG>");
    }

    #[test]
    fn test_report_numbers() {
        assert_eq!(
            tag("CERN-TH-2001-123 and hep-th/9901001"),
            "<REPORTNUMBER>CERN-TH-2001-123</REPORTNUMBER> and <REPORTNUMBER>hep-th/9901001</REPORTNUMBER>"
        );
    }

    #[test]
    fn test_urls_and_dois() {
        let tagged = tag_line(
            "J. Smith, see http://x.org/a.pdf, doi:10.1000/abc.",
            &kbs(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(tagged.text, "<AUTHSTND>J. Smith</AUTHSTND>, see <URL />, <DOI />.");
        assert_eq!(tagged.urls[0].url, "http://x.org/a.pdf");
        assert_eq!(tagged.dois, vec!["10.1000/abc"]);
    }

    #[test]
    fn test_retagging_is_noop() {
        let kbs = kbs();
        let lines = [
            "J. Smith and A. Jones, Nucl. Phys. B 34 (1987) 1; ibid 36 (1988) 2",
            "A. Smith et al., Phys. Rev. Lett. 12, 34 (1999), hep-th/9901001",
            "B. Editor (eds.), Proceedings, CERN-EP-2001-123, http://cern.ch/x",
        ];
        for line in lines {
            let once = tag_line(line, &kbs, Duration::from_secs(5)).unwrap().text;
            let twice = tag_line(&once, &kbs, Duration::from_secs(5)).unwrap().text;
            assert_eq!(twice, once, "retagging changed {line:?}");
        }
    }

    #[test]
    fn test_budget_exceeded() {
        let result = tag_line("J. Smith, Nature 410 (2001) 37", &kbs(), Duration::ZERO);
        assert_eq!(result, Err(BudgetExceeded));
    }
}
