//! Citation assembly: tagged line → ordered elements → citation records.
//!
//! A tagged line may cite several works. Elements are read back from the
//! tags left to right, then split into records by a small state machine
//! driven by semicolons and by repeated titles, report numbers, DOIs and
//! author groups.

use once_cell::sync::Lazy;
use regex::Regex;
use refextract_core::{
    AuthorKind, CitationElement, CitationRecord, ElementCounts, IbidNumeration, TitleCitation,
};
use tracing::debug;

use crate::config::ParsingConfig;
use crate::identifiers::{DOI_PLACEHOLDER, URL_PLACEHOLDER};
use crate::numeration::normalize_volume;
use crate::tagger::{TaggedLine, TAG_NAMES, TAG_SPAN_RE};

/// Canonical numeration directly after a title tag.
static NUMERATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[.,]?\s*(?:<SER>(?P<series>[^<]*)</SER>\s*)?<VOL>(?P<vol>[^<]*)</VOL>\s*<YR>\((?P<year>[^<)]*)\)</YR>\s*<PG>(?P<page>[^<]*)</PG>",
    )
    .unwrap()
});

/// Further numeration citing the same title: `...; 36 (1988) 2`.
static EXTRA_NUMERATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\s*[;,]\s*|\s+and\s+)(?:<SER>(?P<series>[^<]*)</SER>\s*)?<VOL>(?P<vol>[^<]*)</VOL>\s*<YR>\((?P<year>[^<)]*)\)</YR>\s*<PG>(?P<page>[^<]*)</PG>",
    )
    .unwrap()
});

/// Series letter or roman numeral closing a standardized title.
static TITLE_SERIES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+([A-H]|I{1,3}V?|VI{0,3})$").unwrap());

/// Tag markup left without its partner.
static STRAY_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    let names = TAG_NAMES.join("|");
    Regex::new(&format!(r"</?(?:{names})>")).unwrap()
});

/// A semicolon closing an HTML entity such as `&amp;`.
static ENTITY_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:[A-Za-z]+|#\d+|#[xX][0-9A-Fa-f]+)$").unwrap());

/// An element read back from a tagged line, with the untagged text that
/// preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedElement {
    pub misc_before: String,
    pub element: CitationElement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub elements: Vec<ParsedElement>,
    /// Untagged text after the last element.
    pub trailing_misc: String,
}

fn split_tag(tag: &str) -> Option<(&str, &str)> {
    let inner = tag.strip_prefix('<')?;
    let (name, rest) = inner.split_once('>')?;
    let content = rest.strip_suffix(format!("</{name}>").as_str())?;
    Some((name, content))
}

/// Split a standardized title into title and series.
fn split_title_series(title: &str) -> (String, Option<String>) {
    match TITLE_SERIES_RE.captures(title) {
        Some(caps) => (caps[1].to_string(), Some(caps[2].to_string())),
        None => (title.to_string(), None),
    }
}

fn non_empty(s: Option<regex::Match<'_>>) -> Option<String> {
    s.map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read a title tag and the numeration following it. Returns the citation
/// and the number of bytes of `rest` it consumed, or `None` for a title
/// without numeration.
fn read_title(content: &str, is_ibid: bool, rest: &str) -> Option<(TitleCitation, usize)> {
    let caps = NUMERATION_RE.captures(rest)?;
    let (title, kb_series) = split_title_series(content.trim());
    let mut citation = TitleCitation {
        title,
        series: non_empty(caps.name("series")).or(kb_series),
        volume: normalize_volume(caps["vol"].trim()),
        year: caps["year"].trim().to_string(),
        page: caps["page"].trim().to_string(),
        is_ibid,
        extra_ibids: Vec::new(),
    };
    let mut consumed = caps.get(0).map_or(0, |m| m.end());

    while let Some(extra) = EXTRA_NUMERATION_RE.captures(&rest[consumed..]) {
        citation.extra_ibids.push(IbidNumeration {
            series: non_empty(extra.name("series")),
            volume: normalize_volume(extra["vol"].trim()),
            year: extra["year"].trim().to_string(),
            page: extra["page"].trim().to_string(),
        });
        consumed += extra.get(0).map_or(0, |m| m.end());
    }
    Some((citation, consumed))
}

/// Read the elements of a tagged line back in order.
///
/// Titles without numeration and orphan numeration tags become misc text;
/// markup of unclosed tags is dropped. An author group or DOI repeated
/// within the line is kept only once.
pub fn parse_tagged_line(line: &TaggedLine) -> ParsedLine {
    let text = line.text.as_str();
    let mut urls = line.urls.iter();
    let mut dois = line.dois.iter();

    let mut parsed = ParsedLine::default();
    let mut misc = String::new();
    let mut seen_authors: Vec<String> = Vec::new();
    let mut seen_dois: Vec<String> = Vec::new();
    let mut pos = 0;

    let tags: Vec<_> = TAG_SPAN_RE.find_iter(text).collect();
    for tag in tags {
        if tag.start() < pos {
            continue;
        }
        misc.push_str(&text[pos..tag.start()]);
        pos = tag.end();

        let element = match tag.as_str() {
            URL_PLACEHOLDER => urls.next().map(|u| CitationElement::Url {
                url: u.url.clone(),
                description: u.description.clone(),
            }),
            DOI_PLACEHOLDER => match dois.next() {
                Some(doi) if seen_dois.contains(doi) => None,
                Some(doi) => {
                    seen_dois.push(doi.clone());
                    Some(CitationElement::Doi { value: doi.clone() })
                }
                None => None,
            },
            tagged => {
                let Some((name, content)) = split_tag(tagged) else {
                    continue;
                };
                match name {
                    "TITLE" | "TITLEIBID" => {
                        match read_title(content, name == "TITLEIBID", &text[pos..]) {
                            Some((citation, consumed)) => {
                                pos += consumed;
                                Some(CitationElement::Title(citation))
                            }
                            None => {
                                debug!(title = content, "title without numeration kept as misc");
                                misc.push_str(content);
                                None
                            }
                        }
                    }
                    "REPORTNUMBER" => Some(CitationElement::ReportNumber {
                        value: content.to_string(),
                    }),
                    "AUTHSTND" | "AUTHETAL" | "AUTHINCL" => {
                        let text = content.trim().to_string();
                        if seen_authors.contains(&text) {
                            None
                        } else {
                            seen_authors.push(text.clone());
                            Some(match name {
                                "AUTHSTND" => CitationElement::Author {
                                    text,
                                    kind: AuthorKind::Standard,
                                },
                                "AUTHETAL" => CitationElement::Author {
                                    text,
                                    kind: AuthorKind::EtAl,
                                },
                                _ => CitationElement::Author {
                                    text: format!("{text} (eds.)"),
                                    kind: AuthorKind::EditorIncluded,
                                },
                            })
                        }
                    }
                    // orphan numeration
                    _ => {
                        misc.push_str(content);
                        None
                    }
                }
            }
        };

        if let Some(element) = element {
            parsed.elements.push(ParsedElement {
                misc_before: STRAY_TAG_RE.replace_all(&misc, "").into_owned(),
                element,
            });
            misc.clear();
        }
    }
    misc.push_str(&text[pos..]);
    parsed.trailing_misc = STRAY_TAG_RE.replace_all(&misc, "").into_owned();
    parsed
}

/// True when nothing but spaces and separators is left.
fn reducible_to_nothing(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || ".,;:-()[]".contains(c))
}

fn clean_misc(text: &str) -> &str {
    text.trim()
        .trim_matches([',', ';', ':'])
        .trim()
}

/// Position of the last semicolon that separates citations. Semicolons
/// closing an HTML entity never do.
fn splitting_semicolon(misc: &str) -> Option<usize> {
    misc.match_indices(';')
        .rev()
        .map(|(i, _)| i)
        .find(|&i| !ENTITY_END_RE.is_match(&misc[..i]))
}

fn misc_len(record: &CitationRecord) -> usize {
    record
        .elements
        .iter()
        .map(|e| match e {
            CitationElement::Misc { text } => text.len(),
            _ => 0,
        })
        .sum()
}

/// Splitting state: the record being built and the author remembered for
/// `ibid` records.
struct Splitter<'a> {
    config: &'a ParsingConfig,
    marker: &'a str,
    current: CitationRecord,
    records: Vec<CitationRecord>,
    ibid_authors: Vec<CitationElement>,
    counts: ElementCounts,
}

impl<'a> Splitter<'a> {
    fn new(marker: &'a str, config: &'a ParsingConfig) -> Self {
        Self {
            config,
            marker,
            current: CitationRecord::new(marker),
            records: Vec::new(),
            ibid_authors: Vec::new(),
            counts: ElementCounts::default(),
        }
    }

    fn push(&mut self, element: CitationElement) {
        self.counts.record(&element);
        self.current.elements.push(element);
    }

    fn push_misc(&mut self, text: &str) {
        if reducible_to_nothing(text) {
            return;
        }
        let text = clean_misc(text);
        if let Some(CitationElement::Misc { text: last }) = self.current.elements.last_mut() {
            last.push(' ');
            last.push_str(text);
            return;
        }
        self.push(CitationElement::Misc {
            text: text.to_string(),
        });
    }

    /// Close the current record, applying the ibid-author rule.
    fn split(&mut self) {
        let mut record = std::mem::replace(&mut self.current, CitationRecord::new(self.marker));
        if record.is_empty() {
            return;
        }
        let authors: Vec<CitationElement> = record
            .elements
            .iter()
            .filter(|e| e.is_author())
            .cloned()
            .collect();
        match record.title().map(|t| t.is_ibid) {
            Some(true) if authors.is_empty() && !self.ibid_authors.is_empty() => {
                debug!("ibid record takes the remembered author");
                let mut elements = self.ibid_authors.clone();
                elements.append(&mut record.elements);
                record.elements = elements;
            }
            Some(false) => self.ibid_authors = authors,
            _ => {}
        }
        self.records.push(record);
    }

    fn should_split(&self, element: &CitationElement, misc: &str) -> bool {
        let record = &self.current;
        let intervening = !reducible_to_nothing(misc);
        match element {
            CitationElement::Title(_) => {
                record.has_title() || (record.has_report_number() && intervening)
            }
            CitationElement::ReportNumber { .. } => {
                record.has_report_number() || (record.has_title() && intervening)
            }
            CitationElement::Doi { .. } => record.has_doi(),
            CitationElement::Author { kind, .. } => {
                if *kind == AuthorKind::EditorIncluded {
                    return false;
                }
                // a lone title with nothing between it and the author
                let lone_title = record.elements.len() == 1 && record.has_title() && !intervening;
                record.has_author() || lone_title
            }
            CitationElement::Url { .. } | CitationElement::Misc { .. } => false,
        }
    }

    /// Author group close behind another one: part of the same list that
    /// the tagger broke in two.
    fn adjoins_previous_author(&self, element: &CitationElement, misc: &str) -> bool {
        matches!(element, CitationElement::Author { kind, .. } if *kind != AuthorKind::EditorIncluded)
            && self.current.elements.last().is_some_and(CitationElement::is_author)
            && misc.len() < self.config.adjacent_author_gap
    }

    fn add(&mut self, parsed: ParsedElement) {
        let ParsedElement {
            mut misc_before,
            element,
        } = parsed;

        if let Some(at) = splitting_semicolon(&misc_before) {
            let before = &misc_before[..at];
            let accumulated = misc_len(&self.current) + clean_misc(before).len();
            if self.current.has_title()
                || self.current.has_report_number()
                || accumulated >= self.config.semicolon_misc_sensitivity
            {
                debug!(marker = self.marker, "semicolon splits citation");
                self.push_misc(before);
                self.split();
                misc_before = misc_before[at + 1..].to_string();
            }
        }

        if self.adjoins_previous_author(&element, &misc_before) {
            if let CitationElement::Author { text, .. } = &element {
                self.push_misc(&misc_before);
                self.push_misc(text);
            }
            return;
        }

        let split = self.should_split(&element, &misc_before);
        self.push_misc(&misc_before);
        if split {
            self.split();
        }

        match element {
            CitationElement::Title(mut title) => {
                let extra = title.take_extra_ibids();
                self.push(CitationElement::Title(title));
                for ibid in extra {
                    self.split();
                    self.push(CitationElement::Title(ibid));
                }
            }
            element => self.push(element),
        }
    }

    fn finish(mut self, trailing_misc: &str) -> (Vec<CitationRecord>, ElementCounts) {
        self.push_misc(trailing_misc);
        self.split();
        (self.records, self.counts)
    }
}

/// Split the elements of one line into citation records.
pub fn split_citations(
    marker: &str,
    parsed: ParsedLine,
    config: &ParsingConfig,
) -> (Vec<CitationRecord>, ElementCounts) {
    let mut splitter = Splitter::new(marker, config);
    for element in parsed.elements {
        splitter.add(element);
    }
    splitter.finish(&parsed.trailing_misc)
}

/// Drop records made of a single misc fragment that is too short or too
/// long to be a citation, keeping the misc counter in step.
pub fn filter_records(
    records: Vec<CitationRecord>,
    config: &ParsingConfig,
    counts: &mut ElementCounts,
) -> Vec<CitationRecord> {
    records
        .into_iter()
        .filter(|record| match record.elements.as_slice() {
            [CitationElement::Misc { text }] => {
                let len = text.chars().count();
                let keep = len >= config.min_misc_len && len <= config.max_misc_len;
                if !keep {
                    counts.misc = counts.misc.saturating_sub(1);
                }
                keep
            }
            _ => true,
        })
        .collect()
}

/// Turn one tagged reference line into filtered citation records.
pub fn assemble_line(
    marker: &str,
    line: &TaggedLine,
    config: &ParsingConfig,
) -> (Vec<CitationRecord>, ElementCounts) {
    let parsed = parse_tagged_line(line);
    let (records, mut counts) = split_citations(marker, parsed, config);
    let records = filter_records(records, config, &mut counts);
    (records, counts)
}

/// A line kept whole as a single misc record.
pub fn misc_record(
    marker: &str,
    text: &str,
    config: &ParsingConfig,
) -> (Vec<CitationRecord>, ElementCounts) {
    let mut splitter = Splitter::new(marker, config);
    splitter.push_misc(text);
    let (records, mut counts) = splitter.finish("");
    let records = filter_records(records, config, &mut counts);
    (records, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::FoundUrl;
    use refextract_core::{RecordField, TitleFormat};

    fn tagged(text: &str) -> TaggedLine {
        TaggedLine {
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn assemble(text: &str) -> Vec<CitationRecord> {
        assemble_line("[1]", &tagged(text), &ParsingConfig::default()).0
    }

    #[test]
    fn test_parse_title_with_numeration() {
        let parsed = parse_tagged_line(&tagged(
            "<TITLE>Nucl. Phys.</TITLE> <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>",
        ));
        assert_eq!(parsed.elements.len(), 1);
        let CitationElement::Title(title) = &parsed.elements[0].element else {
            panic!("expected a title");
        };
        assert_eq!(title.full_title(), "Nucl. Phys. B");
        assert_eq!(title.volume, "34");
        assert_eq!(title.year, "1987");
        assert_eq!(title.page, "1");
        assert!(parsed.trailing_misc.is_empty());
    }

    #[test]
    fn test_series_tag_beats_title_series() {
        let parsed = parse_tagged_line(&tagged(
            "<TITLE>Phys. Rev. D</TITLE> <SER>C</SER> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>",
        ));
        let CitationElement::Title(title) = &parsed.elements[0].element else {
            panic!("expected a title");
        };
        assert_eq!(title.title, "Phys. Rev.");
        assert_eq!(title.series.as_deref(), Some("C"));
    }

    #[test]
    fn test_title_keeps_abbreviation_period() {
        let parsed = parse_tagged_line(&tagged(
            "<TITLE>Eur. Phys. J.</TITLE> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>",
        ));
        let CitationElement::Title(title) = &parsed.elements[0].element else {
            panic!("expected a title");
        };
        assert_eq!(title.title, "Eur. Phys. J.");
        assert_eq!(title.series, None);
    }

    #[test]
    fn test_title_without_numeration_is_misc() {
        let parsed = parse_tagged_line(&tagged("see <TITLE>Nature</TITLE> for details"));
        assert!(parsed.elements.is_empty());
        assert_eq!(parsed.trailing_misc, "see Nature for details");
    }

    #[test]
    fn test_orphan_numeration_and_unclosed_tags_are_misc() {
        let parsed = parse_tagged_line(&tagged("vol <VOL>12</VOL> and <TITLE>broken"));
        assert!(parsed.elements.is_empty());
        assert_eq!(parsed.trailing_misc, "vol 12 and broken");
    }

    #[test]
    fn test_volume_normalized() {
        let parsed = parse_tagged_line(&tagged(
            "<TITLE>Nature</TITLE> <VOL>XIV</VOL> <YR>(1999)</YR> <PG>3</PG>",
        ));
        let CitationElement::Title(title) = &parsed.elements[0].element else {
            panic!("expected a title");
        };
        assert_eq!(title.volume, "14");
    }

    #[test]
    fn test_placeholders_pop_in_order() {
        let line = TaggedLine {
            text: "<URL /> and <DOI /> and <DOI />".to_string(),
            urls: vec![FoundUrl {
                url: "http://x.org".into(),
                description: "x".into(),
            }],
            dois: vec!["10.1/a".into(), "10.1/a".into()],
        };
        let parsed = parse_tagged_line(&line);
        // the repeated DOI is dropped
        assert_eq!(parsed.elements.len(), 2);
        assert!(matches!(&parsed.elements[0].element, CitationElement::Url { url, .. } if url == "http://x.org"));
        assert!(matches!(&parsed.elements[1].element, CitationElement::Doi { value } if value == "10.1/a"));
    }

    #[test]
    fn test_editors_parenthesized() {
        let parsed = parse_tagged_line(&tagged("<AUTHINCL>A. Editor</AUTHINCL>"));
        assert_eq!(
            parsed.elements[0].element,
            CitationElement::Author {
                text: "A. Editor (eds.)".into(),
                kind: AuthorKind::EditorIncluded,
            }
        );
    }

    #[test]
    fn test_semicolon_splits_citations() {
        let records = assemble(
            "<AUTHSTND>J. Smith</AUTHSTND>, <TITLE>Phys. Rev. D</TITLE> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>; \
             <AUTHSTND>A. Jones</AUTHSTND>, <TITLE>Nature</TITLE> <VOL>410</VOL> <YR>(2001)</YR> <PG>37</PG>",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].fields(TitleFormat::Standard),
            vec![
                RecordField::Marker("[1]".into()),
                RecordField::Author("A. Jones".into()),
                RecordField::Title("Nature 410 (2001) 37".into()),
            ]
        );
    }

    #[test]
    fn test_html_entity_semicolon_never_splits() {
        let title = "<TITLE>Nature</TITLE> <VOL>1</VOL> <YR>(2000)</YR> <PG>2</PG>";
        let records = assemble(&format!("{title}, Tom &amp; Jerry, <DOI />"));
        assert_eq!(records.len(), 1);
        let records = assemble(&format!("{title}, Tom; Jerry, <DOI />"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_semicolon_needs_enough_misc_without_title() {
        let records = assemble("short; text <URL />");
        assert_eq!(records.len(), 1);
        let long = "x".repeat(70);
        let records = assemble(&format!("{long}; more text <REPORTNUMBER>CERN-TH-1</REPORTNUMBER>"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_ibid_takes_remembered_author() {
        let records = assemble(
            "<AUTHSTND>J. Smith</AUTHSTND>, <TITLE>Nucl. Phys.</TITLE> <SER>B</SER> <VOL>34</VOL> <YR>(1987)</YR> <PG>1</PG>; \
             <TITLEIBID>Nucl. Phys. B</TITLEIBID> <VOL>36</VOL> <YR>(1988)</YR> <PG>2</PG>",
        );
        assert_eq!(records.len(), 2);
        let ibid = records[1].title().unwrap();
        assert!(ibid.is_ibid);
        assert_eq!(ibid.render(TitleFormat::Standard), "Nucl. Phys. B 36 (1988) 2");
        assert!(records[1].has_author());
    }

    #[test]
    fn test_extra_numerations_become_records() {
        let (records, counts) = assemble_line(
            "",
            &tagged(
                "<TITLE>Phys. Rev.</TITLE> <SER>D</SER> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>; \
                 <VOL>36</VOL> <YR>(2000)</YR> <PG>2</PG>",
            ),
            &ParsingConfig::default(),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].title().unwrap().render(TitleFormat::Inspire),
            "Phys. Rev. D,36,2"
        );
        assert_eq!(counts.title, 2);
    }

    #[test]
    fn test_second_title_splits() {
        let records = assemble(
            "<TITLE>Nature</TITLE> <VOL>1</VOL> <YR>(2000)</YR> <PG>2</PG>, \
             <TITLE>Science</TITLE> <VOL>3</VOL> <YR>(2001)</YR> <PG>4</PG>",
        );
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_close_authors_merge_into_misc() {
        let records = assemble("<AUTHSTND>J. Smith</AUTHSTND> <AUTHSTND>A. Jones</AUTHSTND> text");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].fields(TitleFormat::Standard),
            vec![
                RecordField::Marker("[1]".into()),
                RecordField::Author("J. Smith".into()),
                RecordField::Misc("A. Jones text".into()),
            ]
        );
    }

    #[test]
    fn test_author_after_title_splits_but_editors_do_not() {
        let title = "<TITLE>Nature</TITLE> <VOL>1</VOL> <YR>(2000)</YR> <PG>2</PG>";
        assert_eq!(assemble(&format!("{title}, <AUTHSTND>A. Jones</AUTHSTND>")).len(), 2);
        assert_eq!(assemble(&format!("{title}, <AUTHINCL>A. Jones</AUTHINCL>")).len(), 1);
    }

    #[test]
    fn test_author_after_title_and_text_stays() {
        let title = "<TITLE>Nature</TITLE> <VOL>1</VOL> <YR>(2000)</YR> <PG>2</PG>";
        let records = assemble(&format!(
            "{title}, in: <AUTHSTND>A. Jones</AUTHSTND>, Proceedings of the Meeting"
        ));
        assert_eq!(records.len(), 1);
        assert!(records[0].has_title());
        assert!(records[0].has_author());

        // a title followed by another element no longer counts as lone
        let records = assemble(&format!(
            "{title} <REPORTNUMBER>CERN-TH-1</REPORTNUMBER>, <AUTHSTND>A. Jones</AUTHSTND>"
        ));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_short_and_long_misc_records_dropped() {
        let (records, counts) = misc_record("[2]", "abc", &ParsingConfig::default());
        assert!(records.is_empty());
        assert_eq!(counts.misc, 0);

        let (records, counts) = misc_record("[2]", "private communication", &ParsingConfig::default());
        assert_eq!(records.len(), 1);
        assert_eq!(counts.misc, 1);

        let (records, _) = misc_record("[2]", &"y".repeat(2000), &ParsingConfig::default());
        assert!(records.is_empty());
    }
}
