use serde::{Deserialize, Serialize};

pub mod backend;
pub mod config_file;

pub use backend::{BackendError, PlainTextBackend, TextBackend};

/// A logical reference line rebuilt from the reference section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLine {
    /// Leading marker as it appeared in the document (`[12]`, `3.`), or empty.
    pub marker: String,
    /// Citation text following the marker.
    pub text: String,
}

/// How an author group was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Standard,
    EtAl,
    /// An editor group; the text carries the `(eds.)` suffix.
    EditorIncluded,
}

/// Volume/year/page numeration of an additional citation of the same title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbidNumeration {
    pub series: Option<String>,
    pub volume: String,
    pub year: String,
    pub page: String,
}

/// A periodical title with its numeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleCitation {
    /// Standardized title, without the series letter.
    pub title: String,
    pub series: Option<String>,
    pub volume: String,
    pub year: String,
    pub page: String,
    /// True when this title was resolved from an `ibid` back-reference.
    pub is_ibid: bool,
    /// Further numerations citing the same title (`...; 36 (1988) 2`).
    pub extra_ibids: Vec<IbidNumeration>,
}

impl TitleCitation {
    /// Title including the series letter, e.g. `Nucl. Phys. B`.
    pub fn full_title(&self) -> String {
        join_series(&self.title, self.series.as_deref())
    }

    /// Split the extra numerations off into standalone ibid citations.
    pub fn take_extra_ibids(&mut self) -> Vec<TitleCitation> {
        std::mem::take(&mut self.extra_ibids)
            .into_iter()
            .map(|n| TitleCitation {
                title: self.title.clone(),
                series: n.series.or_else(|| self.series.clone()),
                volume: n.volume,
                year: n.year,
                page: n.page,
                is_ibid: true,
                extra_ibids: Vec::new(),
            })
            .collect()
    }

    /// Render the citation as a single string in the given format.
    pub fn render(&self, format: TitleFormat) -> String {
        match format {
            TitleFormat::Standard => format!(
                "{} {} ({}) {}",
                self.full_title(),
                self.volume,
                self.year,
                self.page
            ),
            TitleFormat::Inspire => {
                format!("{},{},{}", self.full_title(), self.volume, self.page)
            }
        }
    }
}

fn join_series(title: &str, series: Option<&str>) -> String {
    match series {
        Some(s) if !s.is_empty() && !title.ends_with(s) => format!("{} {}", title, s),
        _ => title.to_string(),
    }
}

/// Output format for periodical titles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleFormat {
    /// `Title Volume (Year) Page`
    #[default]
    Standard,
    /// `Title,Volume,Page`
    Inspire,
}

/// One recognised component of a citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CitationElement {
    Title(TitleCitation),
    ReportNumber { value: String },
    Url { url: String, description: String },
    Doi { value: String },
    Author { text: String, kind: AuthorKind },
    Misc { text: String },
}

impl CitationElement {
    pub fn is_title(&self) -> bool {
        matches!(self, CitationElement::Title(_))
    }

    pub fn is_report_number(&self) -> bool {
        matches!(self, CitationElement::ReportNumber { .. })
    }

    pub fn is_author(&self) -> bool {
        matches!(self, CitationElement::Author { .. })
    }

    pub fn is_doi(&self) -> bool {
        matches!(self, CitationElement::Doi { .. })
    }

    pub fn is_misc(&self) -> bool {
        matches!(self, CitationElement::Misc { .. })
    }
}

/// A single output field of a serialized citation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum RecordField {
    Marker(String),
    Title(String),
    ReportNumber(String),
    Url { url: String, description: String },
    Doi(String),
    Author(String),
    Misc(String),
}

/// The unit of output: one citation with the marker of the line it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub marker: String,
    pub elements: Vec<CitationElement>,
}

impl CitationRecord {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            elements: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn has_title(&self) -> bool {
        self.elements.iter().any(CitationElement::is_title)
    }

    pub fn has_report_number(&self) -> bool {
        self.elements.iter().any(CitationElement::is_report_number)
    }

    pub fn has_author(&self) -> bool {
        self.elements.iter().any(CitationElement::is_author)
    }

    pub fn has_doi(&self) -> bool {
        self.elements.iter().any(CitationElement::is_doi)
    }

    /// First title element of the record, if any.
    pub fn title(&self) -> Option<&TitleCitation> {
        self.elements.iter().find_map(|e| match e {
            CitationElement::Title(t) => Some(t),
            _ => None,
        })
    }

    /// Ordered output fields.
    ///
    /// The marker comes first. Misc fragments are merged into one field at
    /// the position of the first fragment; author groups likewise.
    pub fn fields(&self, format: TitleFormat) -> Vec<RecordField> {
        let mut fields = Vec::new();
        if !self.marker.is_empty() {
            fields.push(RecordField::Marker(self.marker.clone()));
        }

        let mut misc_at: Option<usize> = None;
        let mut author_at: Option<usize> = None;

        for element in &self.elements {
            match element {
                CitationElement::Title(t) => fields.push(RecordField::Title(t.render(format))),
                CitationElement::ReportNumber { value } => {
                    fields.push(RecordField::ReportNumber(value.clone()))
                }
                CitationElement::Url { url, description } => fields.push(RecordField::Url {
                    url: url.clone(),
                    description: description.clone(),
                }),
                CitationElement::Doi { value } => fields.push(RecordField::Doi(value.clone())),
                CitationElement::Author { text, .. } => match author_at {
                    Some(i) => append_to(&mut fields[i], text),
                    None => {
                        author_at = Some(fields.len());
                        fields.push(RecordField::Author(text.clone()));
                    }
                },
                CitationElement::Misc { text } => match misc_at {
                    Some(i) => append_to(&mut fields[i], text),
                    None => {
                        misc_at = Some(fields.len());
                        fields.push(RecordField::Misc(text.clone()));
                    }
                },
            }
        }
        fields
    }
}

fn append_to(field: &mut RecordField, text: &str) {
    if let RecordField::Author(s) | RecordField::Misc(s) = field {
        s.push(' ');
        s.push_str(text);
    }
}

/// Per-document counters of recognised elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub misc: usize,
    pub title: usize,
    pub report_number: usize,
    pub url: usize,
    pub doi: usize,
    pub author_group: usize,
}

impl ElementCounts {
    /// Add the counts of a single citation element.
    pub fn record(&mut self, element: &CitationElement) {
        match element {
            CitationElement::Title(t) => self.title += 1 + t.extra_ibids.len(),
            CitationElement::ReportNumber { .. } => self.report_number += 1,
            CitationElement::Url { .. } => self.url += 1,
            CitationElement::Doi { .. } => self.doi += 1,
            CitationElement::Author { .. } => self.author_group += 1,
            CitationElement::Misc { .. } => self.misc += 1,
        }
    }

    pub fn merge(&mut self, other: &ElementCounts) {
        self.misc += other.misc;
        self.title += other.title;
        self.report_number += other.report_number;
        self.url += other.url;
        self.doi += other.doi;
        self.author_group += other.author_group;
    }
}

/// Which strategy located the reference section. Lower is more reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HowFound {
    Title = 1,
    Brackets = 2,
    Dots = 3,
    Numbers = 4,
}

impl HowFound {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Outcome of extracting references from one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    /// The document had no text.
    EmptyDocument,
    /// No reference section could be located.
    NoReferenceSection,
    /// A start was found but the section is empty.
    NoSectionEnd,
    /// The section was found by a weak strategy and yielded no title or
    /// report number, so all records were discarded.
    LowConfidence,
}

impl ExtractionStatus {
    pub fn code(self) -> u8 {
        match self {
            ExtractionStatus::Success => 0,
            ExtractionStatus::EmptyDocument => 1,
            ExtractionStatus::NoReferenceSection => 2,
            ExtractionStatus::NoSectionEnd => 3,
            ExtractionStatus::LowConfidence => 4,
        }
    }
}

/// Structured references extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub document_id: String,
    pub status: ExtractionStatus,
    pub how_found: Option<HowFound>,
    pub records: Vec<CitationRecord>,
    pub counts: ElementCounts,
    /// Number of logical reference lines rebuilt from the section.
    pub reference_lines: usize,
    /// Lines emitted as plain misc because tagging ran out of time.
    pub degraded_lines: usize,
}

impl DocumentResult {
    /// An empty result carrying only a status.
    pub fn with_status(document_id: impl Into<String>, status: ExtractionStatus) -> Self {
        Self {
            document_id: document_id.into(),
            status,
            how_found: None,
            records: Vec::new(),
            counts: ElementCounts::default(),
            reference_lines: 0,
            degraded_lines: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nucl_phys() -> TitleCitation {
        TitleCitation {
            title: "Nucl. Phys.".into(),
            series: Some("B".into()),
            volume: "34".into(),
            year: "1987".into(),
            page: "1".into(),
            is_ibid: false,
            extra_ibids: vec![IbidNumeration {
                series: None,
                volume: "36".into(),
                year: "1988".into(),
                page: "2".into(),
            }],
        }
    }

    #[test]
    fn test_title_render_formats() {
        let t = nucl_phys();
        assert_eq!(t.render(TitleFormat::Standard), "Nucl. Phys. B 34 (1987) 1");
        assert_eq!(t.render(TitleFormat::Inspire), "Nucl. Phys. B,34,1");
    }

    #[test]
    fn test_full_title_does_not_repeat_series() {
        let mut t = nucl_phys();
        t.title = "Phys. Rev. D".into();
        t.series = Some("D".into());
        assert_eq!(t.full_title(), "Phys. Rev. D");
    }

    #[test]
    fn test_take_extra_ibids_inherits_series() {
        let mut t = nucl_phys();
        let ibids = t.take_extra_ibids();
        assert!(t.extra_ibids.is_empty());
        assert_eq!(ibids.len(), 1);
        assert!(ibids[0].is_ibid);
        assert_eq!(ibids[0].full_title(), "Nucl. Phys. B");
        assert_eq!(ibids[0].volume, "36");
    }

    #[test]
    fn test_fields_merge_misc_and_authors() {
        let record = CitationRecord {
            marker: "[3]".into(),
            elements: vec![
                CitationElement::Author {
                    text: "J. Smith".into(),
                    kind: AuthorKind::Standard,
                },
                CitationElement::Misc {
                    text: "On things".into(),
                },
                CitationElement::Author {
                    text: "A. Jones".into(),
                    kind: AuthorKind::Standard,
                },
                CitationElement::Doi {
                    value: "10.1000/xyz".into(),
                },
                CitationElement::Misc {
                    text: "preprint".into(),
                },
            ],
        };
        let fields = record.fields(TitleFormat::Standard);
        assert_eq!(
            fields,
            vec![
                RecordField::Marker("[3]".into()),
                RecordField::Author("J. Smith A. Jones".into()),
                RecordField::Misc("On things preprint".into()),
                RecordField::Doi("10.1000/xyz".into()),
            ]
        );
    }

    #[test]
    fn test_counts_include_extra_ibids() {
        let mut counts = ElementCounts::default();
        counts.record(&CitationElement::Title(nucl_phys()));
        counts.record(&CitationElement::Misc { text: "x".into() });
        assert_eq!(counts.title, 2);
        assert_eq!(counts.misc, 1);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ExtractionStatus::Success.code(), 0);
        assert_eq!(ExtractionStatus::LowConfidence.code(), 4);
        assert_eq!(HowFound::Numbers.code(), 4);
    }

    #[test]
    fn test_element_serializes_with_type_tag() {
        let json = serde_json::to_string(&CitationElement::Doi {
            value: "10.1/x".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"doi","value":"10.1/x"}"#);
    }
}
