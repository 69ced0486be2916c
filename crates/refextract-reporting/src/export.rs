use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

use refextract_core::{DocumentResult, ElementCounts, ExtractionStatus, RecordField, TitleFormat};

use crate::types::{ExportError, ExportFormat};

const MARC_NAMESPACE: &str = "http://www.loc.gov/MARC21/slim";

/// Render results in the given format and write them to `path`.
pub fn export_results(
    results: &[DocumentResult],
    format: ExportFormat,
    title_format: TitleFormat,
    path: &Path,
) -> Result<(), ExportError> {
    let content = render(results, format, title_format)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Render results in the given format.
pub fn render(
    results: &[DocumentResult],
    format: ExportFormat,
    title_format: TitleFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => export_json(results, title_format),
        ExportFormat::Xml => export_marcxml(results, title_format),
        ExportFormat::Text => Ok(export_text(results, title_format)),
    }
}

fn status_str(status: ExtractionStatus) -> &'static str {
    match status {
        ExtractionStatus::Success => "success",
        ExtractionStatus::EmptyDocument => "empty_document",
        ExtractionStatus::NoReferenceSection => "no_reference_section",
        ExtractionStatus::NoSectionEnd => "no_section_end",
        ExtractionStatus::LowConfidence => "low_confidence",
    }
}

/// `status-reportnum-title-author-url-doi-misc`
fn stats_line(status: ExtractionStatus, counts: &ElementCounts) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}-{}",
        status.code(),
        counts.report_number,
        counts.title,
        counts.author_group,
        counts.url,
        counts.doi,
        counts.misc
    )
}

// ── JSON ──

#[derive(Serialize)]
struct JsonDocument<'a> {
    document_id: &'a str,
    status: ExtractionStatus,
    status_code: u8,
    how_found: Option<u8>,
    reference_lines: usize,
    degraded_lines: usize,
    counts: &'a ElementCounts,
    references: Vec<Vec<RecordField>>,
}

pub fn export_json(
    results: &[DocumentResult],
    title_format: TitleFormat,
) -> Result<String, ExportError> {
    let documents: Vec<JsonDocument<'_>> = results
        .iter()
        .map(|r| JsonDocument {
            document_id: &r.document_id,
            status: r.status,
            status_code: r.status.code(),
            how_found: r.how_found.map(|h| h.code()),
            reference_lines: r.reference_lines,
            degraded_lines: r.degraded_lines,
            counts: &r.counts,
            references: r.records.iter().map(|rec| rec.fields(title_format)).collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&documents)?)
}

// ── MARC-XML ──

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn write_event<'a>(writer: &mut XmlWriter, event: impl Into<Event<'a>>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::Xml(e.to_string()))
}

fn write_text_element(
    writer: &mut XmlWriter,
    start: BytesStart<'_>,
    text: &str,
) -> Result<(), ExportError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    write_event(writer, Event::Start(start))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn write_subfield(writer: &mut XmlWriter, code: &str, text: &str) -> Result<(), ExportError> {
    write_text_element(
        writer,
        BytesStart::new("subfield").with_attributes([("code", code)]),
        text,
    )
}

fn datafield(ind2: &str) -> BytesStart<'_> {
    BytesStart::new("datafield").with_attributes([("tag", "999"), ("ind1", "C"), ("ind2", ind2)])
}

/// Subfield code and value of a record field. URLs yield two subfields.
fn subfields(field: &RecordField) -> Vec<(&'static str, &str)> {
    match field {
        RecordField::Marker(s) => vec![("o", s.as_str())],
        RecordField::Title(s) => vec![("s", s.as_str())],
        RecordField::ReportNumber(s) => vec![("r", s.as_str())],
        RecordField::Url { url, description } => {
            vec![("u", url.as_str()), ("z", description.as_str())]
        }
        RecordField::Doi(s) => vec![("a", s.as_str())],
        RecordField::Author(s) => vec![("h", s.as_str())],
        RecordField::Misc(s) => vec![("m", s.as_str())],
    }
}

/// MARC-XML: one `999C5` datafield per citation record and a `999C6`
/// statistics field per document.
pub fn export_marcxml(
    results: &[DocumentResult],
    title_format: TitleFormat,
) -> Result<String, ExportError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_event(
        &mut writer,
        Event::Start(BytesStart::new("collection").with_attributes([("xmlns", MARC_NAMESPACE)])),
    )?;

    for result in results {
        write_event(&mut writer, Event::Start(BytesStart::new("record")))?;
        write_text_element(
            &mut writer,
            BytesStart::new("controlfield").with_attributes([("tag", "001")]),
            &result.document_id,
        )?;

        for record in &result.records {
            write_event(&mut writer, Event::Start(datafield("5")))?;
            for field in record.fields(title_format) {
                for (code, value) in subfields(&field) {
                    write_subfield(&mut writer, code, value)?;
                }
            }
            write_event(&mut writer, Event::End(BytesEnd::new("datafield")))?;
        }

        write_event(&mut writer, Event::Start(datafield("6")))?;
        write_subfield(&mut writer, "a", &stats_line(result.status, &result.counts))?;
        write_event(&mut writer, Event::End(BytesEnd::new("datafield")))?;
        write_event(&mut writer, Event::End(BytesEnd::new("record")))?;
    }
    write_event(&mut writer, Event::End(BytesEnd::new("collection")))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| ExportError::Xml(e.to_string()))
}

// ── Plain text ──

fn field_line(field: &RecordField) -> Option<String> {
    Some(match field {
        RecordField::Marker(_) => return None,
        RecordField::Title(s) => format!("title: {s}"),
        RecordField::ReportNumber(s) => format!("report number: {s}"),
        RecordField::Url { url, description } if url == description => format!("url: {url}"),
        RecordField::Url { url, description } => format!("url: {url} ({description})"),
        RecordField::Doi(s) => format!("doi: {s}"),
        RecordField::Author(s) => format!("authors: {s}"),
        RecordField::Misc(s) => format!("misc: {s}"),
    })
}

pub fn export_text(results: &[DocumentResult], title_format: TitleFormat) -> String {
    let mut out = String::from("Extracted references\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');

    for result in results {
        out.push_str(&format!("\n{}\n", result.document_id));
        out.push_str(&"-".repeat(result.document_id.chars().count()));
        out.push('\n');
        let c = &result.counts;
        out.push_str(&format!(
            "  {} | {} lines | {} titles | {} report numbers | {} authors | {} urls | {} dois | {} misc\n\n",
            status_str(result.status),
            result.reference_lines,
            c.title,
            c.report_number,
            c.author_group,
            c.url,
            c.doi,
            c.misc,
        ));

        for record in &result.records {
            let marker = if record.marker.is_empty() {
                "-"
            } else {
                record.marker.as_str()
            };
            let fields = record.fields(title_format);
            let mut lines = fields.iter().filter_map(field_line);
            if let Some(first) = lines.next() {
                out.push_str(&format!("  {marker} {first}\n"));
            }
            let indent = " ".repeat(marker.chars().count() + 3);
            for line in lines {
                out.push_str(&format!("{indent}{line}\n"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use refextract_core::{AuthorKind, CitationElement, CitationRecord, HowFound, TitleCitation};

    fn sample() -> DocumentResult {
        let mut result = DocumentResult::with_status("paper.pdf", ExtractionStatus::Success);
        result.how_found = Some(HowFound::Title);
        result.reference_lines = 1;
        result.records = vec![CitationRecord {
            marker: "[1]".into(),
            elements: vec![
                CitationElement::Author {
                    text: "J. Smith".into(),
                    kind: AuthorKind::Standard,
                },
                CitationElement::Title(TitleCitation {
                    title: "Nucl. Phys.".into(),
                    series: Some("B".into()),
                    volume: "34".into(),
                    year: "1987".into(),
                    page: "1".into(),
                    is_ibid: false,
                    extra_ibids: Vec::new(),
                }),
                CitationElement::Url {
                    url: "http://x.org/a".into(),
                    description: "paper & notes".into(),
                },
            ],
        }];
        result.counts = ElementCounts {
            title: 1,
            author_group: 1,
            url: 1,
            ..Default::default()
        };
        result
    }

    #[test]
    fn test_stats_line() {
        let counts = ElementCounts {
            misc: 7,
            title: 2,
            report_number: 3,
            url: 4,
            doi: 5,
            author_group: 6,
        };
        assert_eq!(stats_line(ExtractionStatus::Success, &counts), "0-3-2-6-4-5-7");
    }

    #[test]
    fn test_json_export() {
        let json = export_json(&[sample()], TitleFormat::Standard).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let doc = &value[0];
        assert_eq!(doc["document_id"], "paper.pdf");
        assert_eq!(doc["status"], "success");
        assert_eq!(doc["how_found"], 1);
        let fields = doc["references"][0].as_array().unwrap();
        assert_eq!(fields[0]["field"], "marker");
        assert_eq!(fields[2]["value"], "Nucl. Phys. B 34 (1987) 1");
    }

    #[test]
    fn test_marcxml_export() {
        let xml = export_marcxml(&[sample()], TitleFormat::Inspire).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<datafield tag="999" ind1="C" ind2="5">"#));
        assert!(xml.contains(r#"<subfield code="o">[1]</subfield>"#));
        assert!(xml.contains(r#"<subfield code="h">J. Smith</subfield>"#));
        assert!(xml.contains(r#"<subfield code="s">Nucl. Phys. B,34,1</subfield>"#));
        assert!(xml.contains(r#"<subfield code="z">paper &amp; notes</subfield>"#));
        assert!(xml.contains(r#"<subfield code="a">0-0-1-1-1-0-0</subfield>"#));
    }

    #[test]
    fn test_text_export() {
        let text = export_text(&[sample()], TitleFormat::Standard);
        assert!(text.contains("paper.pdf\n---------\n"));
        assert!(text.contains("  [1] authors: J. Smith\n"));
        assert!(text.contains("      title: Nucl. Phys. B 34 (1987) 1\n"));
        assert!(text.contains("      url: http://x.org/a (paper & notes)\n"));
    }

    #[test]
    fn test_export_results_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        export_results(&[sample()], ExportFormat::Json, TitleFormat::Standard, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("paper.pdf"));
    }
}
