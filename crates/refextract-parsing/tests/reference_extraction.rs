//! End-to-end properties of the extraction pipeline.
//!
//! These run against the bundled knowledge bases, from raw document lines
//! through section detection, line rebuilding, tagging and assembly.

use std::sync::Arc;
use std::time::Duration;

use refextract_core::{RecordField, TitleFormat};
use refextract_parsing::kb::TitleKnowledgeBase;
use refextract_parsing::numeration::standardize_numeration;
use refextract_parsing::rebuild::rebuild_reference_lines;
use refextract_parsing::repair::repair_line;
use refextract_parsing::section::section_lines;
use refextract_parsing::{
    assemble_line, locate_reference_section, tag_line, ExtractionStatus, HowFound, KbError,
    KnowledgeBases, ParsingConfig, ReferenceExtractor, TaggedLine,
};

fn kbs() -> KnowledgeBases {
    KnowledgeBases::bundled().expect("bundled knowledge bases parse")
}

fn doc(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn tag(line: &str) -> String {
    tag_line(line, &kbs(), Duration::from_secs(5))
        .expect("tagging finishes in time")
        .text
}

#[test]
fn repair_is_idempotent() {
    let lines = [
        "[3] A. Smith ,  Phys. Rev. D 12 (1999) 34 .",
        "See h t t p : / / www. cern .ch / a b/ c.html",
        "communica-   tion  (1996)",
    ];
    for line in lines {
        let once = repair_line(line);
        assert_eq!(repair_line(&once), once, "repairing {line:?} twice changed it");
    }
}

#[test]
fn retagging_a_tagged_line_changes_nothing() {
    let kbs = kbs();
    let line = "J. Smith, Nucl. Phys. B 34 (1987) 1; ibid 36 (1988) 2, hep-th/9901001, doi:10.1000/x";
    let once = tag_line(line, &kbs, Duration::from_secs(5)).unwrap();
    let twice = tag_line(&once.text, &kbs, Duration::from_secs(5)).unwrap();
    assert_eq!(twice.text, once.text);
    assert!(twice.dois.is_empty());
    assert!(twice.urls.is_empty());
}

#[test]
fn numeration_orderings_standardize_alike() {
    let canonical = "<VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>";
    for line in [
        "Phys. Rev. 12 (1999) 34",
        "Phys. Rev. 12, 34 (1999)",
        "Phys. Rev. 12 D (1999) 34",
        "Phys. Rev. 12 D, 34 (1999)",
    ] {
        let tagged = standardize_numeration(line);
        assert!(tagged.contains(canonical), "{line:?} standardized to {tagged:?}");
    }
}

#[test]
fn boundary_of_a_minimal_section() {
    let lines = doc(&["References", "[1] A.", "[2] B."]);
    let bounds = locate_reference_section(&lines).expect("section found");
    assert_eq!(bounds.start_line, 0);
    assert_eq!(bounds.how_found, HowFound::Title);
    assert_eq!(bounds.marker.as_deref(), Some("[1]"));
    assert_eq!(bounds.end_line, Some(2));
    assert_eq!(section_lines(&lines, &bounds), doc(&["[1] A.", "[2] B."]));
}

#[test]
fn broken_line_is_rebuilt() {
    let lines = doc(&[
        "References",
        "[1] Example, AN: private communica-",
        "tion (1996).",
        "[2] B. Jones, Nature 410 (2001) 37",
    ]);
    let bounds = locate_reference_section(&lines).unwrap();
    let section = section_lines(&lines, &bounds);
    let rebuilt = rebuild_reference_lines(&section, bounds.marker_pattern.as_ref());
    assert_eq!(rebuilt.len(), 2);
    assert_eq!(rebuilt[0].marker, "[1]");
    assert_eq!(rebuilt[0].text, "Example, AN: private communica-tion (1996).");
}

#[test]
fn title_is_standardized() {
    assert_eq!(
        tag("Astronomy and Astrophysics 12 (1999) 34"),
        "<TITLE>Astron. Astrophys.</TITLE> <VOL>12</VOL> <YR>(1999)</YR> <PG>34</PG>"
    );
}

#[test]
fn semicolon_separates_citations() {
    let kbs = kbs();
    let tagged = tag_line(
        "J. Smith, Phys. Rev. Lett. 12 (1999) 34; A. Jones, Nature 410 (2001) 37",
        &kbs,
        Duration::from_secs(5),
    )
    .unwrap();
    let (records, counts) = assemble_line("[1]", &tagged, &ParsingConfig::default());
    assert_eq!(records.len(), 2);
    assert_eq!(counts.title, 2);
    assert_eq!(counts.author_group, 2);
    assert_eq!(
        records[0].fields(TitleFormat::Standard),
        vec![
            RecordField::Marker("[1]".into()),
            RecordField::Author("J. Smith".into()),
            RecordField::Title("Phys. Rev. Lett. 12 (1999) 34".into()),
        ]
    );
}

#[test]
fn semicolon_of_an_html_entity_does_not_split() {
    let line = TaggedLine {
        text: "<TITLE>Nature</TITLE> <VOL>1</VOL> <YR>(2000)</YR> <PG>2</PG>, Smith &amp; Sons, <DOI />"
            .to_string(),
        urls: Vec::new(),
        dois: vec!["10.1000/x".to_string()],
    };
    let (records, _) = assemble_line("[1]", &line, &ParsingConfig::default());
    assert_eq!(records.len(), 1);
    assert!(records[0].has_doi());
}

#[test]
fn author_after_title_and_text_stays_with_citation() {
    let tagged = tag_line(
        "Nucl. Phys. B 34 (1987) 1, in: A. Jones, Proceedings of the Meeting",
        &kbs(),
        Duration::from_secs(5),
    )
    .unwrap();
    let (records, counts) = assemble_line("[4]", &tagged, &ParsingConfig::default());
    assert_eq!(records.len(), 1);
    assert_eq!(counts.author_group, 1);
    assert!(records[0].has_title());
    assert!(records[0].has_author());
}

#[test]
fn ibid_resolves_to_previous_title() {
    let tagged = tag_line(
        "Nucl. Phys. B 34 (1987) 1; ibid 36 (1988) 2",
        &kbs(),
        Duration::from_secs(5),
    )
    .unwrap();
    let (records, _) = assemble_line("", &tagged, &ParsingConfig::default());
    let titles: Vec<String> = records
        .iter()
        .filter_map(|r| r.title())
        .map(|t| t.render(TitleFormat::Standard))
        .collect();
    assert_eq!(titles, vec!["Nucl. Phys. B 34 (1987) 1", "Nucl. Phys. B 36 (1988) 2"]);
    assert!(records[1].title().unwrap().is_ibid);
}

#[test]
fn title_kb_line_without_separator_is_fatal() {
    let err = TitleKnowledgeBase::parse("PHYS REV --- Phys. Rev.\nPHYS REV LETT Phys. Rev. Lett.\n")
        .unwrap_err();
    assert!(matches!(err, KbError::MalformedLine { line: 2, .. }));
}

#[test]
fn whole_document_extraction() {
    let lines = doc(&[
        "1 Introduction",
        "We build on earlier work [1, 2].",
        "",
        "References",
        "[1] J. Smith and A. Jones, Nucl. Phys. B 34 (1987) 1;",
        "ibid 36 (1988) 2",
        "[2] CERN-TH-2001-123, http://cern.ch/report",
    ]);
    let extractor = ReferenceExtractor::new(Arc::new(kbs()));
    let result = extractor.extract_lines("paper", &lines);

    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.reference_lines, 2);
    assert_eq!(result.counts.title, 2);
    assert_eq!(result.counts.report_number, 1);
    assert_eq!(result.counts.url, 1);

    let markers: Vec<&str> = result.records.iter().map(|r| r.marker.as_str()).collect();
    assert_eq!(markers, vec!["[1]", "[1]", "[2]"]);
    // the ibid citation takes the authors of the citation it refers to
    assert!(result.records[1].has_author());
}
