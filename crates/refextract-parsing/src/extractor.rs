use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use refextract_core::{
    CitationRecord, DocumentResult, ElementCounts, ExtractionStatus, HowFound, ReferenceLine,
    TextBackend,
};
use tracing::{debug, info, warn};

use crate::assemble::{assemble_line, misc_record};
use crate::config::ParsingConfig;
use crate::kb::KnowledgeBases;
use crate::section::{self, SectionBounds};
use crate::tagger::{tag_line, BudgetExceeded, TaggedLine};
use crate::{page, rebuild, ParsingError};

/// The text of one document, as handed to [`ReferenceExtractor::extract_batch`].
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub id: String,
    pub lines: Vec<String>,
}

/// A configurable reference extraction pipeline.
///
/// Holds the shared knowledge bases and a [`ParsingConfig`] and exposes each
/// pipeline step as a method. Documents are independent, so one extractor
/// can serve many threads.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    kbs: Arc<KnowledgeBases>,
    config: ParsingConfig,
}

impl ReferenceExtractor {
    /// Create an extractor with default configuration.
    pub fn new(kbs: Arc<KnowledgeBases>) -> Self {
        Self::with_config(kbs, ParsingConfig::default())
    }

    /// Create an extractor with a custom configuration.
    pub fn with_config(kbs: Arc<KnowledgeBases>, config: ParsingConfig) -> Self {
        Self { kbs, config }
    }

    /// Get a reference to the current config.
    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    pub fn knowledge_bases(&self) -> &KnowledgeBases {
        &self.kbs
    }

    /// Remove page breaks and running headers and footers (step 1).
    pub fn strip_page_furniture(&self, lines: &[String]) -> Vec<String> {
        if self.config.strip_page_furniture {
            page::strip_page_furniture(lines)
        } else {
            lines.to_vec()
        }
    }

    /// Locate the reference section (step 2).
    pub fn locate_section(&self, lines: &[String]) -> Option<SectionBounds> {
        section::locate_reference_section_with_config(lines, &self.config)
    }

    /// Rebuild the logical reference lines of a located section (step 3).
    pub fn rebuild_lines(&self, lines: &[String], bounds: &SectionBounds) -> Vec<ReferenceLine> {
        let section = section::section_lines(lines, bounds);
        rebuild::rebuild_reference_lines(&section, bounds.marker_pattern.as_ref())
    }

    /// Tag one reference line (step 4).
    pub fn tag_line(&self, text: &str) -> Result<TaggedLine, BudgetExceeded> {
        tag_line(text, &self.kbs, self.config.line_time_budget)
    }

    /// Split a tagged line into citation records (step 5).
    pub fn assemble_line(
        &self,
        marker: &str,
        line: &TaggedLine,
    ) -> (Vec<CitationRecord>, ElementCounts) {
        assemble_line(marker, line, &self.config)
    }

    /// Run the full pipeline on the text lines of one document.
    pub fn extract_lines(&self, document_id: &str, lines: &[String]) -> DocumentResult {
        if lines.iter().all(|l| l.trim().is_empty()) {
            debug!(document = document_id, "document has no text");
            return DocumentResult::with_status(document_id, ExtractionStatus::EmptyDocument);
        }

        let lines = self.strip_page_furniture(lines);
        let Some(bounds) = self.locate_section(&lines) else {
            info!(document = document_id, "no reference section found");
            return DocumentResult::with_status(document_id, ExtractionStatus::NoReferenceSection);
        };
        debug!(
            document = document_id,
            start = bounds.start_line,
            end = ?bounds.end_line,
            how_found = ?bounds.how_found,
            "located reference section"
        );

        let reference_lines = self.rebuild_lines(&lines, &bounds);
        let mut result = DocumentResult::with_status(document_id, ExtractionStatus::Success);
        result.how_found = Some(bounds.how_found);
        if reference_lines.is_empty() {
            result.status = ExtractionStatus::NoSectionEnd;
            return result;
        }
        result.reference_lines = reference_lines.len();

        for line in &reference_lines {
            let (records, counts) = match self.tag_line(&line.text) {
                Ok(tagged) => self.assemble_line(&line.marker, &tagged),
                Err(BudgetExceeded) => {
                    warn!(
                        document = document_id,
                        marker = %line.marker,
                        "tagging ran out of time, keeping line as misc"
                    );
                    result.degraded_lines += 1;
                    misc_record(&line.marker, &line.text, &self.config)
                }
            };
            result.records.extend(records);
            result.counts.merge(&counts);
        }

        if bounds.how_found > HowFound::Title
            && result.counts.title == 0
            && result.counts.report_number == 0
        {
            info!(
                document = document_id,
                how_found = ?bounds.how_found,
                "no title or report number in a section found by markers, discarding"
            );
            result.records.clear();
            result.status = ExtractionStatus::LowConfidence;
        }

        info!(
            document = document_id,
            lines = result.reference_lines,
            records = result.records.len(),
            titles = result.counts.title,
            report_numbers = result.counts.report_number,
            degraded = result.degraded_lines,
            "extracted references"
        );
        result
    }

    /// Run the pipeline on a file, converting it to text with `backend`.
    pub fn extract_from_path(
        &self,
        path: &Path,
        backend: &dyn TextBackend,
    ) -> Result<DocumentResult, ParsingError> {
        let lines = backend.extract_lines(path)?;
        Ok(self.extract_lines(&path.display().to_string(), &lines))
    }

    /// Process documents in parallel. Results come back in input order.
    pub fn extract_batch(&self, documents: &[DocumentText]) -> Vec<DocumentResult> {
        documents
            .par_iter()
            .map(|doc| self.extract_lines(&doc.id, &doc.lines))
            .collect()
    }
}
