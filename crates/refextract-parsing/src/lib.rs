//! Reference extraction from document text.
//!
//! Pipeline:
//! 1. Strip page furniture (page breaks, running headers and footers)
//! 2. Locate the reference section and its marker style
//! 3. Rebuild logical reference lines from broken physical lines
//! 4. Tag titles, report numbers, numeration, URLs, DOIs and authors
//! 5. Split tagged lines into citation records
//!
//! [`ReferenceExtractor`] runs the whole pipeline; each stage is also
//! usable on its own.

use thiserror::Error;

pub mod assemble;
pub mod authors;
pub mod config;
pub mod extractor;
pub mod identifiers;
pub mod kb;
pub mod numeration;
pub mod page;
pub mod rebuild;
pub mod repair;
pub mod section;
pub mod tagger;

pub use assemble::{assemble_line, parse_tagged_line, split_citations, ParsedElement, ParsedLine};
pub use config::{ParsingConfig, ParsingConfigBuilder, PatternList};
pub use extractor::{DocumentText, ReferenceExtractor};
pub use kb::{KbError, KnowledgeBases, ReportNumberKnowledgeBase, TitleKnowledgeBase};
pub use section::{locate_reference_section, MarkerPattern, SectionBounds};
pub use tagger::{tag_line, BudgetExceeded, TaggedLine};
// Re-export domain types from core (canonical definitions live there)
pub use refextract_core::{
    CitationElement, CitationRecord, DocumentResult, ElementCounts, ExtractionStatus, HowFound,
    ReferenceLine, TextBackend,
};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error(transparent)]
    Kb(#[from] KbError),
    #[error(transparent)]
    Backend(#[from] refextract_core::BackendError),
    #[error("invalid pattern in configuration: {0}")]
    Pattern(#[from] regex::Error),
}
