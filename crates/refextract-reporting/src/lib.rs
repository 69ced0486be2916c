//! Export of extracted references.

pub mod export;
pub mod types;

pub use export::{export_json, export_marcxml, export_results, export_text, render};
pub use types::{ExportError, ExportFormat};
