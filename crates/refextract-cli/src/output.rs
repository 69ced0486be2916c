use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use refextract_core::{DocumentResult, ExtractionStatus};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn status_label(status: ExtractionStatus) -> &'static str {
    match status {
        ExtractionStatus::Success => "ok",
        ExtractionStatus::EmptyDocument => "empty document",
        ExtractionStatus::NoReferenceSection => "no reference section",
        ExtractionStatus::NoSectionEnd => "empty reference section",
        ExtractionStatus::LowConfidence => "low confidence, discarded",
    }
}

/// Print one line per document and a closing total.
pub fn print_summary(
    w: &mut dyn Write,
    results: &[DocumentResult],
    failures: &[(String, String)],
    color: ColorMode,
) -> std::io::Result<()> {
    for result in results {
        let label = status_label(result.status);
        let label = if !color.enabled() {
            label.to_string()
        } else if result.status == ExtractionStatus::Success {
            label.green().to_string()
        } else {
            label.yellow().to_string()
        };
        writeln!(
            w,
            "{}: {} ({} references, {} titles, {} report numbers)",
            result.document_id,
            label,
            result.records.len(),
            result.counts.title,
            result.counts.report_number
        )?;
        if result.degraded_lines > 0 {
            let note = format!("  {} lines kept unparsed after timeout", result.degraded_lines);
            if color.enabled() {
                writeln!(w, "{}", note.dimmed())?;
            } else {
                writeln!(w, "{note}")?;
            }
        }
    }

    for (path, error) in failures {
        if color.enabled() {
            writeln!(w, "{}: {} {}", path, "failed:".red().bold(), error)?;
        } else {
            writeln!(w, "{path}: failed: {error}")?;
        }
    }

    let records: usize = results.iter().map(|r| r.records.len()).sum();
    let total = format!(
        "{} documents, {} references, {} failed",
        results.len(),
        records,
        failures.len()
    );
    if color.enabled() {
        writeln!(w, "{}", total.bold())?;
    } else {
        writeln!(w, "{total}")?;
    }
    Ok(())
}

/// Report a knowledge base that parsed cleanly.
pub fn print_kb_summary(
    w: &mut dyn Write,
    path: &Path,
    kind: &str,
    entries: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} knowledge base {} ({} entries)",
            "✓".green(),
            kind,
            path.display(),
            entries
        )
    } else {
        writeln!(w, "OK {} knowledge base {} ({} entries)", kind, path.display(), entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_summary() {
        let mut ok = DocumentResult::with_status("a.pdf", ExtractionStatus::Success);
        ok.counts.title = 3;
        ok.degraded_lines = 1;
        let missing = DocumentResult::with_status("b.pdf", ExtractionStatus::NoReferenceSection);
        let failures = vec![("c.pdf".to_string(), "failed to open document: c.pdf".to_string())];

        let mut out = Vec::new();
        print_summary(&mut out, &[ok, missing], &failures, ColorMode(false)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("a.pdf: ok (0 references, 3 titles, 0 report numbers)"));
        assert!(text.contains("  1 lines kept unparsed after timeout"));
        assert!(text.contains("b.pdf: no reference section"));
        assert!(text.contains("c.pdf: failed: failed to open document"));
        assert!(text.ends_with("2 documents, 0 references, 1 failed\n"));
    }

    #[test]
    fn test_plain_kb_summary() {
        let mut out = Vec::new();
        print_kb_summary(&mut out, Path::new("titles.kb"), "title", 12, ColorMode(false)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "OK title knowledge base titles.kb (12 entries)\n"
        );
    }
}
