use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use refextract_core::{BackendError, TextBackend};

/// Form feed written by pdftotext between pages.
const PAGE_BREAK: char = '\x0c';

/// pdftotext-based implementation of [`TextBackend`].
///
/// Runs `pdftotext -raw -enc UTF-8 <file> -` and reads the text from its
/// standard output. Raw mode keeps the content stream order, which holds
/// reference lines together better than the layout modes do.
#[derive(Debug, Clone)]
pub struct PdftotextBackend {
    program: PathBuf,
}

impl Default for PdftotextBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
        }
    }
}

impl PdftotextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific pdftotext executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl TextBackend for PdftotextBackend {
    fn extract_lines(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        if !path.is_file() {
            return Err(BackendError::OpenError(format!(
                "{} is not a readable file",
                path.display()
            )));
        }

        let output = Command::new(&self.program)
            .args(["-raw", "-enc", "UTF-8"])
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| {
                BackendError::ExtractionError(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::ExtractionError(format!(
                "pdftotext exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let lines = split_output(&text);
        if conversion_is_bad(&lines) {
            warn!(path = %path.display(), "pdftotext output is mostly whitespace");
            return Err(BackendError::ExtractionError(
                "bad conversion: output is mostly whitespace".into(),
            ));
        }
        debug!(path = %path.display(), lines = lines.len(), "converted document");
        Ok(lines)
    }
}

/// Split pdftotext output into lines. A form feed starting a line becomes a
/// line of its own so page breaks stay visible to later stages.
pub fn split_output(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for line in text.lines() {
        match line.strip_prefix(PAGE_BREAK) {
            Some(rest) => {
                lines.push(PAGE_BREAK.to_string());
                if !rest.is_empty() {
                    lines.push(rest.to_string());
                }
            }
            None => lines.push(line.to_string()),
        }
    }
    lines
}

/// A conversion is garbage when the text holds at least three whitespace
/// characters for every word.
pub fn conversion_is_bad(lines: &[String]) -> bool {
    let (mut words, mut spaces) = (0usize, 0usize);
    for line in lines {
        let line = line.trim();
        words += line.split_whitespace().count();
        spaces += line.chars().filter(|c| c.is_whitespace()).count();
    }
    spaces > 0 && spaces >= words * 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_output_keeps_page_breaks() {
        let lines = split_output("first page\n\x0csecond page\nmore\n\x0c");
        assert_eq!(lines, vec!["first page", "\x0c", "second page", "more", "\x0c"]);
    }

    #[test]
    fn test_conversion_is_bad() {
        let good = vec!["[1] A. Smith, Phys. Rev. D 12 (1999) 34".to_string()];
        assert!(!conversion_is_bad(&good));

        let bad = vec!["a    b      c        d".to_string()];
        assert!(conversion_is_bad(&bad));

        assert!(!conversion_is_bad(&[]));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = PdftotextBackend::new()
            .extract_lines(Path::new("/definitely/not/here.pdf"))
            .unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn test_missing_program_is_extraction_error() {
        let file = std::env::current_exe().unwrap();
        let err = PdftotextBackend::new()
            .with_program("/definitely/not/pdftotext")
            .extract_lines(&file)
            .unwrap_err();
        assert!(matches!(err, BackendError::ExtractionError(_)));
    }
}
