use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for document-to-text conversion backends.
///
/// Implementors turn a binary document into ordered text lines; page breaks
/// are kept as lines containing a form feed (`\x0c`). Section detection and
/// citation parsing live in `refextract_parsing::ReferenceExtractor`.
pub trait TextBackend: Send + Sync {
    /// Extract the text lines of a document.
    fn extract_lines(&self, path: &Path) -> Result<Vec<String>, BackendError>;
}

/// Backend for documents that are already plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextBackend;

impl TextBackend for PlainTextBackend {
    fn extract_lines(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(text.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plain_text_backend_reads_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "References\n[1] A.\r\n[2] B.\n").unwrap();
        let lines = PlainTextBackend.extract_lines(file.path()).unwrap();
        assert_eq!(lines, vec!["References", "[1] A.", "[2] B."]);
    }

    #[test]
    fn test_plain_text_backend_missing_file() {
        let err = PlainTextBackend
            .extract_lines(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
    }
}
