use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The corpus: a document loaded once at index-build time
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// Where the document was read from
    pub path: PathBuf,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Load a document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();

        if !path.is_file() {
            return Err(RagError::CorpusNotFound(path.to_path_buf()));
        }

        // Detect MIME type
        let mime = from_path(path).first_or_text_plain();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(path, &mime_type)?;
        info!("Loaded corpus {} ({} bytes)", path.display(), content.len());

        Ok(Document {
            content,
            path: path.to_path_buf(),
            mime_type,
        })
    }

    /// Lowercase hex SHA-256 of the content
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.content)
    }
}

pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();
    let document_error = |reason: String| RagError::Document {
        path: path.to_path_buf(),
        reason,
    };

    if mime_type.starts_with("application/pdf") {
        info!("Processing PDF document: {}", path.display());
        let content = extract_text(path).map_err(|e| document_error(e.to_string()))?;

        // PDF extraction can sometimes include excessive whitespace
        let cleaned_content = normalize_whitespace(&content);

        if cleaned_content.is_empty() {
            warn!("Extracted PDF content is empty or contains only whitespace");
        }

        return Ok(cleaned_content);
    }

    // Everything else is treated as UTF-8 text
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RagError::CorpusNotFound(path.to_path_buf()),
        ErrorKind::InvalidData => document_error("file is not valid UTF-8".to_string()),
        _ => RagError::Io(e),
    })
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        if newline_count > 0 {
            // At most one blank line, which the chunker treats as a paragraph break
            normalized.push_str(if newline_count >= 2 { "\n\n" } else { "\n" });
            newline_count = 0;
        }

        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.\n\n";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_missing_corpus() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        assert!(matches!(
            Document::from_file(&path),
            Err(RagError::CorpusNotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_reads_text_without_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cv");
        fs::write(&path, "### Eğitim\nX Üniversitesi").unwrap();

        let document = Document::from_file(&path).unwrap();
        assert_eq!(document.content, "### Eğitim\nX Üniversitesi");
        assert_eq!(document.mime_type, "text/plain");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        assert!(matches!(
            Document::from_file(&path),
            Err(RagError::Document { .. })
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
