/// Plain-text extraction for the supported document formats.
///
/// `.txt` / `.md` are read as UTF-8 (invalid sequences are replaced),
/// `.pdf` goes through `lopdf`, `.docx` through `docx-rs`.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors that can occur while extracting text from a file.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf extraction failed: {0}")]
    Pdf(String),

    #[error("docx extraction failed: {0}")]
    Docx(String),
}

/// Source of document text. Implementations must be usable from the blocking
/// thread pool.
pub trait Extractor: Send + Sync {
    /// Whether `path` has an extension this extractor handles.
    fn supports(&self, path: &Path) -> bool;

    /// Extract the full plain text of `path`.
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Lower-cased extension without the leading dot.
#[must_use]
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Filesystem extractor for PDF, DOCX, plain text and markdown.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    extensions: HashSet<String>,
}

impl FileExtractor {
    /// Restrict the extractor to `extensions` (with or without a leading dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new(["pdf", "docx", "txt", "md"])
    }
}

impl Extractor for FileExtractor {
    fn supports(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = extension_of(path).unwrap_or_default();
        if !self.extensions.contains(&ext) {
            return Err(ExtractError::UnsupportedFormat(format!(".{ext}")));
        }

        match ext.as_str() {
            "pdf" => read_pdf(path),
            "docx" => read_docx(path),
            "txt" | "md" => read_text(path),
            other => Err(ExtractError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

fn read_error(path: &Path, source: std::io::Error) -> ExtractError {
    ExtractError::Read {
        path: path.display().to_string(),
        source,
    }
}

fn read_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_pdf(path: &Path) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        let text = doc
            .extract_text(&[*page_number])
            .map_err(|e| ExtractError::Pdf(format!("page {page_number}: {e}")))?;
        pages.push(text);
    }

    Ok(pages.join("\n"))
}

fn read_docx(path: &Path) -> Result<String, ExtractError> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for pc in &paragraph.children {
                if let ParagraphChild::Run(run) = pc {
                    for rc in &run.children {
                        match rc {
                            RunChild::Text(t) => line.push_str(&t.text),
                            RunChild::Tab(_) => line.push('\t'),
                            RunChild::Break(_) => line.push('\n'),
                            _ => {}
                        }
                    }
                }
            }
            paragraphs.push(line);
        }
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_supports_is_case_insensitive() {
        let ex = FileExtractor::default();
        assert!(ex.supports(Path::new("/a/b/Report.PDF")));
        assert!(ex.supports(Path::new("notes.md")));
        assert!(!ex.supports(Path::new("image.png")));
        assert!(!ex.supports(Path::new("Makefile")));
    }

    #[test]
    fn test_custom_extensions_with_dots() {
        let ex = FileExtractor::new([".txt"]);
        assert!(ex.supports(Path::new("a.txt")));
        assert!(!ex.supports(Path::new("a.md")));
    }

    #[test]
    fn test_read_text_file() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("hello.txt");
        fs::write(&p, "hello\nworld").unwrap();
        let text = FileExtractor::default().extract(&p).unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("bad.txt");
        fs::write(&p, [b'o', b'k', 0xff, b'!']).unwrap();
        let text = FileExtractor::default().extract(&p).unwrap();
        assert!(text.starts_with("ok"));
        assert!(text.ends_with('!'));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("data.csv");
        fs::write(&p, "a,b").unwrap();
        let err = FileExtractor::default().extract(&p).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = FileExtractor::default()
            .extract(Path::new("/nonexistent/docrag/missing.md"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }

    #[test]
    fn test_corrupt_pdf() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("broken.pdf");
        fs::write(&p, "not a pdf").unwrap();
        assert!(matches!(
            FileExtractor::default().extract(&p),
            Err(ExtractError::Pdf(_))
        ));
    }
}
