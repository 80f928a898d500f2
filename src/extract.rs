//! PDF text and metadata extraction.
//!
//! Text comes from `pdf-extract`, one string per page; document properties and the page count
//! come from `lopdf`. The two are independent on purpose: a document whose `Info` dictionary
//! cannot be read still yields its text, with the metadata failure reported in-band.

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while turning an uploaded file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file could not be read from disk.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes are not a parseable PDF.
    #[error("Error extracting text from PDF: {0}")]
    Unparseable(String),
}

/// Descriptive metadata reported alongside extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DocumentMetadata {
    /// Metadata was read successfully.
    Available {
        /// Number of pages in the document.
        total_pages: usize,
        /// Entries of the document `Info` dictionary.
        metadata: BTreeMap<String, String>,
    },
    /// Metadata could not be read; text extraction is unaffected.
    Unavailable {
        /// Reason the metadata read failed.
        error: String,
    },
}

/// Text and metadata extracted from one document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Page texts joined by newlines, trimmed.
    pub text: String,
    /// Page count and document properties, or the reason they are missing.
    pub metadata: DocumentMetadata,
}

/// Interface implemented by document extractors.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract text and metadata from the document stored at `path`.
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError>;
}

/// Extractor for PDF files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        tracing::debug!(path = %path.display(), "Extracting PDF");
        let path: PathBuf = path.to_path_buf();

        // pdf-extract is synchronous and may panic on malformed input.
        let document = tokio::task::spawn_blocking(move || extract_pdf(&path))
            .await
            .map_err(|error| {
                ExtractionError::Unparseable(format!("extraction aborted: {error}"))
            })??;

        tracing::info!(
            characters = document.text.chars().count(),
            "PDF text extracted"
        );
        Ok(document)
    }
}

/// Extract text and metadata from the PDF at `path`.
pub fn extract_pdf(path: &Path) -> Result<ExtractedDocument, ExtractionError> {
    std::fs::metadata(path)?;
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|error| ExtractionError::Unparseable(error.to_string()))?;

    Ok(ExtractedDocument {
        text: join_pages(&pages),
        metadata: read_metadata(path),
    })
}

/// Join page texts with newlines, skipping pages that produced no text.
pub(crate) fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for page in pages.iter().map(AsRef::as_ref) {
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text.trim().to_string()
}

fn read_metadata(path: &Path) -> DocumentMetadata {
    match Document::load(path) {
        Ok(document) => DocumentMetadata::Available {
            total_pages: document.get_pages().len(),
            metadata: info_dictionary(&document)
                .map(properties)
                .unwrap_or_default(),
        },
        Err(error) => {
            tracing::warn!(error = %error, "PDF metadata unavailable");
            DocumentMetadata::Unavailable {
                error: error.to_string(),
            }
        }
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

fn properties(info: &Dictionary) -> BTreeMap<String, String> {
    info.iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Object::String(bytes, _) => decode_text_string(bytes)?,
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                Object::Integer(number) => number.to_string(),
                Object::Real(number) => number.to_string(),
                Object::Boolean(flag) => flag.to_string(),
                _ => return None,
            };
            Some((String::from_utf8_lossy(key).into_owned(), value))
        })
        .collect()
}

/// Decode a PDF text string: UTF-16BE when it carries a byte-order mark, otherwise
/// PDFDocEncoding, approximated as Latin-1.
fn decode_text_string(bytes: &[u8]) -> Option<String> {
    let decoded = if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).ok()?
    } else {
        bytes.iter().map(|&byte| char::from(byte)).collect()
    };
    let cleaned: String = decoded.chars().filter(|c| !c.is_control()).collect();
    Some(cleaned.trim().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a single-page PDF showing `line` (or an empty page when `None`).
    pub(crate) fn single_page_pdf(line: Option<&str>, title: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let operations = match line {
            Some(line) => vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
            None => vec![],
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }
}
