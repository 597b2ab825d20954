
use tracing::{debug, warn};

use crate::{Result, StudyError};

/// One page of text extracted from a document.
///
/// Pages exist only between extraction and chunking; they are not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number in document order.
    pub number: usize,
    /// Extracted text. Never empty: pages that yield no text are omitted.
    pub text: String,
    /// Name of the source document.
    pub source: String,
}

/// Outcome of extracting a batch of documents.
///
/// Warnings are per-document and non-fatal; extraction of the remaining
/// documents always continues.
#[derive(Debug, Default)]
pub struct Extraction {
    pub pages: Vec<Page>,
    pub warnings: Vec<String>,
}

/// Extract page-tagged text from one PDF held in memory.
///
/// Pages whose extraction yields no text (scanned images, empty pages) are
/// omitted rather than emitted as empty records. Page numbers count all
/// pages of the document, including omitted ones.
#[inline]
pub fn extract_document(name: &str, bytes: &[u8]) -> Result<Vec<Page>> {
    if bytes.is_empty() {
        return Err(StudyError::Extraction(format!("{name}: document is empty")));
    }

    let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| StudyError::Extraction(format!("{name}: {e}")))?;

    let total = page_texts.len();
    let pages: Vec<Page> = page_texts
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Page {
            number: i + 1,
            text,
            source: name.to_string(),
        })
        .collect();

    debug!(
        "Extracted {}/{} pages with text from {}",
        pages.len(),
        total,
        name
    );

    Ok(pages)
}

/// Extract a sequence of named documents into a flat page list.
///
/// Unreadable documents are skipped with a warning; there are no retries,
/// extraction failures are terminal per document.
#[inline]
pub fn extract_all<'a, I>(documents: I) -> Extraction
where
    I: IntoIterator<Item = (&'a str, Vec<u8>)>,
{
    let mut extraction = Extraction::default();

    for (name, bytes) in documents {
        match extract_document(name, &bytes) {
            Ok(pages) => extraction.pages.extend(pages),
            Err(e) => {
                warn!("Skipping document {}: {}", name, e);
                extraction.warnings.push(format!("{name} übersprungen: {e}"));
            }
        }
    }

    extraction
}
