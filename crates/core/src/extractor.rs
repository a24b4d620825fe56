use lopdf::Document;

use crate::error::AcquireError;

/// Text extracted from one PDF page.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// The PDF text-extraction capability consumed by the acquirer.
///
/// `label` identifies the document in error messages (its URL or path).
pub trait PdfExtract: Send + Sync {
    fn extract_pages(&self, bytes: &[u8], label: &str) -> Result<Vec<PageText>, AcquireError>;
}

/// Extractor backed by `lopdf`, operating on in-memory bytes so PDFs
/// fetched over HTTP and local files share one path.
#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl PdfExtract for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8], label: &str) -> Result<Vec<PageText>, AcquireError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| AcquireError::UnreadableDocument(format!("{label}: {error}")))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| AcquireError::UnreadableDocument(format!("{label}: {error}")))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        // A structurally valid PDF with zero extractable text is a
        // scanned image, not an empty document.
        if pages.is_empty() {
            return Err(AcquireError::UnreadableDocument(format!(
                "no extractable text layer: {label}"
            )));
        }

        Ok(pages)
    }
}

/// Concatenates page texts into one body, recording the character
/// offset where each page after the first begins.
pub fn join_pages(pages: &[PageText]) -> (String, Vec<usize>) {
    let mut body = String::new();
    let mut breaks = Vec::new();

    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            body.push_str("\n\n");
            breaks.push(body.len());
        }
        body.push_str(page.text.trim());
    }

    (body, breaks)
}
