use crate::error::LoaderError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub page_count: usize,
}

pub trait PdfExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<PdfText, LoaderError>;
}

/// Extracts the text layer of every page with `lopdf`. Scanned pages without
/// a text layer contribute no text but still count towards `page_count`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<PdfText, LoaderError> {
        let document =
            Document::load(path).map_err(|error| LoaderError::PdfParse(error.to_string()))?;

        let page_numbers = document.get_pages();
        let mut pages = Vec::new();
        for &page_no in page_numbers.keys() {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(text),
                Ok(_) => {}
                Err(error) => debug!(path = %path.display(), page_no, %error, "page without text"),
            }
        }

        if pages.is_empty() {
            return Err(LoaderError::EmptyText(path.display().to_string()));
        }

        Ok(PdfText {
            page_count: page_numbers.len(),
            text: pages.join("\n\n"),
        })
    }
}
