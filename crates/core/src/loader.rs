use crate::error::{AssistError, LoaderError};
use crate::extractor::PdfExtractor;
use crate::models::{Document, DocumentSource, SkippedSource};
use crate::web::WebFetcher;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Hash of the corpus listing: PDF paths with their sizes, then the URLs.
/// Cheap to compute, no extraction involved.
pub fn corpus_fingerprint(folder: Option<&Path>, urls: &[String]) -> String {
    let mut hasher = Sha256::new();

    if let Some(folder) = folder {
        for path in discover_pdf_files(folder) {
            let size = std::fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(size.to_le_bytes());
        }
    }
    for url in urls {
        hasher.update(b"\0");
        hasher.update(url.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedSource>,
}

pub struct CorpusLoader<E, F> {
    extractor: E,
    fetcher: F,
}

impl<E, F> CorpusLoader<E, F>
where
    E: PdfExtractor,
    F: WebFetcher,
{
    pub fn new(extractor: E, fetcher: F) -> Self {
        Self { extractor, fetcher }
    }

    /// Loads every PDF below `folder` and every URL, skipping items that fail.
    /// Errors only when nothing at all could be loaded.
    pub async fn load(
        &self,
        folder: Option<&Path>,
        urls: &[String],
    ) -> Result<LoadReport, AssistError> {
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        if let Some(folder) = folder {
            for path in discover_pdf_files(folder) {
                match self.load_pdf_blocking(&path) {
                    Ok(document) => {
                        info!(path = %path.display(), "loaded pdf");
                        documents.push(document);
                    }
                    Err(error) => {
                        warn!(path = %path.display(), reason = %error, "skipped pdf");
                        skipped.push(SkippedSource {
                            source: path.display().to_string(),
                            reason: error.to_string(),
                        });
                    }
                }
            }
        }

        for url in urls {
            match self.load_url(url).await {
                Ok(document) => {
                    info!(url = %url, "loaded url");
                    documents.push(document);
                }
                Err(error) => {
                    warn!(url = %url, reason = %error, "skipped url");
                    skipped.push(SkippedSource {
                        source: url.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            return Err(AssistError::NoDocuments);
        }

        Ok(LoadReport { documents, skipped })
    }

    /// PDF parsing is synchronous; on a multi-threaded runtime the worker is
    /// handed over with `block_in_place` so other tasks keep running.
    fn load_pdf_blocking(&self, path: &Path) -> Result<Document, LoaderError> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.load_pdf(path))
            }
            _ => self.load_pdf(path),
        }
    }

    fn load_pdf(&self, path: &Path) -> Result<Document, LoaderError> {
        let extracted = self.extractor.extract(path)?;
        if extracted.text.trim().is_empty() {
            return Err(LoaderError::EmptyText(path.display().to_string()));
        }

        let title = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), path.display().to_string());
        metadata.insert("pages".to_string(), extracted.page_count.to_string());

        Ok(Document {
            source: DocumentSource::Pdf {
                path: path.to_path_buf(),
            },
            title,
            text: extracted.text,
            metadata,
        })
    }

    async fn load_url(&self, url: &str) -> Result<Document, LoaderError> {
        let page = self.fetcher.fetch(url).await?;
        if page.text.trim().is_empty() {
            return Err(LoaderError::EmptyText(url.to_string()));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), url.to_string());
        if let Some(title) = &page.title {
            metadata.insert("title".to_string(), title.clone());
        }

        Ok(Document {
            source: DocumentSource::Web {
                url: url.to_string(),
            },
            title: page.title.unwrap_or_else(|| url.to_string()),
            text: page.text,
            metadata,
        })
    }
}
