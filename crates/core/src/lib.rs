pub mod assistant;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod retriever;
pub mod store;
pub mod synthesizer;
#[cfg(test)]
mod test_server;
pub mod traits;
pub mod web;

pub use assistant::{open_index, Assistant};
pub use chunking::{normalize_whitespace, ChunkingConfig, RecursiveChunker, TextSpan};
pub use config::{load_dotenv, Settings};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AssistError, EmbeddingError, LoaderError, ModelError, StoreError};
pub use extractor::{LopdfExtractor, PdfExtractor, PdfText};
pub use index::{build_or_open, Index, IndexSettings};
pub use llm::{LanguageModel, OllamaModel, OllamaOptions};
pub use loader::{corpus_fingerprint, discover_pdf_files, CorpusLoader, LoadReport};
pub use models::{
    Chunk, ChunkRecord, Document, DocumentSource, IndexManifest, ScoredChunk, SkippedSource,
};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use store::{BuildLock, FlatCollection};
pub use synthesizer::{clean_response, AnswerSynthesizer, PromptTemplate};
pub use traits::VectorStore;
pub use web::{html_to_text, HttpFetcher, WebFetcher, WebPage};
