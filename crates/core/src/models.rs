use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentSource {
    Pdf { path: PathBuf },
    Web { url: String },
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Pdf { path } => write!(f, "{}", path.display()),
            DocumentSource::Web { url } => f.write_str(url),
        }
    }
}

/// Raw text of one loaded corpus item.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: DocumentSource,
    pub title: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source: DocumentSource,
    pub title: String,
    pub chunk_index: u64,
    /// Character offset of the chunk start in the document text.
    pub start_char: usize,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A persisted chunk together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub collection: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub corpus_fingerprint: String,
    pub record_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}
