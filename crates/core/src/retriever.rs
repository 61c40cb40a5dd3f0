use crate::embeddings::Embedder;
use crate::error::{AssistError, EmbeddingError};
use crate::index::Index;
use crate::models::{Chunk, ScoredChunk};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 2;

/// Embeds questions with the index's own embedding model and returns the
/// closest chunks.
pub struct Retriever {
    index: Arc<Index>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    /// Fails when `embedder` is not the model the index was built with;
    /// vectors from different models cannot be compared.
    pub fn new(index: Arc<Index>, embedder: Arc<dyn Embedder>, top_k: usize) -> Result<Self, AssistError> {
        if top_k == 0 {
            return Err(AssistError::Configuration("top-k must be at least 1".to_string()));
        }

        let built_with = &index.manifest().embedding_model;
        if built_with != embedder.model() {
            return Err(AssistError::Configuration(format!(
                "index was built with embedding model {built_with} but queries use {}",
                embedder.model()
            )));
        }

        Ok(Self {
            index,
            embedder,
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>, AssistError> {
        Ok(self
            .retrieve_scored(question)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub async fn retrieve_scored(&self, question: &str) -> Result<Vec<ScoredChunk>, AssistError> {
        let vector = self.embedder.embed(question).await?;
        if vector.len() != self.index.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.index.dimensions(),
                actual: vector.len(),
            }
            .into());
        }

        let hits = self.index.similarity_search(&vector, self.top_k).await?;
        debug!(
            hits = hits.len(),
            best_score = hits.first().map(|hit| hit.score).unwrap_or_default(),
            "retrieved chunks"
        );
        Ok(hits)
    }
}
