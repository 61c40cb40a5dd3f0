use crate::error::StoreError;
use crate::models::ScoredChunk;
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension every stored embedding and every query must have.
    fn dimensions(&self) -> usize;

    /// The `k` most similar chunks, best first.
    async fn similarity_search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}
