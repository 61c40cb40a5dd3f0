use crate::chunking::ChunkingConfig;
use crate::embeddings::{Embedder, EMBED_BATCH_SIZE};
use crate::error::{AssistError, EmbeddingError, StoreError};
use crate::models::{Chunk, ChunkRecord, IndexManifest, ScoredChunk};
use crate::store::{BuildLock, FlatCollection};
use crate::traits::VectorStore;
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub path: PathBuf,
    pub collection: String,
    pub chunking: ChunkingConfig,
    /// Listing hash of the corpus the index should reflect, see
    /// [`crate::loader::corpus_fingerprint`].
    pub corpus_fingerprint: String,
}

/// A fully built, read-only collection of embedded chunks.
#[derive(Debug)]
pub struct Index {
    collection: FlatCollection,
}

impl Index {
    pub fn manifest(&self) -> &IndexManifest {
        self.collection.manifest()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.collection.dimensions()
    }

    pub async fn similarity_search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        self.collection.similarity_search(query_vector, k).await
    }
}

/// Opens the persisted collection if present; otherwise loads chunks from
/// `chunks_provider`, embeds all of them and persists the result.
///
/// Opening never calls `chunks_provider` or the embedder. Building is
/// all-or-nothing: any failure leaves no collection behind. Concurrent builds
/// against the same path are refused through a lock file.
pub async fn build_or_open<F, Fut>(
    settings: &IndexSettings,
    chunks_provider: F,
    embedder: &dyn Embedder,
) -> Result<Index, AssistError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Chunk>, AssistError>>,
{
    if FlatCollection::exists(&settings.path, &settings.collection) {
        return open(settings, embedder);
    }

    info!(path = %settings.path.display(), collection = %settings.collection, "index not found, building");
    let _lock = BuildLock::acquire(&settings.path, &settings.collection)?;

    // another process may have finished while we waited for the lock
    if FlatCollection::exists(&settings.path, &settings.collection) {
        return open(settings, embedder);
    }

    let started = Instant::now();
    let chunks = chunks_provider().await?;
    if chunks.is_empty() {
        return Err(AssistError::NoDocuments);
    }

    info!(chunk_count = chunks.len(), "embedding chunks");
    let embeddings = embed_all(&chunks, embedder).await?;
    let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();

    let manifest = IndexManifest {
        collection: settings.collection.clone(),
        embedding_model: embedder.model().to_string(),
        dimensions,
        chunk_size: settings.chunking.chunk_size,
        chunk_overlap: settings.chunking.chunk_overlap,
        corpus_fingerprint: settings.corpus_fingerprint.clone(),
        record_count: chunks.len(),
        built_at: Utc::now(),
    };

    let records = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| ChunkRecord { chunk, embedding })
        .collect();

    let collection = FlatCollection::create(&settings.path, manifest, records)?;
    info!(
        chunk_count = collection.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "index built"
    );

    Ok(Index { collection })
}

fn open(settings: &IndexSettings, embedder: &dyn Embedder) -> Result<Index, AssistError> {
    let collection = FlatCollection::open(&settings.path, &settings.collection)?;
    let manifest = collection.manifest();

    if manifest.embedding_model != embedder.model() {
        return Err(AssistError::Configuration(format!(
            "index {} was built with embedding model {} but {} is configured",
            settings.collection,
            manifest.embedding_model,
            embedder.model()
        )));
    }

    if manifest.chunk_size != settings.chunking.chunk_size
        || manifest.chunk_overlap != settings.chunking.chunk_overlap
    {
        warn!(
            built_size = manifest.chunk_size,
            built_overlap = manifest.chunk_overlap,
            configured_size = settings.chunking.chunk_size,
            configured_overlap = settings.chunking.chunk_overlap,
            "index was built with different chunk parameters; delete it to rebuild"
        );
    }

    if manifest.corpus_fingerprint != settings.corpus_fingerprint {
        warn!(
            path = %settings.path.display(),
            "corpus changed since the index was built; delete it to rebuild"
        );
    }

    info!(
        collection = %manifest.collection,
        chunk_count = collection.len(),
        built_at = %manifest.built_at.to_rfc3339(),
        "opened existing index"
    );

    Ok(Index { collection })
}

async fn embed_all(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut embeddings = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts = batch.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        embeddings.extend(vectors);
    }

    let expected = embeddings.first().map(Vec::len).unwrap_or_default();
    if expected == 0 {
        return Err(EmbeddingError::Api("embedder returned empty vectors".to_string()));
    }
    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != expected) {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }

    Ok(embeddings)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::DocumentSource;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Character n-gram embedder that counts texts embedded and can be made to fail.
    #[derive(Default)]
    pub(crate) struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        pub(crate) calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model(&self) -> &str {
            self.inner.model()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Api("connection refused".to_string()));
            }
            Ok(self.inner.embed_sync(text))
        }
    }

    pub(crate) fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            id: format!("chunk-{index}"),
            source: DocumentSource::Web {
                url: "https://example.com".to_string(),
            },
            title: "Example".to_string(),
            chunk_index: index,
            start_char: 0,
            text: text.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub(crate) fn sample_chunks() -> Vec<Chunk> {
        vec![
            chunk(0, "Nutanix hyperconverged infrastructure combines compute and storage."),
            chunk(1, "Dell thin clients connect users to virtual desktops."),
            chunk(2, "EUC Score measures the user experience of remote sessions."),
        ]
    }

    pub(crate) fn settings(path: &Path) -> IndexSettings {
        IndexSettings {
            path: path.join("index"),
            collection: "mixed_docs".to_string(),
            chunking: ChunkingConfig::default(),
            corpus_fingerprint: "corpus-v1".to_string(),
        }
    }

    #[tokio::test]
    async fn second_build_opens_without_embedding() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        let embedder = CountingEmbedder::default();

        let first = build_or_open(&settings, || async { Ok(sample_chunks()) }, &embedder).await?;
        assert_eq!(first.len(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        let provider_calls = AtomicUsize::new(0);
        let counter = &provider_calls;
        let second = build_or_open(
            &settings,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(sample_chunks())
            },
            &embedder,
        )
        .await?;

        assert_eq!(second.len(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(provider_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.manifest().embedding_model, embedder.model());
        Ok(())
    }

    #[tokio::test]
    async fn empty_corpus_fails_and_persists_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        let embedder = CountingEmbedder::default();

        let result = build_or_open(&settings, || async { Ok(Vec::new()) }, &embedder).await;

        assert!(matches!(result, Err(AssistError::NoDocuments)));
        assert!(!FlatCollection::exists(&settings.path, &settings.collection));
        assert!(!settings.path.join("mixed_docs.lock").exists());
        Ok(())
    }

    #[tokio::test]
    async fn provider_error_is_propagated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::default();

        let result = build_or_open(
            &settings(dir.path()),
            || async { Err(AssistError::NoDocuments) },
            &embedder,
        )
        .await;

        assert!(matches!(result, Err(AssistError::NoDocuments)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_leaves_no_partial_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        let embedder = CountingEmbedder::failing();

        let result = build_or_open(&settings, || async { Ok(sample_chunks()) }, &embedder).await;

        assert!(matches!(result, Err(AssistError::Embedding(_))));
        assert!(!FlatCollection::exists(&settings.path, &settings.collection));
        assert!(!settings.path.join("mixed_docs.lock").exists());
        Ok(())
    }

    #[tokio::test]
    async fn reopening_with_another_embedding_model_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        build_or_open(&settings, || async { Ok(sample_chunks()) }, &CountingEmbedder::default())
            .await?;

        let other = CharacterNgramEmbedder::new(64);
        let result = build_or_open(&settings, || async { Ok(sample_chunks()) }, &other).await;
        assert!(matches!(result, Err(AssistError::Configuration(_))));
        Ok(())
    }

    #[tokio::test]
    async fn stale_corpus_still_opens() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut settings = settings(dir.path());
        let embedder = CountingEmbedder::default();
        build_or_open(&settings, || async { Ok(sample_chunks()) }, &embedder).await?;

        settings.corpus_fingerprint = "corpus-v2".to_string();
        let index = build_or_open(&settings, || async { Ok(Vec::new()) }, &embedder).await?;
        assert_eq!(index.manifest().corpus_fingerprint, "corpus-v1");
        assert_eq!(index.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn held_lock_refuses_a_concurrent_build() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        let _held = BuildLock::acquire(&settings.path, &settings.collection)?;

        let result = build_or_open(
            &settings,
            || async { Ok(sample_chunks()) },
            &CountingEmbedder::default(),
        )
        .await;

        assert!(matches!(result, Err(AssistError::Store(StoreError::Locked { .. }))));
        Ok(())
    }

    #[tokio::test]
    async fn build_recovers_from_a_lock_left_by_a_killed_build() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let settings = settings(dir.path());
        std::fs::create_dir_all(&settings.path)?;
        std::fs::write(settings.path.join("mixed_docs.lock"), "4294967000\n")?;

        let index = build_or_open(
            &settings,
            || async { Ok(sample_chunks()) },
            &CountingEmbedder::default(),
        )
        .await?;

        assert_eq!(index.len(), 3);
        assert!(!settings.path.join("mixed_docs.lock").exists());
        Ok(())
    }
}
