use crate::chunking::RecursiveChunker;
use crate::config::Settings;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::error::AssistError;
use crate::extractor::LopdfExtractor;
use crate::index::{build_or_open, Index, IndexSettings};
use crate::llm::{LanguageModel, OllamaModel, OllamaOptions};
use crate::loader::{corpus_fingerprint, CorpusLoader};
use crate::retriever::Retriever;
use crate::synthesizer::{AnswerSynthesizer, PromptTemplate};
use crate::web::HttpFetcher;
use std::sync::Arc;
use tracing::info;

/// Everything a request needs, built once at startup and shared read-only.
pub struct Assistant {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl Assistant {
    pub fn new(retriever: Retriever, synthesizer: AnswerSynthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    /// Wires the Ollama-backed collaborators and builds or opens the index.
    pub async fn from_settings(settings: &Settings) -> Result<Self, AssistError> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(
            settings.ollama_url.as_str(),
            settings.embedding_model.as_str(),
        ));
        let model: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(
            settings.ollama_url.as_str(),
            settings.llm_model.as_str(),
            OllamaOptions {
                temperature: settings.llm_temperature,
                top_p: settings.llm_top_p,
                timeout: settings.llm_timeout,
            },
        )?);

        let index = open_index(settings, embedder.as_ref()).await?;
        let retriever = Retriever::new(Arc::new(index), embedder, settings.top_k)?;
        let synthesizer = AnswerSynthesizer::new(model, PromptTemplate::default());

        Ok(Self::new(retriever, synthesizer))
    }

    pub fn index(&self) -> &Index {
        self.retriever.index()
    }

    /// Retrieves context for `question` and synthesizes an answer. Blank
    /// questions are rejected before any collaborator is called.
    pub async fn ask(&self, question: &str) -> Result<String, AssistError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistError::EmptyQuestion);
        }

        let chunks = self.retriever.retrieve(question).await?;
        self.synthesizer.answer(question, &chunks).await
    }
}

/// Builds the index from the configured corpus, or opens it if it exists.
pub async fn open_index(settings: &Settings, embedder: &dyn Embedder) -> Result<Index, AssistError> {
    let corpus_dir = settings.corpus_dir.as_deref();
    let index_settings = IndexSettings {
        path: settings.index_path.clone(),
        collection: settings.collection.clone(),
        chunking: settings.chunking,
        corpus_fingerprint: corpus_fingerprint(corpus_dir, &settings.urls),
    };

    let chunks_provider = || async {
        let fetcher = HttpFetcher::new(&settings.user_agent)
            .map_err(|error| AssistError::Configuration(error.to_string()))?;
        let loader = CorpusLoader::new(LopdfExtractor, fetcher);
        let report = loader.load(corpus_dir, &settings.urls).await?;
        info!(
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            "corpus loaded"
        );

        let chunker = RecursiveChunker::new(settings.chunking)?;
        Ok::<_, AssistError>(chunker.split_documents(&report.documents))
    };

    build_or_open(&index_settings, chunks_provider, embedder).await
}
