use async_trait::async_trait;
use infra_assist_core::{
    build_or_open, AnswerSynthesizer, Assistant, CharacterNgramEmbedder, Chunk, ChunkingConfig,
    DocumentSource, IndexSettings, LanguageModel, ModelError, PromptTemplate, Retriever,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Returns a fixed completion (or a 503) and records every prompt.
pub struct CannedModel {
    reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl CannedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or(ModelError::Api {
            status: 503,
            body: "model is loading".to_string(),
        })
    }
}

fn chunk(index: u64, url: &str, text: &str) -> Chunk {
    Chunk {
        id: format!("{url}#{index}"),
        source: DocumentSource::Web {
            url: url.to_string(),
        },
        title: url.to_string(),
        chunk_index: index,
        start_char: 0,
        text: text.to_string(),
        metadata: BTreeMap::new(),
    }
}

/// An assistant over a three-chunk index in a temporary directory.
pub async fn assistant(model: CannedModel) -> (Arc<Assistant>, Arc<CannedModel>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(CharacterNgramEmbedder::default());
    let settings = IndexSettings {
        path: dir.path().join("index"),
        collection: "mixed_docs".to_string(),
        chunking: ChunkingConfig::default(),
        corpus_fingerprint: "test".to_string(),
    };

    let chunks = vec![
        chunk(0, "https://www.nutanix.com", "Nutanix runs hyperconverged compute and storage."),
        chunk(0, "https://www.dell.com", "Dell thin clients connect users to virtual desktops."),
        chunk(0, "https://eucscore.com", "EUC Score benchmarks remote session experience."),
    ];
    let index = build_or_open(&settings, move || async move { Ok(chunks) }, embedder.as_ref())
        .await
        .unwrap();

    let model = Arc::new(model);
    let retriever = Retriever::new(Arc::new(index), embedder, 2).unwrap();
    let synthesizer = AnswerSynthesizer::new(model.clone(), PromptTemplate::default());

    (Arc::new(Assistant::new(retriever, synthesizer)), model, dir)
}
