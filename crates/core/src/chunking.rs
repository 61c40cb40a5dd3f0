use crate::error::AssistError;
use crate::models::{Chunk, Document};
use sha2::{Digest, Sha256};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), AssistError> {
        if self.chunk_size == 0 {
            return Err(AssistError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AssistError::Configuration(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A piece of a source text, positioned by character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start_char: usize,
    pub text: String,
}

/// Boundaries a chunk may end on, most preferred first.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

impl Boundary {
    /// Whether a chunk ending right before `chars[end]` ends on this boundary.
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        let last = chars[end - 1];
        match self {
            Boundary::Paragraph => end >= 2 && last == '\n' && chars[end - 2] == '\n',
            Boundary::Line => last == '\n',
            Boundary::Sentence => {
                end >= 2 && last == ' ' && matches!(chars[end - 2], '.' | '!' | '?')
            }
            Boundary::Word => last.is_whitespace(),
        }
    }
}

/// Splits text into overlapping windows, cutting at the coarsest natural
/// boundary available before falling back to a hard character cut.
///
/// Every chunk after the first starts exactly `chunk_overlap` characters
/// before the end of its predecessor.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkingConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, AssistError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<TextSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= size {
                spans.push(span(&chars, start, chars.len()));
                break;
            }

            let end = self.window_end(&chars, start);
            spans.push(span(&chars, start, end));
            start = end - overlap;
        }

        spans
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let source = document.source.to_string();
            for (index, piece) in self.split_text(&document.text).into_iter().enumerate() {
                let chunk_index = index as u64;
                chunks.push(Chunk {
                    id: make_chunk_id(&source, chunk_index, &piece.text),
                    source: document.source.clone(),
                    title: document.title.clone(),
                    chunk_index,
                    start_char: piece.start_char,
                    text: piece.text,
                    metadata: document.metadata.clone(),
                });
            }
        }

        chunks
    }

    fn window_end(&self, chars: &[char], start: usize) -> usize {
        let hard_end = start + self.config.chunk_size;
        // the next window starts at `end - overlap`, so `end` must stay past it
        let min_end = start + (self.config.chunk_overlap + 1).max(self.config.chunk_size / 2);

        for boundary in BOUNDARIES {
            if let Some(end) = (min_end..=hard_end)
                .rev()
                .find(|&end| boundary.ends_at(chars, end))
            {
                return end;
            }
        }

        hard_end
    }
}

fn span(chars: &[char], start: usize, end: usize) -> TextSpan {
    TextSpan {
        start_char: start,
        text: chars[start..end].iter().collect(),
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn make_chunk_id(source: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
