use crate::chunking::normalize_whitespace;
use crate::error::AssistError;
use crate::llm::LanguageModel;
use crate::models::Chunk;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub const DEFAULT_TEMPLATE: &str = r#"You are an expert IT infrastructure assistant. Answer the question using only the key information from the provided documents.
DO NOT mention document sources, metadata, or IDs in your response.
DO NOT include any references like (Source:...) or [doc1].
If you don't know the answer, say "I don't know".

Question: {question}

Relevant information: {documents}

Answer:"#;

/// Prompt text with `{question}` and `{documents}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, AssistError> {
        let template = template.into();
        for placeholder in ["{question}", "{documents}"] {
            if !template.contains(placeholder) {
                return Err(AssistError::Configuration(format!(
                    "prompt template is missing {placeholder}"
                )));
            }
        }
        Ok(Self { template })
    }

    /// Substitutes in one pass, so placeholder text inside the values stays literal.
    pub fn render(&self, question: &str, documents: &str) -> String {
        let mut rendered = String::with_capacity(self.template.len() + question.len() + documents.len());
        let mut rest = self.template.as_str();

        while let Some(position) = rest.find('{') {
            rendered.push_str(&rest[..position]);
            let tail = &rest[position..];
            if let Some(after) = tail.strip_prefix("{question}") {
                rendered.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{documents}") {
                rendered.push_str(documents);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, template: PromptTemplate) -> Self {
        Self { model, template }
    }

    /// One model call, no retry. Only chunk texts reach the prompt.
    pub async fn answer(&self, question: &str, chunks: &[Chunk]) -> Result<String, AssistError> {
        let documents = chunks
            .iter()
            .map(|chunk| chunk.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.template.render(question, &documents);
        debug!(prompt_chars = prompt.len(), chunk_count = chunks.len(), "synthesizing answer");

        let raw = self.model.complete(&prompt).await?;
        Ok(clean_response(&raw))
    }
}

/// Removes echoed bookkeeping from a model response: `Document(...)`
/// wrappers are reduced to their page content, `id=`, `metadata={...}` and
/// `page_content=` fields are dropped, as are `(Source: ...)` and `[docN]`
/// citations. Whitespace runs collapse to single spaces.
pub fn clean_response(text: &str) -> String {
    let text = unwrap_documents(text);
    let text = strip_metadata(&text);
    let text = strip_page_content_keys(&text);

    let patterns = citation_patterns();
    let text = patterns.id_field.replace_all(&text, " ");
    let text = patterns.source.replace_all(&text, " ");
    let text = patterns.doc_marker.replace_all(&text, " ");

    normalize_whitespace(&text)
}

struct CitationPatterns {
    document_field: Regex,
    id_field: Regex,
    source: Regex,
    doc_marker: Regex,
}

fn citation_patterns() -> &'static CitationPatterns {
    static PATTERNS: OnceLock<CitationPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CitationPatterns {
        document_field: Regex::new(r"(?:^|[\s,])(?:page_content|metadata|id)=").expect("static regex"),
        id_field: Regex::new(r#"\bid=(?:'[^']*'|"[^"]*"|[^\s,)]*),?"#).expect("static regex"),
        source: Regex::new(r"(?i)\(\s*sources?\s*:[^)\n]*\)").expect("static regex"),
        doc_marker: Regex::new(r"(?i)\[\s*doc[^\]]*\]").expect("static regex"),
    })
}

fn unwrap_documents(text: &str) -> String {
    const OPENER: &str = "Document(";
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(position) = rest.find(OPENER) {
        let open = position + OPENER.len() - 1;
        let record = balanced_end(rest, open)
            .map(|end| (end, &rest[open + 1..end - 1]))
            .filter(|(_, fields)| is_document_record(fields));

        match record {
            Some((end, fields)) => {
                cleaned.push_str(&rest[..position]);
                if let Some(content) = field_string(fields, "page_content=") {
                    cleaned.push(' ');
                    cleaned.push_str(&content);
                    cleaned.push(' ');
                }
                rest = &rest[end..];
            }
            None => {
                cleaned.push_str(&rest[..open + 1]);
                rest = &rest[open + 1..];
            }
        }
    }

    cleaned.push_str(rest);
    cleaned
}

/// Only parentheses holding document fields count as an echoed record;
/// prose such as "the Document(s) below" is left alone.
fn is_document_record(fields: &str) -> bool {
    citation_patterns().document_field.is_match(fields)
}

fn strip_metadata(text: &str) -> String {
    const KEY: &str = "metadata=";
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(position) = rest.find(KEY) {
        cleaned.push_str(&rest[..position]);
        let value = position + KEY.len();

        rest = if rest[value..].starts_with('{') {
            match balanced_end(rest, value) {
                Some(end) => &rest[end..],
                None => skip_unclosed_fields(&rest[value + 1..]),
            }
        } else {
            &rest[value..]
        };
        rest = rest.strip_prefix(',').unwrap_or(rest);
        cleaned.push(' ');
    }

    cleaned.push_str(rest);
    cleaned
}

/// Skips the quoted keys and values that open an unclosed `{...}` and stops at
/// the first bare word, so the text after a truncated map survives.
fn skip_unclosed_fields(text: &str) -> &str {
    let mut rest = text;

    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix(&[':', ','][..]) {
            rest = after;
        } else if let Some((_, consumed)) = quoted_value(trimmed) {
            rest = &trimmed[consumed..];
        } else {
            return rest;
        }
    }
}

fn strip_page_content_keys(text: &str) -> String {
    const KEY: &str = "page_content=";
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(position) = rest.find(KEY) {
        cleaned.push_str(&rest[..position]);
        let value = &rest[position + KEY.len()..];

        match quoted_value(value) {
            Some((content, consumed)) => {
                cleaned.push_str(&content);
                rest = &value[consumed..];
            }
            None => rest = value,
        }
    }

    cleaned.push_str(rest);
    cleaned
}

fn field_string(fields: &str, key: &str) -> Option<String> {
    let position = fields.find(key)?;
    quoted_value(&fields[position + key.len()..]).map(|(content, _)| content)
}

/// Parses a leading `'...'` or `"..."` literal. Returns its unescaped content
/// and the number of bytes consumed.
fn quoted_value(text: &str) -> Option<(String, usize)> {
    let quote = text.chars().next().filter(|ch| *ch == '\'' || *ch == '"')?;
    let mut content = String::new();
    let mut escaped = false;

    for (offset, ch) in text.char_indices().skip(1) {
        if escaped {
            content.push(match ch {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote && !is_apostrophe(text, offset) {
            return Some((content, offset + ch.len_utf8()));
        } else {
            content.push(ch);
        }
    }

    None
}

/// Byte index just past the bracket that closes the one at `open`, skipping
/// brackets inside quoted literals.
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if let Some(active) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == active && !is_apostrophe(text, open + offset) {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' if is_apostrophe(text, open + offset) => {}
            '\'' | '"' => quote = Some(ch),
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// A `'` between a letter or digit and a letter, as in "Dell's", is part of
/// the word and never opens or closes a literal.
fn is_apostrophe(text: &str, position: usize) -> bool {
    if !text[position..].starts_with('\'') {
        return false;
    }
    let before = text[..position].chars().next_back();
    let after = text[position + 1..].chars().next();
    before.is_some_and(char::is_alphanumeric) && after.is_some_and(char::is_alphabetic)
}
