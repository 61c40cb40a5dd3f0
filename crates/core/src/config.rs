use crate::chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::AssistError;
use crate::retriever::DEFAULT_TOP_K;
use crate::web::DEFAULT_USER_AGENT;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URLS: [&str; 3] = [
    "https://www.dell.com/en-us/lp/dt/end-user-computing",
    "https://www.nutanix.com/solutions/end-user-computing",
    "https://eucscore.com/docs/tools.html",
];

/// Load `.env` (silently ignored if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_url: String,
    pub llm_model: String,
    pub llm_temperature: Option<f32>,
    pub llm_top_p: Option<f32>,
    pub llm_timeout: Duration,
    pub embedding_model: String,
    /// `None` when `CORPUS_DIR` is set to an empty value.
    pub corpus_dir: Option<PathBuf>,
    pub urls: Vec<String>,
    pub index_path: PathBuf,
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub user_agent: String,
}

impl Settings {
    /// Reads the process environment (call [`load_dotenv`] first).
    pub fn from_env() -> Result<Self, AssistError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AssistError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|value| value.trim().to_string());
        let or = |key: &str, default: &str| {
            get(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let ollama_url = or("OLLAMA_API_BASE", "http://localhost:11434");
        parse_url("OLLAMA_API_BASE", &ollama_url)?;

        let urls = match get("CORPUS_URLS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => DEFAULT_URLS.iter().map(|url| url.to_string()).collect(),
        };
        for url in &urls {
            parse_url("CORPUS_URLS", url)?;
        }

        let corpus_dir = match get("CORPUS_DIR") {
            Some(dir) if dir.is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from("./data")),
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_or(&get, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
        };
        chunking.validate()?;

        let top_k = parse_or(&get, "TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(AssistError::Configuration("TOP_K must be at least 1".to_string()));
        }

        let llm_temperature = match get("LLM_TEMPERATURE").filter(|value| !value.is_empty()) {
            Some(raw) => Some(parse_value::<f32>("LLM_TEMPERATURE", &raw)?),
            None => None,
        };

        let llm_top_p = match get("LLM_TOP_P").filter(|value| !value.is_empty()) {
            Some(raw) => {
                let top_p = parse_value::<f32>("LLM_TOP_P", &raw)?;
                if !(top_p > 0.0 && top_p <= 1.0) {
                    return Err(AssistError::Configuration(format!(
                        "LLM_TOP_P={raw} must be in (0, 1]"
                    )));
                }
                Some(top_p)
            }
            None => None,
        };

        Ok(Self {
            ollama_url,
            llm_model: or("LLM_MODEL", "llama3.2"),
            llm_temperature,
            llm_top_p,
            llm_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 120u64)?),
            embedding_model: or("EMBEDDING_MODEL", "mxbai-embed-large"),
            corpus_dir,
            urls,
            index_path: PathBuf::from(or("INDEX_PATH", "index_db")),
            collection: or("COLLECTION_NAME", "mixed_docs"),
            chunking,
            top_k,
            bind_addr: or("BIND_ADDR", "0.0.0.0:8000"),
            static_dir: PathBuf::from(or("STATIC_DIR", "static")),
            user_agent: or("USER_AGENT", DEFAULT_USER_AGENT),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AssistError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key).filter(|value| !value.is_empty()) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, AssistError> {
    raw.parse()
        .map_err(|_| AssistError::Configuration(format!("{key}={raw} is not a valid value")))
}

fn parse_url(key: &str, raw: &str) -> Result<Url, AssistError> {
    Url::parse(raw).map_err(|error| AssistError::Configuration(format!("{key}: {raw}: {error}")))
}
