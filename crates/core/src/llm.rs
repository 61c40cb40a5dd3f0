use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single prompt in, full completion out. No streaming.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Clone)]
pub struct OllamaOptions {
    pub temperature: Option<f32>,
    /// Nucleus sampling cut-off; the model default when unset.
    pub top_p: Option<f32>,
    pub timeout: Duration,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            top_p: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Language model served by Ollama's `/api/generate` endpoint.
pub struct OllamaModel {
    client: Client,
    url: String,
    model: String,
    options: Option<GenerateOptions>,
}

impl OllamaModel {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        options: OllamaOptions,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options: GenerateOptions::from_options(&options),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl GenerateOptions {
    fn from_options(options: &OllamaOptions) -> Option<Self> {
        if options.temperature.is_none() && options.top_p.is_none() {
            return None;
        }
        Some(Self {
            temperature: options.temperature,
            top_p: options.top_p,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.url);
        debug!(%url, model = %self.model, "ollama generate request");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: self.options,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|error| ModelError::Parse(error.to_string()))?;

        parsed
            .response
            .ok_or_else(|| ModelError::Parse("missing response field".to_string()))
    }
}
