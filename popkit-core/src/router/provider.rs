//! Thin client for the remote embedding provider.
//!
//! Wire format per the external-interface contract: request
//! `{model, input: [string, ...], input_type: "document" | "query"}`,
//! response `{data: [{embedding: [f32; 1024]}], model, usage}`. Any network
//! error or missing credentials is a fallback signal, not a retry signal —
//! the caller is expected to fall back to keyword matching and move on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MODEL: &str = "voyage-3.5";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no embedding provider API key configured")]
    MissingCredentials,
    #[error("embedding provider request failed: {0}")]
    Network(String),
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

pub struct EmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EmbeddingProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(text, "query").await
    }

    async fn embed(&self, text: &str, input_type: &str) -> Result<Vec<f32>, ProviderError> {
        let body = EmbedRequest { model: MODEL, input: vec![text], input_type };
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Network(format!("status {}", response.status())));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Network("empty response".to_string()))
    }
}
