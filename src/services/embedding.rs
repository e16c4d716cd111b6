//! Embedding client for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::RemoteCallError;
use crate::models::ApiConfig;

/// Turns a batch of texts into one vector per text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], model: &str)
    -> Result<Vec<Vec<f32>>, RemoteCallError>;
}

/// Request body for the /embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

/// Response from the /embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for the embeddings endpoint. Performs exactly one request per call.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
}

impl EmbeddingClient {
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteCallError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.embedding_timeout_secs))
            .default_headers(auth_headers(&config.api_key)?)
            .build()
            .map_err(|e| RemoteCallError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
        })
    }

}

fn auth_headers(api_key: &str) -> Result<HeaderMap, RemoteCallError> {
    let mut headers = HeaderMap::new();
    let api_key = api_key.trim();
    if !api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| RemoteCallError::ConnectionError(format!("invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, RemoteCallError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            input: texts,
            model,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteCallError::Timeout
                } else {
                    RemoteCallError::ConnectionError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteCallError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RemoteCallError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(RemoteCallError::LengthMismatch {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }

        let embeddings = order_by_index(parsed.data)?;

        if let Some(position) = embeddings.iter().position(Vec::is_empty) {
            return Err(RemoteCallError::InvalidResponse(format!(
                "empty embedding at position {}",
                position
            )));
        }

        Ok(embeddings)
    }
}

/// Place each vector at its reported `index`. Items without any index keep
/// their response order; otherwise every index in `0..n` must appear once.
fn order_by_index(items: Vec<EmbeddingItem>) -> Result<Vec<Vec<f32>>, RemoteCallError> {
    if items.iter().all(|item| item.index.is_none()) {
        return Ok(items.into_iter().map(|item| item.embedding).collect());
    }

    let count = items.len();
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; count];
    for item in items {
        let index = item.index.ok_or_else(|| {
            RemoteCallError::InvalidResponse("embedding item is missing its index".to_string())
        })?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            RemoteCallError::InvalidResponse(format!(
                "embedding index {} out of range for {} inputs",
                index, count
            ))
        })?;
        if slot.is_some() {
            return Err(RemoteCallError::InvalidResponse(format!(
                "duplicate embedding index {}",
                index
            )));
        }
        *slot = Some(item.embedding);
    }

    // Every slot is filled: `count` distinct indices below `count`.
    Ok(slots.into_iter().flatten().collect())
}
