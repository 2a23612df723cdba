use std::time::Duration;

use anyhow::{anyhow, Result};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    content: ContentParts<'a>,
}

#[derive(Serialize)]
struct ContentParts<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<BatchEmbedItem<'a>>,
}

#[derive(Serialize)]
struct BatchEmbedItem<'a> {
    model: String,
    content: ContentParts<'a>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini text-embedding client. One instance per process, shared by handle.
pub struct EmbeddingClient {
    client: Client,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(api_key: &str, model: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/{}:embedContent?key={}",
            API_BASE, self.model, self.api_key
        );
        let request_body = EmbedContentRequest {
            content: ContentParts {
                parts: vec![TextPart { text }],
            },
        };

        let response = self.client.post(&url).json(&request_body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("Embedding request failed with status {}", status));
        }

        let body: EmbedContentResponse = response.json().await?;
        Ok(body.embedding.values)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/{}:batchEmbedContents?key={}",
            API_BASE, self.model, self.api_key
        );
        let request_body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| BatchEmbedItem {
                    model: format!("models/{}", self.model),
                    content: ContentParts {
                        parts: vec![TextPart { text }],
                    },
                })
                .collect(),
        };

        debug!("Embedding batch of {} texts", texts.len());

        let response = self.client.post(&url).json(&request_body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!(
                "Batch embedding request failed with status {}",
                status
            ));
        }

        let body: BatchEmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Embedding count mismatch: asked for {}, got {}",
                texts.len(),
                body.embeddings.len()
            ));
        }
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }
}
