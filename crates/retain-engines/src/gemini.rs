use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};

use crate::{Oracle, OracleResponse};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini oracle over the generateContent REST endpoint.
pub struct GeminiOracle {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiOracle {
    /// `timeout` bounds the whole round-trip; `None` lets a hung call block
    /// its branch indefinitely.
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

    async fn send_request(&self, system: &str, prompt: &str, temperature: f64) -> Result<Value> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        let request_body = json!({
            "systemInstruction": {
                "parts": [{ "text": system }]
            },
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": temperature,
            }
        });

        debug!("Gemini request to model {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            debug!("Error response body: {}", error_text);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let response_body: Value = response.json().await?;
        Ok(response_body)
    }
}

/// Pull the generated text and usage metadata out of a generateContent body.
pub fn parse_generate_response(response: &Value, model: &str) -> Result<OracleResponse> {
    let content = response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| anyhow!("Failed to extract generated text from Gemini response"))?
        .to_string();

    let finish_reason = response["candidates"][0]["finishReason"]
        .as_str()
        .map(String::from);

    Ok(OracleResponse {
        content,
        model: model.to_string(),
        prompt_tokens: response["usageMetadata"]["promptTokenCount"]
            .as_u64()
            .unwrap_or(0),
        completion_tokens: response["usageMetadata"]["candidatesTokenCount"]
            .as_u64()
            .unwrap_or(0),
        finish_reason,
    })
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<OracleResponse> {
        let response = self.send_request(system, prompt, temperature).await?;
        parse_generate_response(&response, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_response() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[]" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 120,
                "candidatesTokenCount": 4,
                "totalTokenCount": 124
            }
        });
        let parsed = parse_generate_response(&body, "gemini-2.5-flash").unwrap();
        assert_eq!(parsed.content, "[]");
        assert_eq!(parsed.prompt_tokens, 120);
        assert_eq!(parsed.completion_tokens, 4);
        assert_eq!(parsed.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_rejects_empty_candidates() {
        let body = json!({ "candidates": [] });
        assert!(parse_generate_response(&body, "m").is_err());
    }
}
