pub mod embeddings;
pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;

pub use embeddings::EmbeddingClient;
pub use gemini::GeminiOracle;

/// A completed oracle round-trip.
#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub finish_reason: Option<String>,
}

/// The external reasoning model, treated as a black box returning free text.
///
/// Transport and auth failures come back as errors and must not be masked;
/// whatever the oracle says on success is the caller's problem to parse.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str, temperature: f64)
        -> Result<OracleResponse>;
}
