//! Retrieval side of the pipeline: the sled-backed vector store with cosine
//! ranking, the keyword query router, RAG answer generation, and the HTTP
//! surface.

pub mod query;
pub mod server;
pub mod store;

pub use query::{classify, client_question, QueryEngine, QueryOutcome, QueryType};
pub use server::{build_router, serve, AppState};
pub use store::{Embedder, HashEmbedder, ScoredChunk, SledVectorStore, VectorStore};
