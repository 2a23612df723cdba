//! Sled-backed vector store with in-process cosine ranking. The collection
//! holds one run's worth of chunks; the pipeline replaces it wholesale on
//! every run.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use retain_core::types::KnowledgeChunk;
use retain_core::Indexer;

/// Text-to-vector seam. The production embedder calls the Gemini embedding
/// endpoint; tests use the deterministic hashing embedder below.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
impl Embedder for retain_engines::EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        retain_engines::EmbeddingClient::embed(self, text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        retain_engines::EmbeddingClient::embed_batch(self, texts).await
    }
}

/// Deterministic offline embedder: hashed bag of words over a fixed
/// dimension. Not semantically meaningful, but stable and cosine-rankable,
/// which is all the tests need.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % self.dims as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// A search hit with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Black-box store surface the query engine and the HTTP layer work
/// against: add, ranked search, full purge, count, and enumeration.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, chunks: &[KnowledgeChunk]) -> Result<usize>;
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
    async fn delete_all(&self) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn get_all(&self) -> Result<Vec<KnowledgeChunk>>;
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    chunk: KnowledgeChunk,
    embedding: Vec<f32>,
}

pub struct SledVectorStore {
    tree: sled::Tree,
    embedder: Arc<dyn Embedder>,
    pub collection_name: String,
}

impl SledVectorStore {
    pub fn open(
        path: &std::path::Path,
        collection_name: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("failed to open vector store at {}", path.display()))?;
        let tree = db.open_tree(collection_name)?;
        Ok(Self {
            tree,
            embedder,
            collection_name: collection_name.to_string(),
        })
    }

    fn decode(bytes: &[u8]) -> Result<StoredRecord> {
        serde_json::from_slice(bytes).context("corrupt vector store record")
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for SledVectorStore {
    async fn add(&self, chunks: &[KnowledgeChunk]) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let record = StoredRecord {
                chunk: chunk.clone(),
                embedding,
            };
            self.tree
                .insert(chunk.id.as_bytes(), serde_json::to_vec(&record)?)?;
        }
        self.tree.flush_async().await?;
        info!("Stored {} chunks in {}", chunks.len(), self.collection_name);
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut scored = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            let record = Self::decode(&bytes)?;
            let score = cosine_similarity(&query_embedding, &record.embedding);
            scored.push(ScoredChunk {
                chunk: record.chunk,
                score,
            });
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        debug!("Search returned {} of k={} requested chunks", scored.len(), k);
        Ok(scored)
    }

    async fn delete_all(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush_async().await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.tree.len())
    }

    async fn get_all(&self) -> Result<Vec<KnowledgeChunk>> {
        let mut chunks = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            chunks.push(Self::decode(&bytes)?.chunk);
        }
        Ok(chunks)
    }
}

/// The pipeline's indexing seam: purge then insert, full-replace semantics.
/// The two steps are not transactional; a crash in between leaves the index
/// empty, an accepted risk for content regenerated wholesale each run.
#[async_trait]
impl Indexer for SledVectorStore {
    async fn replace_all(&self, chunks: &[KnowledgeChunk]) -> Result<usize> {
        let existing = VectorStore::count(self).await?;
        if existing > 0 {
            info!("Purging {} existing chunks before insert", existing);
            self.delete_all().await?;
        }
        self.add(chunks).await
    }

    async fn count(&self) -> Result<usize> {
        VectorStore::count(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retain_core::types::{ChunkMetadata, SectionType};

    fn chunk(id: &str, client: &str, content: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ChunkMetadata {
                client_name: Some(client.to_string()),
                section_type: SectionType::Overview,
                description: String::new(),
                source: "test".to_string(),
                generated_at: String::new(),
            },
        }
    }

    fn open_store(dir: &std::path::Path) -> SledVectorStore {
        SledVectorStore::open(dir, "test_collection", Arc::new(HashEmbedder::default())).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_search_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .add(&[
                chunk("a", "Development", "timesheets usage is healthy and growing this quarter"),
                chunk("b", "UB Civil", "claims export bug reported with high priority"),
            ])
            .await
            .unwrap();

        let hits = store
            .search("which client reported a claims bug", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "b");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_replace_all_purges_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .add(&[
                chunk("old_1", "A", "stale content one"),
                chunk("old_2", "B", "stale content two"),
                chunk("old_3", "C", "stale content three"),
            ])
            .await
            .unwrap();
        assert_eq!(VectorStore::count(&store).await.unwrap(), 3);

        let stored = store
            .replace_all(&[chunk("new_1", "A", "fresh content")])
            .await
            .unwrap();
        // Post-run count equals the new chunk count exactly, never old + new.
        assert_eq!(stored, 1);
        assert_eq!(VectorStore::count(&store).await.unwrap(), 1);
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "new_1");
    }

    #[tokio::test]
    async fn test_search_empty_store_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.search("anything", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_cosine_similarity_zero_norm_guard() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }
}
