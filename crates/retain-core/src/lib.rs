pub mod config;
pub mod error;
pub mod loader;
pub mod types;

pub use error::{RetainError, RetainResult};

use async_trait::async_trait;

use crate::types::KnowledgeChunk;

/// Seam to the vector index used by the chunking branch.
///
/// The index holds one run's worth of chunks at a time: `replace_all` purges
/// the previous run's collection before inserting the new set. The concrete
/// store lives in `retain-rag`; the pipeline only needs this narrow surface.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Purge the existing collection, then insert `chunks`. Returns the
    /// number of chunks stored.
    async fn replace_all(&self, chunks: &[KnowledgeChunk]) -> anyhow::Result<usize>;

    async fn count(&self) -> anyhow::Result<usize>;
}

/// Canonical client roster spellings. Ticket data and oracle output both
/// misspell client names; attribution and risky-client matching go through
/// this table rather than fuzzy matching so every unification is auditable.
const CLIENT_ALIASES: &[(&str, &str)] = &[("contruction kat", "Construction KaT")];

/// Resolve a client name to its canonical spelling. Unknown names pass
/// through trimmed but otherwise untouched.
pub fn canonical_client_name(name: &str) -> String {
    let trimmed = name.trim();
    let lowered = trimmed.to_lowercase();
    for (alias, canonical) in CLIENT_ALIASES {
        if lowered == *alias {
            return (*canonical).to_string();
        }
    }
    trimmed.to_string()
}

/// Case-insensitive equality after alias resolution.
pub fn same_client(a: &str, b: &str) -> bool {
    canonical_client_name(a).to_lowercase() == canonical_client_name(b).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(canonical_client_name("Contruction KaT"), "Construction KaT");
        assert_eq!(canonical_client_name("  UB Civil "), "UB Civil");
        assert_eq!(canonical_client_name("Development"), "Development");
    }

    #[test]
    fn test_same_client_across_spellings() {
        assert!(same_client("contruction kat", "Construction KaT"));
        assert!(same_client("UB CIVIL", "ub civil"));
        assert!(!same_client("Development", "UB Civil"));
    }
}
