//! Query routing and RAG answer generation. The query type is heuristically
//! classified from keyword sets to pick how many chunks to retrieve; the
//! engine never errors, every failure path collapses to a structured answer.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use retain_agent::prompts;
use retain_core::config::Settings;
use retain_engines::Oracle;

use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    AllClients,
    ClientSpecific,
    Comparison,
    Bugs,
    Trends,
    Modules,
    Temporal,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::AllClients => "all_clients",
            QueryType::ClientSpecific => "client_specific",
            QueryType::Comparison => "comparison",
            QueryType::Bugs => "bugs",
            QueryType::Trends => "trends",
            QueryType::Modules => "modules",
            QueryType::Temporal => "temporal",
            QueryType::General => "general",
        }
    }
}

const ALL_CLIENTS_KEYWORDS: &[&str] = &[
    "list all",
    "all clients",
    "all the clients",
    "how many clients",
    "list clients",
    "show all",
    "tabular format",
    "table format",
    "every client",
    "total clients",
    "client list",
];

const CLIENT_SPECIFIC_KEYWORDS: &[&str] =
    &["tell me about", "what about", "how is", "details on", "info on"];

const COMPARISON_KEYWORDS: &[&str] = &[
    "which client",
    "who has",
    "compare",
    "highest",
    "lowest",
    "most",
    "least",
    "best",
    "worst",
];

const BUG_KEYWORDS: &[&str] = &["bug", "issue", "problem", "error", "ticket", "jira"];

const TREND_KEYWORDS: &[&str] = &[
    "trend",
    "declining",
    "increasing",
    "growing",
    "dropping",
    "over time",
    "pattern",
    "change",
];

const MODULE_KEYWORDS: &[&str] = &[
    "timesheet",
    "claims",
    "tasks",
    "purchase order",
    "module",
    "feature",
    "delivery",
    "site diary",
    "bills",
];

const TEMPORAL_KEYWORDS: &[&str] = &[
    "week", "month", "period", "date", "when", "november", "december", "january",
];

/// Canned question behind the client-info shortcut endpoint.
pub fn client_question(client_name: &str) -> String {
    format!("Tell me everything about {}", client_name)
}

fn matches_any(question: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| question.contains(kw))
}

/// Classify the question and pick the retrieval depth: list questions need
/// the summary documents, comparisons need chunks from several clients, the
/// rest sit in between. First matching category wins.
pub fn classify(question: &str) -> (QueryType, usize) {
    let question = question.to_lowercase();

    if matches_any(&question, ALL_CLIENTS_KEYWORDS) {
        (QueryType::AllClients, 3)
    } else if matches_any(&question, CLIENT_SPECIFIC_KEYWORDS) {
        (QueryType::ClientSpecific, 5)
    } else if matches_any(&question, COMPARISON_KEYWORDS) {
        (QueryType::Comparison, 6)
    } else if matches_any(&question, BUG_KEYWORDS) {
        (QueryType::Bugs, 5)
    } else if matches_any(&question, TREND_KEYWORDS) {
        (QueryType::Trends, 5)
    } else if matches_any(&question, MODULE_KEYWORDS) {
        (QueryType::Modules, 5)
    } else if matches_any(&question, TEMPORAL_KEYWORDS) {
        (QueryType::Temporal, 4)
    } else {
        (QueryType::General, 4)
    }
}

/// The answer surface returned to HTTP clients.
#[derive(Debug, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub query_type: QueryType,
    pub sections_used: Vec<String>,
    pub success: bool,
}

impl QueryOutcome {
    fn failure(answer: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            query_type,
            sections_used: Vec::new(),
            success: false,
        }
    }
}

pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    oracle: Arc<dyn Oracle>,
    settings: Arc<Settings>,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        oracle: Arc<dyn Oracle>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    /// Answer a natural-language question over the indexed chunks. Never
    /// errors: an empty index, a failed search, or a failed oracle call all
    /// yield a structured unsuccessful outcome.
    pub async fn query(&self, question: &str, k: Option<usize>) -> QueryOutcome {
        let (query_type, auto_k) = classify(question);
        let k = k.unwrap_or(auto_k);
        debug!("Query classified as {} (k={})", query_type.as_str(), k);

        let count = match self.store.count().await {
            Ok(count) => count,
            Err(err) => {
                warn!("Store count failed: {}", err);
                return QueryOutcome::failure(
                    format!("Error processing query: {}", err),
                    query_type,
                );
            }
        };
        if count == 0 {
            return QueryOutcome::failure(
                "No data available. Run the retention analysis first to populate the knowledge base.",
                query_type,
            );
        }

        let hits = match self.store.search(question, k).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!("Search failed: {}", err);
                return QueryOutcome::failure(
                    format!("Error processing query: {}", err),
                    query_type,
                );
            }
        };
        if hits.is_empty() {
            return QueryOutcome::failure(
                "I couldn't find any relevant information for your question. Try rephrasing or asking about specific clients, modules, or time periods.",
                query_type,
            );
        }

        let mut context_parts = Vec::new();
        let mut sources = BTreeSet::new();
        let mut sections = BTreeSet::new();
        for hit in &hits {
            let client = hit
                .chunk
                .metadata
                .client_name
                .as_deref()
                .unwrap_or("Unknown");
            let section = hit.chunk.metadata.section_type.as_str();
            context_parts.push(format!(
                "--- {} ({}) ---\n{}\n",
                client, section, hit.chunk.content
            ));
            sources.insert(client.to_string());
            sections.insert(section.to_string());
        }

        let system = prompts::query_system_prompt(&self.settings);
        let prompt = prompts::build_query_prompt(&context_parts.join("\n"), question);
        match self
            .oracle
            .generate(&system, &prompt, self.settings.query_temperature)
            .await
        {
            Ok(response) => QueryOutcome {
                answer: response.content,
                sources: sources.into_iter().collect(),
                query_type,
                sections_used: sections.into_iter().collect(),
                success: true,
            },
            Err(err) => {
                warn!("Query oracle call failed: {}", err);
                QueryOutcome::failure(format!("Error processing query: {}", err), query_type)
            }
        }
    }
}
