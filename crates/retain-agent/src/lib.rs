//! Pipeline core: normalizers, the risk-classification agent, the knowledge
//! chunker, the notifier, and the orchestrator that runs the analysis and
//! chunking branches concurrently.

pub mod analysis;
pub mod chunker;
pub mod engagement;
pub mod notify;
pub mod prompts;
pub mod render;
pub mod repair;
pub mod tickets;
pub mod workflow;

pub use analysis::AnalysisAgent;
pub use chunker::ChunkingAgent;
pub use notify::{Notifier, SmtpNotifier};
pub use workflow::Workflow;
