//! End-to-end workflow tests over a mock oracle, an in-memory indexer, and a
//! recording notifier.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use retain_agent::notify::{ConnectionStatus, Notifier};
use retain_agent::Workflow;
use retain_core::config::Settings;
use retain_core::types::{
    Activity, ClientRiskAssessment, ClientUsage, KnowledgeChunk, NotifyOutput, SectionType,
    TicketRecord, WeeklyUsage,
};
use retain_core::Indexer;
use retain_engines::{Oracle, OracleResponse};

struct MockOracle {
    analysis_response: String,
    chunking_response: String,
}

#[async_trait]
impl Oracle for MockOracle {
    async fn generate(
        &self,
        system: &str,
        _prompt: &str,
        _temperature: f64,
    ) -> anyhow::Result<OracleResponse> {
        // The analyst persona asks for a JSON array; the documentation
        // persona asks for tagged sections.
        let content = if system.contains("Retention Analyst") {
            self.analysis_response.clone()
        } else {
            self.chunking_response.clone()
        };
        Ok(OracleResponse {
            content,
            model: "mock".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            finish_reason: None,
        })
    }
}

struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn generate(
        &self,
        _system: &str,
        _prompt: &str,
        _temperature: f64,
    ) -> anyhow::Result<OracleResponse> {
        anyhow::bail!("connection refused")
    }
}

/// Succeeds for the analyst persona, fails for everything else.
struct ChunkingFailsOracle {
    analysis_response: String,
}

#[async_trait]
impl Oracle for ChunkingFailsOracle {
    async fn generate(
        &self,
        system: &str,
        _prompt: &str,
        _temperature: f64,
    ) -> anyhow::Result<OracleResponse> {
        if !system.contains("Retention Analyst") {
            anyhow::bail!("connection refused");
        }
        Ok(OracleResponse {
            content: self.analysis_response.clone(),
            model: "mock".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            finish_reason: None,
        })
    }
}

#[derive(Default)]
struct MemoryIndexer {
    chunks: Mutex<Vec<KnowledgeChunk>>,
}

#[async_trait]
impl Indexer for MemoryIndexer {
    async fn replace_all(&self, chunks: &[KnowledgeChunk]) -> anyhow::Result<usize> {
        let mut stored = self.chunks.lock().await;
        stored.clear();
        stored.extend_from_slice(chunks);
        Ok(stored.len())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.chunks.lock().await.len())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn render(&self, assessments: &[ClientRiskAssessment]) -> String {
        format!("<html>{} clients</html>", assessments.len())
    }

    async fn send(&self, _html: &str, recipient: &str, subject: &str) -> anyhow::Result<NotifyOutput> {
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), subject.to_string()));
        Ok(NotifyOutput {
            sent: true,
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            detail: String::new(),
            engagement: None,
        })
    }

    async fn test_connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            configured: true,
            success: true,
            message: String::new(),
        }
    }
}

fn test_settings(dir: &std::path::Path) -> Arc<Settings> {
    let mut settings = Settings::from_env();
    settings.data_dir = dir.to_path_buf();
    settings.results_file = dir.join("analysis_results.json");
    settings.debug_response_file = dir.join("debug_oracle_response.txt");
    settings.email_preview_file = dir.join("email_preview.html");
    settings.client_templates_dir = dir.join("client_templates");
    settings.smtp.recipient = "cs@example.com".to_string();
    Arc::new(settings)
}

fn usage_fixture() -> Vec<ClientUsage> {
    vec![
        ClientUsage {
            client_name: "Development".into(),
            usage: vec![WeeklyUsage {
                activities: vec![Activity {
                    name: "Timesheets".into(),
                    count: 30,
                }],
                ..Default::default()
            }],
            client_representatives: vec![],
        },
        ClientUsage {
            client_name: "Dormant Co".into(),
            // Scenario: zero activity across the whole window.
            usage: vec![WeeklyUsage::default(); 12],
            client_representatives: vec![],
        },
    ]
}

fn chunking_narrative() -> String {
    "[CLIENT OVERVIEW: Development]\nDevelopment recorded 360 activities, healthy engagement across their module set this quarter.\n\n\
     [USAGE TREND: Dormant Co]\nDormant Co shows zero activity across all twelve weeks, an inactive account at critical churn risk."
        .to_string()
}

#[tokio::test]
async fn test_run_merges_both_branches_and_notifies_on_risk() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(MockOracle {
        analysis_response: r#"[
            {"client_name": "Development", "risk_factor": "low", "churn_probability": 10},
            {"client_name": "Dormant Co", "risk_factor": "high", "churn_probability": 95,
             "usage_trend": "inactive", "weeks_active": 0}
        ]"#
        .to_string(),
        chunking_response: chunking_narrative(),
    });
    let indexer = Arc::new(MemoryIndexer::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let workflow = Workflow::new(
        oracle,
        Some(indexer.clone() as Arc<dyn Indexer>),
        Some(notifier.clone() as Arc<dyn Notifier>),
        settings,
    );
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    assert!(state.errors.is_empty());

    let analysis = state.analysis.as_ref().unwrap();
    assert_eq!(analysis.assessments.len(), 2);
    assert_eq!(analysis.risky.len(), 1);
    assert_eq!(analysis.risky[0].client_name, "Dormant Co");
    assert_eq!(analysis.risky[0].usage_trend, "inactive");
    assert_eq!(analysis.risky[0].weeks_active, 0);

    let chunking = state.chunking.as_ref().unwrap();
    assert!(chunking.ready);
    assert_eq!(chunking.indexed, chunking.chunks.len());
    assert_eq!(indexer.count().await.unwrap(), chunking.chunks.len());

    let notify = state.notify.as_ref().unwrap();
    assert!(notify.sent);
    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "cs@example.com");
    assert!(sent[0].1.contains("1 High Risk"));
}

#[tokio::test]
async fn test_engagement_pass_follows_team_report_when_templates_exist() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());
    std::fs::create_dir(&settings.client_templates_dir).unwrap();
    std::fs::write(
        settings.client_templates_dir.join("timesheet.html"),
        "<html>try timesheets</html>",
    )
    .unwrap();

    let oracle = Arc::new(MockOracle {
        analysis_response: r#"[
            {"client_name": "Development", "risk_factor": "low", "churn_probability": 10},
            {"client_name": "Dormant Co", "risk_factor": "high", "churn_probability": 95}
        ]"#
        .to_string(),
        chunking_response: chunking_narrative(),
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let workflow = Workflow::new(
        oracle,
        None,
        Some(notifier.clone() as Arc<dyn Notifier>),
        settings,
    );
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    let engagement = state.notify.as_ref().unwrap().engagement.as_ref().unwrap();
    assert_eq!(engagement.sent.len(), 1);
    assert_eq!(engagement.sent[0].client_name, "Dormant Co");
    assert_eq!(engagement.sent[0].module.as_deref(), Some("Timesheets"));

    // Team report first, then the per-client email.
    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.contains("High Risk"));
    assert!(sent[1].1.contains("Boost Your Productivity with Timesheets"));
}

#[tokio::test]
async fn test_engagement_pass_skipped_without_template_directory() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(MockOracle {
        analysis_response:
            r#"[{"client_name": "Dormant Co", "risk_factor": "high", "churn_probability": 95}]"#
                .to_string(),
        chunking_response: chunking_narrative(),
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let workflow = Workflow::new(
        oracle,
        None,
        Some(notifier.clone() as Arc<dyn Notifier>),
        settings,
    );
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    assert!(state.notify.as_ref().unwrap().engagement.is_none());
    assert_eq!(notifier.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn test_run_without_risky_clients_skips_notification() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(MockOracle {
        analysis_response:
            r#"[{"client_name": "Development", "risk_factor": "low", "churn_probability": 5}]"#
                .to_string(),
        chunking_response: chunking_narrative(),
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let workflow = Workflow::new(oracle, None, Some(notifier.clone() as Arc<dyn Notifier>), settings);
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    assert!(state.notify.is_none());
    assert!(notifier.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_no_ticket_data_degrades_gracefully() {
    // Scenario: no tickets supplied at all. The classifier still produces
    // assessments from usage data alone with empty bug lists.
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(MockOracle {
        analysis_response: r#"[
            {"client_name": "Development", "risk_factor": "medium", "churn_probability": 45,
             "bug_tickets_affecting": []}
        ]"#
        .to_string(),
        chunking_response: chunking_narrative(),
    });
    let workflow = Workflow::new(oracle, None, None, settings);

    let tickets: Vec<TicketRecord> = Vec::new();
    let state = workflow.run(&usage_fixture(), &tickets).await.unwrap();

    let analysis = state.analysis.as_ref().unwrap();
    assert!(analysis
        .assessments
        .iter()
        .all(|a| a.bug_tickets_affecting.is_empty()));

    // Deterministic ticket chunks are absent, usage-derived chunks remain.
    let chunking = state.chunking.as_ref().unwrap();
    assert!(chunking
        .chunks
        .iter()
        .all(|c| c.metadata.section_type != SectionType::JiraTickets));
    assert!(chunking
        .chunks
        .iter()
        .any(|c| c.metadata.section_type == SectionType::AllClients));
}

#[tokio::test]
async fn test_parse_failure_degrades_to_error_entry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(MockOracle {
        analysis_response: "I am sorry, I cannot produce JSON today.".to_string(),
        chunking_response: chunking_narrative(),
    });
    let workflow = Workflow::new(oracle, None, None, settings.clone());
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    let analysis = state.analysis.as_ref().unwrap();
    assert!(analysis.assessments.is_empty());
    assert!(state
        .errors
        .iter()
        .any(|e| e.contains("Failed to parse analysis response")));
    // Raw response persisted for offline inspection.
    let debug = std::fs::read_to_string(&settings.debug_response_file).unwrap();
    assert!(debug.contains("cannot produce JSON"));
    // The chunking branch is unaffected.
    assert!(state.chunking.is_some());
}

#[tokio::test]
async fn test_analysis_transport_failure_aborts_the_run() {
    // A transport error out of the classifier is a hard failure: the run
    // errors instead of returning a state with an empty analysis slot.
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let workflow = Workflow::new(Arc::new(FailingOracle), None, None, settings);
    let err = workflow.run(&usage_fixture(), &[]).await.unwrap_err();
    assert!(format!("{:#}", err).contains("connection refused"));
}

#[tokio::test]
async fn test_chunking_transport_failure_degrades_to_error_entry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());

    let oracle = Arc::new(ChunkingFailsOracle {
        analysis_response:
            r#"[{"client_name": "Development", "risk_factor": "low", "churn_probability": 5}]"#
                .to_string(),
    });
    let workflow = Workflow::new(oracle, None, None, settings);
    let state = workflow.run(&usage_fixture(), &[]).await.unwrap();

    assert!(state.analysis.is_some());
    assert!(state.chunking.is_none());
    assert!(state
        .errors
        .iter()
        .any(|e| e.contains("chunking branch failed")));
}
