//! Orchestrator: runs the analysis and chunking branches concurrently over
//! shared read-only input, merges their disjoint output slots, and dispatches
//! the notifier only when risky clients exist.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use retain_core::config::Settings;
use retain_core::types::{BranchOutput, ClientUsage, RunState, TicketRecord};
use retain_core::Indexer;
use retain_engines::Oracle;

use crate::analysis::AnalysisAgent;
use crate::chunker::ChunkingAgent;
use crate::engagement;
use crate::notify::{subject_for, Notifier};
use crate::render;

pub struct Workflow {
    analysis: AnalysisAgent,
    chunking: ChunkingAgent,
    notifier: Option<Arc<dyn Notifier>>,
    settings: Arc<Settings>,
}

impl Workflow {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        indexer: Option<Arc<dyn Indexer>>,
        notifier: Option<Arc<dyn Notifier>>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            analysis: AnalysisAgent::new(oracle.clone(), settings.clone()),
            chunking: ChunkingAgent::new(oracle, indexer, settings.clone()),
            notifier,
            settings,
        }
    }

    /// Run the full pipeline over normalized inputs and return the merged
    /// run state. An analysis failure past its parse tiers is a transport or
    /// auth problem and aborts the run; a chunking failure becomes an error
    /// entry with its slot left empty.
    pub async fn run(&self, usage: &[ClientUsage], tickets: &[TicketRecord]) -> Result<RunState> {
        info!("Starting retention workflow (parallel branches)");

        let (analysis_result, chunking_result) =
            tokio::join!(self.analysis.run(usage, tickets), self.chunking.run(usage, tickets));

        let mut state = RunState::default();
        state.merge(analysis_result?)?;
        merge_branch(&mut state, chunking_result, "chunking")?;

        // Conditional join: notify only when the risky list is non-empty.
        if state.risky_clients().is_empty() {
            info!("No risky clients, skipping notification");
        } else if let Some(notifier) = &self.notifier {
            let notify_result = self.dispatch_notification(notifier, &state).await;
            merge_branch(&mut state, notify_result, "notify")?;
        }

        info!(
            "Workflow complete: analysis={}, chunking={}, notify={}, {} errors",
            state.analysis.is_some(),
            state.chunking.is_some(),
            state.notify.is_some(),
            state.errors.len()
        );
        Ok(state)
    }

    async fn dispatch_notification(
        &self,
        notifier: &Arc<dyn Notifier>,
        state: &RunState,
    ) -> Result<BranchOutput> {
        let risky = state.risky_clients();
        info!("Dispatching notification for {} risky clients", risky.len());

        let html = notifier.render(risky);
        if let Err(err) = render::write_preview(&html, &self.settings.email_preview_file) {
            warn!("Could not write email preview: {}", err);
        }

        let subject = subject_for(risky);
        let mut output = notifier
            .send(&html, &self.settings.smtp.recipient, &subject)
            .await?;

        // Engagement pass runs only once the team report went out and the
        // template directory exists.
        let templates_dir = &self.settings.client_templates_dir;
        if output.sent && templates_dir.is_dir() {
            output.engagement = Some(
                engagement::send_engagement_emails(
                    notifier.as_ref(),
                    risky,
                    templates_dir,
                    &self.settings.smtp.recipient,
                )
                .await,
            );
        }

        Ok(BranchOutput {
            notify: Some(output),
            ..Default::default()
        })
    }
}

/// Fold one degradable branch result into the run state. Branch errors
/// become error entries; slot collisions are programming errors and
/// propagate. The analysis branch never goes through here: its failures are
/// run-fatal.
fn merge_branch(state: &mut RunState, result: Result<BranchOutput>, branch: &str) -> Result<()> {
    match result {
        Ok(output) => state.merge(output),
        Err(err) => {
            warn!("{} branch failed: {:#}", branch, err);
            state.errors.push(format!("{} branch failed: {:#}", branch, err));
            Ok(())
        }
    }
}
