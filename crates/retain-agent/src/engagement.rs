//! Per-client engagement emails. After the team report goes out, each risky
//! client gets a targeted email promoting a module they have not been using,
//! rendered from an HTML template file keyed by module name.

use std::path::{Path, PathBuf};

use log::{info, warn};

use retain_core::config::CORE_MODULES;
use retain_core::types::{ClientRiskAssessment, EngagementOutcome, EngagementSummary};

use crate::notify::Notifier;

/// Module name to template file, for the modules that have one.
const MODULE_TEMPLATE_MAP: &[(&str, &str)] = &[
    ("Timesheets", "timesheet.html"),
    ("Claims", "claims.html"),
    ("Delivery Dockets", "deliveryDocket.html"),
    ("Site Diaries", "siteDiary.html"),
    ("Purchase Orders", "purchaseOrder.html"),
    ("Variations", "variations.html"),
    ("Bills", "accountPayable.html"),
    ("Projects", "projectInvitation.html"),
];

/// Modules the client is not using, in roster order.
pub fn unused_modules(assessment: &ClientRiskAssessment) -> Vec<String> {
    CORE_MODULES
        .iter()
        .filter(|m| !assessment.active_modules.iter().any(|a| a == *m))
        .map(|m| (*m).to_string())
        .collect()
}

fn template_for_module(module: &str, templates_dir: &Path) -> Option<PathBuf> {
    let (_, file) = MODULE_TEMPLATE_MAP.iter().find(|(name, _)| *name == module)?;
    let path = templates_dir.join(file);
    path.exists().then_some(path)
}

/// Pick the template to promote: the first unused module that has one on
/// disk, in roster order, else the first available template at all.
/// Selection is deterministic so repeated runs promote the same module.
pub fn select_template(
    assessment: &ClientRiskAssessment,
    templates_dir: &Path,
) -> Option<(String, PathBuf)> {
    for module in unused_modules(assessment) {
        if let Some(path) = template_for_module(&module, templates_dir) {
            return Some((module, path));
        }
    }
    MODULE_TEMPLATE_MAP.iter().find_map(|(module, file)| {
        let path = templates_dir.join(file);
        path.exists().then(|| ((*module).to_string(), path))
    })
}

pub fn engagement_subject(client_name: &str, module: &str) -> String {
    format!("{} - Boost Your Productivity with {}!", client_name, module)
}

/// Send one engagement email per risky client. Non-risky clients are never
/// emailed; per-client problems land in the summary and never abort the
/// pass.
pub async fn send_engagement_emails(
    notifier: &dyn Notifier,
    assessments: &[ClientRiskAssessment],
    templates_dir: &Path,
    recipient: &str,
) -> EngagementSummary {
    let mut summary = EngagementSummary::default();

    for assessment in assessments.iter().filter(|a| a.is_risky()) {
        let client = assessment.client_name.clone();
        let Some((module, template_path)) = select_template(assessment, templates_dir) else {
            summary.skipped.push(EngagementOutcome {
                client_name: client,
                module: None,
                detail: "No matching template for unused modules".to_string(),
            });
            continue;
        };

        let html = match std::fs::read_to_string(&template_path) {
            Ok(html) => html,
            Err(err) => {
                summary.failed.push(EngagementOutcome {
                    client_name: client,
                    module: Some(module),
                    detail: format!("Failed to read template: {}", err),
                });
                continue;
            }
        };

        let subject = engagement_subject(&client, &module);
        match notifier.send(&html, recipient, &subject).await {
            Ok(output) if output.sent => {
                info!("Engagement email for {} sent ({})", client, module);
                summary.sent.push(EngagementOutcome {
                    client_name: client,
                    module: Some(module),
                    detail: template_path.display().to_string(),
                });
            }
            Ok(output) => {
                summary.skipped.push(EngagementOutcome {
                    client_name: client,
                    module: Some(module),
                    detail: output.detail,
                });
            }
            Err(err) => {
                warn!("Engagement email for {} failed: {:#}", client, err);
                summary.failed.push(EngagementOutcome {
                    client_name: client,
                    module: Some(module),
                    detail: format!("{:#}", err),
                });
            }
        }
    }

    info!(
        "Engagement pass: {} sent, {} skipped, {} failed",
        summary.sent.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    summary
}
