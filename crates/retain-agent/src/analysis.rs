//! Risk-classification branch: one oracle round-trip over both datasets,
//! then the repair state machine over whatever comes back.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use retain_core::config::Settings;
use retain_core::types::{AnalysisOutput, BranchOutput, ClientRiskAssessment, ClientUsage, RiskLevel, TicketRecord};
use retain_engines::Oracle;

use crate::prompts;
use crate::repair::{parse_assessments, RepairOutcome};

pub struct AnalysisAgent {
    oracle: Arc<dyn Oracle>,
    settings: Arc<Settings>,
}

impl AnalysisAgent {
    pub fn new(oracle: Arc<dyn Oracle>, settings: Arc<Settings>) -> Self {
        Self { oracle, settings }
    }

    /// Run the risk classification over normalized inputs.
    ///
    /// Transport failures propagate as errors; a successful response that
    /// resists every parse tier degrades to an empty result plus an error
    /// entry, with the raw response persisted for offline inspection.
    pub async fn run(
        &self,
        usage: &[ClientUsage],
        tickets: &[TicketRecord],
    ) -> Result<BranchOutput> {
        info!(
            "Starting risk analysis: {} clients, {} tickets",
            usage.len(),
            tickets.len()
        );

        let usage_json = serde_json::to_string_pretty(usage)?;
        let tickets_json = serde_json::to_string_pretty(tickets)?;
        let client_names: Vec<String> =
            usage.iter().map(|c| c.client_name.clone()).collect();

        let system = prompts::analysis_system_prompt(&client_names, &self.settings);
        let prompt = prompts::build_analysis_prompt(&usage_json, &tickets_json, &self.settings);

        let response = self
            .oracle
            .generate(&system, &prompt, self.settings.analysis_temperature)
            .await
            .context("risk analysis oracle call failed")?;

        let (assessments, outcome) = parse_assessments(&response.content);

        let mut errors = Vec::new();
        if outcome == RepairOutcome::Failed {
            error!("Could not parse any risk assessment from the oracle response");
            if let Err(err) = self.persist_debug_response(&response.content) {
                warn!("Could not persist debug response: {}", err);
            } else {
                info!(
                    "Raw oracle response saved to {}",
                    self.settings.debug_response_file.display()
                );
            }
            errors.push("Failed to parse analysis response".to_string());
        } else {
            info!(
                "Analyzed {} clients (parse outcome: {:?})",
                assessments.len(),
                outcome
            );
        }

        let risky: Vec<ClientRiskAssessment> = assessments
            .iter()
            .filter(|a| a.is_risky())
            .cloned()
            .collect();
        log_distribution(&assessments, &risky);

        if let Err(err) = self.persist_results(&assessments) {
            warn!("Could not persist analysis results: {}", err);
        }

        Ok(BranchOutput {
            analysis: Some(AnalysisOutput {
                assessments,
                risky,
                raw_response: response.content,
            }),
            errors,
            ..Default::default()
        })
    }

    fn persist_debug_response(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.settings.debug_response_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.settings.debug_response_file, raw)?;
        Ok(())
    }

    fn persist_results(&self, assessments: &[ClientRiskAssessment]) -> Result<()> {
        if let Some(parent) = self.settings.results_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(
            &self.settings.results_file,
            serde_json::to_string_pretty(assessments)?,
        )?;
        Ok(())
    }
}

fn log_distribution(assessments: &[ClientRiskAssessment], risky: &[ClientRiskAssessment]) {
    let high = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::High))
        .count();
    let medium = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::Medium))
        .count();
    info!(
        "Risk distribution: {} high, {} medium, {} low/other",
        high,
        medium,
        assessments.len() - high - medium
    );
    if !risky.is_empty() {
        info!("{} risky clients flagged for notification", risky.len());
    }
}

/// Plaintext run summary, ranked high to medium to low, unclassified last.
pub fn format_report(assessments: &[ClientRiskAssessment]) -> String {
    let mut ranked: Vec<&ClientRiskAssessment> = assessments.iter().collect();
    ranked.sort_by_key(|a| match a.risk_level() {
        Some(RiskLevel::High) => 0,
        Some(RiskLevel::Medium) => 1,
        Some(RiskLevel::Low) => 2,
        None => 3,
    });

    let mut out = String::new();
    out.push_str("RETENTION ANALYSIS SUMMARY\n");
    out.push_str("==========================\n\n");
    out.push_str(&format!("Clients analyzed: {}\n\n", assessments.len()));

    for assessment in ranked {
        let level = assessment
            .risk_level()
            .map(|l| l.as_str().to_uppercase())
            .unwrap_or_else(|| "UNCLASSIFIED".to_string());
        out.push_str(&format!(
            "[{}] {} (churn probability {:.0}%, health {:.0}/100, trend {})\n",
            level,
            assessment.client_name,
            assessment.churn_probability,
            assessment.usage_health_score,
            if assessment.usage_trend.is_empty() {
                "unknown"
            } else {
                &assessment.usage_trend
            },
        ));
        if !assessment.summary.is_empty() {
            out.push_str(&format!("    {}\n", assessment.summary));
        }
        for concern in &assessment.key_concerns {
            out.push_str(&format!("    - {}\n", concern));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(name: &str, risk: &str, probability: f64) -> ClientRiskAssessment {
        ClientRiskAssessment {
            client_name: name.to_string(),
            risk_factor: risk.to_string(),
            churn_probability: probability,
            ..Default::default()
        }
    }

    #[test]
    fn test_report_ranks_high_before_medium_before_low() {
        let report = format_report(&[
            assessment("LowClient", "low", 10.0),
            assessment("HighClient", "high", 90.0),
            assessment("OddClient", "???", 0.0),
            assessment("MidClient", "medium", 50.0),
        ]);
        let high = report.find("HighClient").unwrap();
        let mid = report.find("MidClient").unwrap();
        let low = report.find("LowClient").unwrap();
        let odd = report.find("OddClient").unwrap();
        assert!(high < mid && mid < low && low < odd);
        assert!(report.contains("[UNCLASSIFIED] OddClient"));
    }

    #[test]
    fn test_report_handles_empty_input() {
        let report = format_report(&[]);
        assert!(report.contains("Clients analyzed: 0"));
    }
}
