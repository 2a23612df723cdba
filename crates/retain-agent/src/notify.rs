//! Notification collaborator: renders the retention report and delivers it
//! over SMTP. Missing credentials degrade to a structured skip, never an
//! error, so the rest of the run's results still reach the caller.

use async_trait::async_trait;

use anyhow::{Context, Result};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{info, warn};

use retain_core::config::SmtpSettings;
use retain_core::types::{ClientRiskAssessment, NotifyOutput, RiskLevel};

use crate::render;

/// Outcome of a connection test, structured rather than an error so the CLI
/// can report "not configured" distinctly from "auth failed".
#[derive(Debug)]
pub struct ConnectionStatus {
    pub configured: bool,
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn render(&self, assessments: &[ClientRiskAssessment]) -> String;

    async fn send(&self, html: &str, recipient: &str, subject: &str) -> Result<NotifyOutput>;

    async fn test_connection(&self) -> ConnectionStatus;
}

/// Subject line derived from the high/medium counts.
pub fn subject_for(assessments: &[ClientRiskAssessment]) -> String {
    let high = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::High))
        .count();
    let medium = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::Medium))
        .count();
    if high > 0 {
        format!("Retention Alert: {} High Risk Clients Detected", high)
    } else if medium > 0 {
        format!("Retention Report: {} Clients Need Attention", medium)
    } else {
        "Retention Report: All Clients Healthy".to_string()
    }
}

pub struct SmtpNotifier {
    smtp: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(smtp: SmtpSettings) -> Self {
        Self { smtp }
    }

    fn transport(&self, password: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)
                .context("SMTP relay configuration failed")?
                .port(self.smtp.port)
                .credentials(Credentials::new(
                    self.smtp.sender.clone(),
                    password.to_string(),
                ))
                .build(),
        )
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn render(&self, assessments: &[ClientRiskAssessment]) -> String {
        render::render_report(assessments)
    }

    async fn send(&self, html: &str, recipient: &str, subject: &str) -> Result<NotifyOutput> {
        let Some(password) = self.smtp.password.as_deref().filter(|_| self.smtp.is_configured())
        else {
            // Structured skip: the analysis results are still returned.
            warn!("Email credentials not configured, skipping notification");
            return Ok(NotifyOutput {
                sent: false,
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                detail: "Email credentials not configured; set EMAIL_SENDER and EMAIL_APP_PASSWORD"
                    .to_string(),
                engagement: None,
            });
        };

        let from: Mailbox = self
            .smtp
            .sender
            .parse()
            .context("invalid sender address")?;
        let to: Mailbox = recipient.parse().context("invalid recipient address")?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .context("failed to build email message")?;

        self.transport(password)?
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        info!("Notification sent to {}", recipient);

        Ok(NotifyOutput {
            sent: true,
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            detail: String::new(),
            engagement: None,
        })
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let Some(password) = self.smtp.password.as_deref() else {
            return ConnectionStatus {
                configured: false,
                success: false,
                message: "Email not configured.".to_string(),
            };
        };
        info!("Testing SMTP connection to {}:{}", self.smtp.host, self.smtp.port);

        let transport = match self.transport(password) {
            Ok(transport) => transport,
            Err(err) => {
                return ConnectionStatus {
                    configured: true,
                    success: false,
                    message: format!("Connection failed: {}", err),
                }
            }
        };
        match transport.test_connection().await {
            Ok(true) => ConnectionStatus {
                configured: true,
                success: true,
                message: format!("Email configured and authenticated: {}", self.smtp.sender),
            },
            Ok(false) => ConnectionStatus {
                configured: true,
                success: false,
                message: "SMTP server rejected the connection".to_string(),
            },
            Err(err) => ConnectionStatus {
                configured: true,
                success: false,
                message: format!("Authentication failed: {}", err),
            },
        }
    }
}
