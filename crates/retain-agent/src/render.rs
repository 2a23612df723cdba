//! HTML rendering for the retention report email. A deterministic template:
//! risk-sorted client cards with probability, trend, health score, concerns,
//! and recommendations.

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::Local;

use retain_core::types::{ClientRiskAssessment, RiskLevel};

struct RiskColors {
    header_bg: &'static str,
    border: &'static str,
    metric: &'static str,
    issues_bg: &'static str,
    issues_text: &'static str,
}

fn risk_colors(level: Option<RiskLevel>) -> RiskColors {
    match level {
        Some(RiskLevel::High) => RiskColors {
            header_bg: "#d97706",
            border: "#d97706",
            metric: "#dc2626",
            issues_bg: "#fee2e2",
            issues_text: "#991b1b",
        },
        Some(RiskLevel::Medium) => RiskColors {
            header_bg: "#3b82f6",
            border: "#3b82f6",
            metric: "#d97706",
            issues_bg: "#fef3c7",
            issues_text: "#92400e",
        },
        _ => RiskColors {
            header_bg: "#10b981",
            border: "#10b981",
            metric: "#059669",
            issues_bg: "#d1fae5",
            issues_text: "#065f46",
        },
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn list_items(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("<li>{}</li>", escape_html(item)))
        .collect()
}

fn client_card(assessment: &ClientRiskAssessment) -> String {
    let colors = risk_colors(assessment.risk_level());
    let level = assessment
        .risk_level()
        .map(|l| l.as_str().to_uppercase())
        .unwrap_or_else(|| "UNCLASSIFIED".to_string());

    let mut card = format!(
        "<div style=\"border:2px solid {border};border-radius:8px;margin:16px 0;overflow:hidden\">\
         <div style=\"background:{header};color:#fff;padding:12px 16px;font-weight:bold\">\
         {name} &mdash; {level} RISK</div>\
         <div style=\"padding:16px\">\
         <p style=\"color:{metric};font-size:18px;margin:0 0 8px\">\
         Churn probability: {probability:.0}% &middot; Health score: {health:.0}/100 &middot; Trend: {trend}</p>",
        border = colors.border,
        header = colors.header_bg,
        name = escape_html(&assessment.client_name),
        level = level,
        metric = colors.metric,
        probability = assessment.churn_probability,
        health = assessment.usage_health_score,
        trend = escape_html(if assessment.usage_trend.is_empty() {
            "unknown"
        } else {
            &assessment.usage_trend
        }),
    );

    if !assessment.summary.is_empty() {
        card.push_str(&format!("<p>{}</p>", escape_html(&assessment.summary)));
    }
    if !assessment.key_concerns.is_empty() {
        card.push_str(&format!(
            "<div style=\"background:{bg};color:{text};padding:8px 12px;border-radius:4px\">\
             <strong>Key concerns</strong><ul>{items}</ul></div>",
            bg = colors.issues_bg,
            text = colors.issues_text,
            items = list_items(&assessment.key_concerns),
        ));
    }
    if !assessment.recommendations.is_empty() {
        card.push_str(&format!(
            "<p><strong>Recommended actions</strong></p><ul>{}</ul>",
            list_items(&assessment.recommendations)
        ));
    }
    if !assessment.bug_tickets_affecting.is_empty() {
        let tickets: String = assessment
            .bug_tickets_affecting
            .iter()
            .map(|t| {
                format!(
                    "<li>[{}] {} (Priority: {}, Status: {})</li>",
                    escape_html(&t.key),
                    escape_html(&t.summary),
                    escape_html(&t.priority),
                    escape_html(&t.status),
                )
            })
            .collect();
        card.push_str(&format!(
            "<p><strong>Bug tickets affecting this client</strong></p><ul>{}</ul>",
            tickets
        ));
    }

    card.push_str("</div></div>");
    card
}

/// Render the full report: risk-sorted cards inside a fixed page shell.
pub fn render_report(assessments: &[ClientRiskAssessment]) -> String {
    let mut ranked: Vec<&ClientRiskAssessment> = assessments.iter().collect();
    ranked.sort_by_key(|a| match a.risk_level() {
        Some(RiskLevel::High) => 0,
        Some(RiskLevel::Medium) => 1,
        Some(RiskLevel::Low) => 2,
        None => 3,
    });

    let high = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::High))
        .count();
    let medium = assessments
        .iter()
        .filter(|a| a.risk_level() == Some(RiskLevel::Medium))
        .count();

    let cards: String = ranked.iter().map(|a| client_card(a)).collect();

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head>\
         <body style=\"font-family:Arial,Helvetica,sans-serif;max-width:720px;margin:0 auto;padding:24px\">\
         <h1 style=\"color:#111827\">Client Retention Report</h1>\
         <p>{total} clients analyzed &middot; {high} high risk &middot; {medium} medium risk</p>\
         {cards}\
         <hr><p style=\"color:#6b7280;font-size:12px\">Generated {generated} by the retention analysis pipeline</p>\
         </body></html>",
        total = assessments.len(),
        high = high,
        medium = medium,
        cards = cards,
        generated = Local::now().format("%Y-%m-%d %H:%M"),
    )
}

/// Write the HTML preview artifact for the run.
pub fn write_preview(html: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html)?;
    Ok(())
}
