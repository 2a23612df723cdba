//! Knowledge-chunking branch: oracle-authored narrative split into typed
//! sections with a three-tier fallback, plus deterministic roster and
//! summary chunks synthesized straight from the normalized data.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use retain_core::config::Settings;
use retain_core::types::{
    BranchOutput, ChunkMetadata, ChunkingOutput, ClientUsage, KnowledgeChunk, SectionType,
    TicketRecord,
};
use retain_core::Indexer;
use retain_engines::Oracle;

use crate::prompts;
use crate::tickets::group_by_client;

/// Sections shorter than this are noise, not signal.
const MIN_SECTION_LEN: usize = 50;

/// One pattern for all six tagged section markers. Content spans from the
/// tag to the next `[` in the text, which is how the narrative format
/// delimits sections.
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\[(CLIENT OVERVIEW|WEEKLY USAGE|MODULE USAGE|BUGS AFFECTING|USAGE TREND|REPRESENTATIVE):\s*([^\]]+)\]",
    )
    .expect("section tag pattern")
});

fn section_for_tag(tag: &str) -> (SectionType, &'static str) {
    match tag.to_uppercase().as_str() {
        "CLIENT OVERVIEW" => (SectionType::Overview, "Client overview and summary"),
        "WEEKLY USAGE" => (SectionType::Weekly, "Weekly usage breakdown and patterns"),
        "MODULE USAGE" => (SectionType::Modules, "Module-specific usage analysis"),
        "BUGS AFFECTING" => (SectionType::Bugs, "Bug tickets and issues"),
        "USAGE TREND" => (SectionType::Trends, "Usage trends over time"),
        _ => (SectionType::Representative, "Client representative info"),
    }
}

/// Chunk id: normalized client name + section type + run timestamp.
fn make_id(client_name: &str, section: SectionType, ts: &str) -> String {
    format!(
        "{}_{}_{}",
        client_name.replace(' ', "_").to_lowercase(),
        section.as_str(),
        ts
    )
}

/// Tier 1: extract each tagged section keyed by its bracketed client name,
/// dropping sections under the minimum content length.
pub fn parse_oracle_sections(text: &str, ts: &str, generated_at: &str) -> Vec<KnowledgeChunk> {
    let mut chunks = Vec::new();

    for caps in TAG_RE.captures_iter(text) {
        let (whole, tag, client) = match (caps.get(0), caps.get(1), caps.get(2)) {
            (Some(w), Some(t), Some(c)) => (w, t.as_str(), c.as_str()),
            _ => continue,
        };
        let client_name = client.trim().to_string();

        let rest = &text[whole.end()..];
        let content = match rest.find('[') {
            Some(next) => &rest[..next],
            None => rest,
        };
        let content = content.trim();
        if content.len() <= MIN_SECTION_LEN {
            continue;
        }

        let (section, description) = section_for_tag(tag);
        chunks.push(KnowledgeChunk {
            id: make_id(&client_name, section, ts),
            content: format!(
                "Client: {}\nSection: {}\n\n{}",
                client_name, description, content
            ),
            metadata: ChunkMetadata {
                client_name: Some(client_name),
                section_type: section,
                description: description.to_string(),
                source: "chunking_agent".to_string(),
                generated_at: generated_at.to_string(),
            },
        });
    }

    chunks
}

/// Tier 2: split on the literal `===== CLIENT:` delimiter, one
/// undifferentiated chunk per segment.
pub fn parse_client_delimited(text: &str, ts: &str, generated_at: &str) -> Vec<KnowledgeChunk> {
    let mut chunks = Vec::new();
    for segment in text.split("===== CLIENT:").skip(1) {
        if !segment.contains("=====") {
            continue;
        }
        let segment = segment.trim();
        let client_name = segment
            .lines()
            .next()
            .unwrap_or("")
            .replace("=====", "")
            .trim()
            .to_string();
        chunks.push(KnowledgeChunk {
            id: format!("client_{}_{}", client_name.replace(' ', "_").to_lowercase(), ts),
            content: format!("Client: {}\n\n{}", client_name, segment),
            metadata: ChunkMetadata {
                client_name: Some(client_name),
                section_type: SectionType::Full,
                description: String::new(),
                source: "chunking_agent".to_string(),
                generated_at: generated_at.to_string(),
            },
        });
    }
    chunks
}

/// The three-tier parse over the raw oracle narrative: tagged sections, then
/// the client delimiter, then the whole output as a single chunk.
pub fn parse_narrative(text: &str, ts: &str, generated_at: &str) -> Vec<KnowledgeChunk> {
    let chunks = parse_oracle_sections(text, ts, generated_at);
    if !chunks.is_empty() {
        return chunks;
    }

    warn!("Section parsing yielded nothing, trying client-delimiter fallback");
    let chunks = parse_client_delimited(text, ts, generated_at);
    if !chunks.is_empty() {
        return chunks;
    }

    warn!("Delimiter fallback yielded nothing, wrapping raw output as one chunk");
    vec![KnowledgeChunk {
        id: format!("full_analysis_{}", ts),
        content: text.to_string(),
        metadata: ChunkMetadata {
            client_name: None,
            section_type: SectionType::Full,
            description: String::new(),
            source: "chunking_agent".to_string(),
            generated_at: generated_at.to_string(),
        },
    }]
}

fn ticket_listing(ticket: &TicketRecord) -> String {
    format!(
        "Ticket: {}\nSummary: {}\nPriority: {}\nStatus: {}\nModule: {}\nCreated: {}\nUpdated: {}\nDescription: {}\nLabels: {}",
        ticket.key,
        ticket.summary,
        ticket.priority,
        ticket.status,
        ticket.affected_module,
        ticket.created,
        ticket.updated,
        if ticket.description.is_empty() {
            "No description"
        } else {
            &ticket.description
        },
        ticket.labels.join(", "),
    )
}

/// Deterministic augmentation: synthesized directly from normalized data so
/// baseline retrievability survives total oracle parsing failure. Byte-stable
/// across runs except for the timestamp fields.
pub fn synthesize_chunks(
    usage: &[ClientUsage],
    tickets: &[TicketRecord],
    settings: &Settings,
    now: DateTime<Local>,
) -> Vec<KnowledgeChunk> {
    let ts = now.format("%Y%m%d_%H%M%S").to_string();
    let generated_at = now.to_rfc3339();
    let mut chunks = Vec::new();

    // Per-client ticket chunks plus a global ticket summary.
    let grouped = group_by_client(tickets);
    if !tickets.is_empty() {
        for (client_name, client_tickets) in &grouped {
            let listings: Vec<String> =
                client_tickets.iter().map(|t| ticket_listing(t)).collect();
            let content = format!(
                "Client: {}\nSection: Bug Reports\n\nThis client has {} bug ticket(s):\n\n{}\n\nTotal tickets for {}: {}",
                client_name,
                client_tickets.len(),
                listings.join("\n---\n"),
                client_name,
                client_tickets.len(),
            );
            chunks.push(KnowledgeChunk {
                id: make_id(client_name, SectionType::JiraTickets, &ts),
                content,
                metadata: ChunkMetadata {
                    client_name: Some(client_name.clone()),
                    section_type: SectionType::JiraTickets,
                    description: "Bug tickets for this client".to_string(),
                    source: "ticket_data".to_string(),
                    generated_at: generated_at.clone(),
                },
            });
        }

        let mut summary = format!(
            "Bug Report Summary\n\nTotal Tickets: {}\nClients with bug data: {}\n\nBreakdown by client:\n",
            tickets.len(),
            grouped.keys().cloned().collect::<Vec<_>>().join(", "),
        );
        for (client_name, client_tickets) in &grouped {
            summary.push_str(&format!("- {}: {} tickets\n", client_name, client_tickets.len()));
        }
        chunks.push(KnowledgeChunk {
            id: format!("jira_summary_{}", ts),
            content: summary,
            metadata: ChunkMetadata {
                client_name: None,
                section_type: SectionType::JiraSummary,
                description: "Summary of all bug tickets".to_string(),
                source: "ticket_data".to_string(),
                generated_at: generated_at.clone(),
            },
        });
    }

    // Representatives roster.
    let mut rep_lines = vec!["Client Representatives Summary".to_string(), String::new()];
    let mut with_reps = 0usize;
    for client in usage {
        if client.client_representatives.is_empty() {
            rep_lines.push(format!("Client: {}", client.client_name));
            rep_lines.push("  Representative: Not assigned yet".to_string());
        } else {
            with_reps += 1;
            for rep in &client.client_representatives {
                rep_lines.push(format!("Client: {}", client.client_name));
                rep_lines.push(format!("  Representative: {}", rep.full_name));
                rep_lines.push(format!("  Email: {}", rep.email));
            }
        }
        rep_lines.push(String::new());
    }
    rep_lines.push(format!("Total clients: {}", usage.len()));
    rep_lines.push(format!("Clients with representatives: {}", with_reps));
    rep_lines.push(format!(
        "Clients without representatives: {}",
        usage.len() - with_reps
    ));
    chunks.push(KnowledgeChunk {
        id: format!("representatives_summary_{}", ts),
        content: rep_lines.join("\n"),
        metadata: ChunkMetadata {
            client_name: None,
            section_type: SectionType::Representatives,
            description: "Client representatives summary".to_string(),
            source: "usage_data".to_string(),
            generated_at: generated_at.clone(),
        },
    });

    // All-clients usage table with full-data marking.
    let mut table_lines = vec![
        "ALL CLIENTS USAGE SUMMARY".to_string(),
        "=".repeat(50),
        format!("Total Clients: {}", usage.len()),
        String::new(),
        "CLIENTS WITH FULL DATA (Usage + Bug Reports):".to_string(),
    ];
    for client in &settings.full_data_clients {
        table_lines.push(format!("- {}", client));
    }
    table_lines.push(String::new());
    table_lines.push("ALL CLIENTS USAGE TABLE:".to_string());
    table_lines.push(String::new());
    table_lines
        .push("| Client Name | Total Usage | Modules Used | Weeks | Has Bug Data |".to_string());
    table_lines
        .push("|-------------|-------------|--------------|-------|--------------|".to_string());
    for client in usage {
        let has_bug_data = if settings.has_full_data(&client.client_name) {
            "Yes"
        } else {
            "No"
        };
        table_lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            client.client_name,
            client.total_activities(),
            client.modules_used().len(),
            client.usage.len(),
            has_bug_data,
        ));
    }
    table_lines.push(String::new());
    table_lines.push(format!(
        "All {} clients have usage data available.",
        usage.len()
    ));
    chunks.push(KnowledgeChunk {
        id: format!("all_clients_usage_{}", ts),
        content: table_lines.join("\n"),
        metadata: ChunkMetadata {
            client_name: None,
            section_type: SectionType::AllClients,
            description: "Complete list of all clients with usage summary".to_string(),
            source: "usage_data".to_string(),
            generated_at: generated_at.clone(),
        },
    });

    // Plain enumerated client list.
    let mut list = format!(
        "Client List\n\nTotal Number of Clients: {}\n\nList of All Clients:\n",
        usage.len()
    );
    for (i, client) in usage.iter().enumerate() {
        let reps = if client.client_representatives.is_empty() {
            "Not assigned".to_string()
        } else {
            client
                .client_representatives
                .iter()
                .map(|r| r.full_name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        };
        list.push_str(&format!(
            "{}. {} (Representative: {})\n",
            i + 1,
            client.client_name,
            reps
        ));
    }
    list.push_str(&format!(
        "\nSummary:\n- Total clients: {}\n- Clients with full data: {}\n",
        usage.len(),
        settings.full_data_clients.join(", "),
    ));
    chunks.push(KnowledgeChunk {
        id: format!("client_list_{}", ts),
        content: list,
        metadata: ChunkMetadata {
            client_name: None,
            section_type: SectionType::ClientList,
            description: "Simple list of all clients".to_string(),
            source: "usage_data".to_string(),
            generated_at,
        },
    });

    chunks
}

pub struct ChunkingAgent {
    oracle: Arc<dyn Oracle>,
    indexer: Option<Arc<dyn Indexer>>,
    settings: Arc<Settings>,
}

impl ChunkingAgent {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        indexer: Option<Arc<dyn Indexer>>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            oracle,
            indexer,
            settings,
        }
    }

    /// Run the chunking branch: one oracle round-trip, the three-tier parse,
    /// deterministic augmentation, then the full-replace index step.
    pub async fn run(
        &self,
        usage: &[ClientUsage],
        tickets: &[TicketRecord],
    ) -> Result<BranchOutput> {
        info!(
            "Starting knowledge chunking: {} clients, {} tickets",
            usage.len(),
            tickets.len()
        );

        let usage_json = serde_json::to_string_pretty(usage)?;
        let tickets_json = serde_json::to_string_pretty(tickets)?;

        let system = prompts::chunking_system_prompt(&self.settings);
        let prompt = prompts::build_chunking_prompt(&usage_json, &tickets_json);

        let response = self
            .oracle
            .generate(&system, &prompt, self.settings.chunking_temperature)
            .await
            .context("knowledge chunking oracle call failed")?;
        info!(
            "Oracle produced {} characters of narrative",
            response.content.len()
        );

        let now = Local::now();
        let ts = now.format("%Y%m%d_%H%M%S").to_string();
        let generated_at = now.to_rfc3339();

        let mut chunks = parse_narrative(&response.content, &ts, &generated_at);
        chunks.extend(synthesize_chunks(usage, tickets, &self.settings, now));
        info!("Created {} knowledge chunks", chunks.len());

        let mut errors = Vec::new();
        let mut indexed = 0;
        if let Some(indexer) = &self.indexer {
            match indexer.replace_all(&chunks).await {
                Ok(count) => {
                    indexed = count;
                    info!("Indexed {} chunks (previous collection purged)", count);
                }
                Err(err) => {
                    // Indexer unavailability is non-fatal; the chunks are
                    // still returned to the caller.
                    warn!("Indexing failed: {}", err);
                    errors.push(format!("Indexing failed: {}", err));
                }
            }
        }

        Ok(BranchOutput {
            chunking: Some(ChunkingOutput {
                chunks,
                raw_text: response.content,
                indexed,
                ready: indexed > 0,
            }),
            errors,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use retain_core::types::{Activity, Representative, WeeklyUsage};

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn usage_fixture() -> Vec<ClientUsage> {
        vec![
            ClientUsage {
                client_name: "Development".into(),
                usage: vec![WeeklyUsage {
                    activities: vec![Activity {
                        name: "Timesheets".into(),
                        count: 40,
                    }],
                    ..Default::default()
                }],
                client_representatives: vec![Representative {
                    full_name: "Anil Shrestha".into(),
                    email: "anil@example.com".into(),
                }],
            },
            ClientUsage {
                client_name: "Beni Bazar".into(),
                usage: vec![],
                client_representatives: vec![],
            },
        ]
    }

    #[test]
    fn test_tier1_extracts_tagged_sections() {
        let text = format!(
            "[CLIENT OVERVIEW: Development]\n{overview}\n\n[WEEKLY USAGE: Development]\n{weekly}\n\n[BUGS AFFECTING: UB Civil]\nshort",
            overview = "Development recorded 480 activities across 3 modules over 12 weeks, healthy engagement.",
            weekly = "Week 1: 40 activities. Week 2: 38 activities. Steady usage with no concerning gaps at all.",
        );
        let chunks = parse_oracle_sections(&text, "20260302_093000", "2026-03-02T09:30:00");
        assert_eq!(chunks.len(), 2); // the short bugs section is dropped
        assert_eq!(chunks[0].id, "development_overview_20260302_093000");
        assert_eq!(chunks[0].metadata.section_type, SectionType::Overview);
        assert!(chunks[0].content.starts_with("Client: Development"));
        assert_eq!(chunks[1].metadata.section_type, SectionType::Weekly);
    }

    #[test]
    fn test_tier2_splits_on_client_delimiter() {
        let text = "preamble\n===== CLIENT: Development =====\nusage details here\n===== CLIENT: UB Civil =====\nmore details";
        let chunks = parse_narrative(text, "ts", "now");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.client_name.as_deref(), Some("Development"));
        assert_eq!(chunks[0].metadata.section_type, SectionType::Full);
        assert!(chunks[1].content.contains("Client: UB Civil"));
    }

    #[test]
    fn test_tier3_wraps_raw_output() {
        let chunks = parse_narrative("free-form prose with no structure", "ts", "now");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "full_analysis_ts");
        assert_eq!(chunks[0].metadata.section_type, SectionType::Full);
    }

    #[test]
    fn test_synthesized_chunks_are_deterministic() {
        let settings = Settings::from_env();
        let usage = usage_fixture();
        let tickets = vec![TicketRecord {
            key: "BUG-1".into(),
            client_name: "Development".into(),
            summary: "Claims export broken".into(),
            priority: "High".into(),
            status: "Open".into(),
            ..Default::default()
        }];
        let first = synthesize_chunks(&usage, &tickets, &settings, fixed_now());
        let second = synthesize_chunks(&usage, &tickets, &settings, fixed_now());
        assert_eq!(first, second);

        let sections: Vec<SectionType> =
            first.iter().map(|c| c.metadata.section_type).collect();
        assert_eq!(
            sections,
            vec![
                SectionType::JiraTickets,
                SectionType::JiraSummary,
                SectionType::Representatives,
                SectionType::AllClients,
                SectionType::ClientList,
            ]
        );
    }

    #[test]
    fn test_synthesis_without_tickets_skips_ticket_chunks() {
        let settings = Settings::from_env();
        let chunks = synthesize_chunks(&usage_fixture(), &[], &settings, fixed_now());
        assert!(chunks
            .iter()
            .all(|c| c.metadata.section_type != SectionType::JiraTickets));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.section_type == SectionType::AllClients));
    }

    #[test]
    fn test_all_clients_table_marks_full_data_roster() {
        let settings = Settings::from_env();
        let chunks = synthesize_chunks(&usage_fixture(), &[], &settings, fixed_now());
        let table = chunks
            .iter()
            .find(|c| c.metadata.section_type == SectionType::AllClients)
            .unwrap();
        assert!(table.content.contains("| Development | 40 | 1 | 1 | Yes |"));
        assert!(table.content.contains("| Beni Bazar | 0 | 0 | 0 | No |"));
    }

    #[test]
    fn test_roster_chunk_reports_unassigned_clients() {
        let settings = Settings::from_env();
        let chunks = synthesize_chunks(&usage_fixture(), &[], &settings, fixed_now());
        let roster = chunks
            .iter()
            .find(|c| c.metadata.section_type == SectionType::Representatives)
            .unwrap();
        assert!(roster.content.contains("Anil Shrestha"));
        assert!(roster.content.contains("Not assigned yet"));
        assert!(roster.content.contains("Clients with representatives: 1"));
    }
}
