// crates/retain-core/src/types.rs
use serde::{Deserialize, Serialize};

// ============== INPUT RECORDS ==============

/// A single activity entry inside a usage week. Activity names follow the
/// platform module vocabulary but unknown names are carried through as-is.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Activity {
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// One week of usage for a client.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WeeklyUsage {
    #[serde(default)]
    pub start_range: String,
    #[serde(default)]
    pub end_range: String,
    #[serde(default)]
    pub previous_activity_week: String,
    #[serde(default)]
    pub current_activity_week: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Representative {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

/// Complete weekly usage history for one client. Twelve weeks are expected
/// but the length is not enforced.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ClientUsage {
    pub client_name: String,
    #[serde(default)]
    pub usage: Vec<WeeklyUsage>,
    #[serde(default)]
    pub client_representatives: Vec<Representative>,
}

impl ClientUsage {
    /// Sum of every activity count across all weeks.
    pub fn total_activities(&self) -> u64 {
        self.usage
            .iter()
            .flat_map(|w| w.activities.iter())
            .map(|a| a.count)
            .sum()
    }

    /// Distinct module names seen across all weeks, in first-seen order.
    pub fn modules_used(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for week in &self.usage {
            for activity in &week.activities {
                if !seen.contains(&activity.name) {
                    seen.push(activity.name.clone());
                }
            }
        }
        seen
    }
}

/// Lightweight per-client aggregate computed by the usage normalizer.
#[derive(Debug, Serialize, Clone)]
pub struct UsageSummary {
    pub total_activities: u64,
    pub modules_used: Vec<String>,
    pub weeks_of_data: usize,
}

/// A support ticket flattened into the canonical schema. Created once by the
/// ticket normalizer and immutable afterward; no field ever causes a record
/// to be dropped.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct TicketRecord {
    pub key: String,
    pub id: String,
    pub client_name: String,
    pub summary: String,
    pub description: String,
    pub priority: String,
    pub status: String,
    pub created: String,
    pub updated: String,
    pub affected_module: String,
    #[serde(default)]
    pub affected_modules: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

// ============== RISK ASSESSMENT ==============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    /// Case-insensitive parse; anything outside the vocabulary is None.
    pub fn parse(s: &str) -> Option<RiskLevel> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(RiskLevel::High),
            "medium" => Some(RiskLevel::Medium),
            "low" => Some(RiskLevel::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageTrend {
    Increasing,
    Decreasing,
    Stable,
    Inactive,
}

/// Reference to a bug ticket affecting an assessed client.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct BugTicketRef {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ModuleCount {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// One client's churn-risk assessment as produced by the oracle.
///
/// `risk_factor` and `usage_trend` stay as raw strings: the oracle does not
/// always honor the vocabulary, and an unparseable-but-named client must be
/// retained in the full result set (it is merely excluded from notification).
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ClientRiskAssessment {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub risk_factor: String,
    #[serde(default)]
    pub churn_probability: f64,
    #[serde(default)]
    pub total_usage_count: u64,
    #[serde(default)]
    pub total_modules_used: u64,
    #[serde(default)]
    pub active_modules: Vec<String>,
    #[serde(default)]
    pub most_used_modules: Vec<ModuleCount>,
    #[serde(default)]
    pub least_used_modules: Vec<String>,
    #[serde(default)]
    pub usage_trend: String,
    #[serde(default)]
    pub trend_percentage: f64,
    #[serde(default)]
    pub weeks_active: u32,
    #[serde(default)]
    pub bug_tickets_affecting: Vec<BugTicketRef>,
    #[serde(default)]
    pub usage_health_score: f64,
    #[serde(default)]
    pub key_concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl ClientRiskAssessment {
    pub fn risk_level(&self) -> Option<RiskLevel> {
        RiskLevel::parse(&self.risk_factor)
    }

    /// Risky clients trigger notification: risk factor high or medium,
    /// case-insensitive.
    pub fn is_risky(&self) -> bool {
        matches!(
            self.risk_level(),
            Some(RiskLevel::High) | Some(RiskLevel::Medium)
        )
    }
}

// ============== KNOWLEDGE CHUNKS ==============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Overview,
    Weekly,
    Modules,
    Bugs,
    Trends,
    Representative,
    JiraTickets,
    JiraSummary,
    Representatives,
    AllClients,
    ClientList,
    Full,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Overview => "overview",
            SectionType::Weekly => "weekly",
            SectionType::Modules => "modules",
            SectionType::Bugs => "bugs",
            SectionType::Trends => "trends",
            SectionType::Representative => "representative",
            SectionType::JiraTickets => "jira_tickets",
            SectionType::JiraSummary => "jira_summary",
            SectionType::Representatives => "representatives",
            SectionType::AllClients => "all_clients",
            SectionType::ClientList => "client_list",
            SectionType::Full => "full",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub client_name: Option<String>,
    pub section_type: SectionType,
    #[serde(default)]
    pub description: String,
    pub source: String,
    pub generated_at: String,
}

/// A self-contained unit of retrievable text. Every chunk embeds the client
/// name in its content so it is interpretable without its siblings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KnowledgeChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

// ============== RUN STATE ==============

/// Output slot contributed by the analysis branch.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutput {
    pub assessments: Vec<ClientRiskAssessment>,
    pub risky: Vec<ClientRiskAssessment>,
    pub raw_response: String,
}

/// Output slot contributed by the chunking branch.
#[derive(Debug, Clone, Default)]
pub struct ChunkingOutput {
    pub chunks: Vec<KnowledgeChunk>,
    pub raw_text: String,
    pub indexed: usize,
    pub ready: bool,
}

/// One client's engagement-email attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EngagementOutcome {
    pub client_name: String,
    /// Module whose template was promoted, when one was selected.
    pub module: Option<String>,
    pub detail: String,
}

/// Tally of the per-client engagement pass run after the team report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngagementSummary {
    pub sent: Vec<EngagementOutcome>,
    pub skipped: Vec<EngagementOutcome>,
    pub failed: Vec<EngagementOutcome>,
}

/// Output slot contributed by the notifier, sequenced after analysis.
#[derive(Debug, Clone, Default)]
pub struct NotifyOutput {
    pub sent: bool,
    pub recipient: String,
    pub subject: String,
    pub detail: String,
    /// Present when the per-client engagement pass ran.
    pub engagement: Option<EngagementSummary>,
}

/// What one pipeline branch hands back to the orchestrator: at most one
/// output slot plus any errors it accumulated along the way.
#[derive(Debug, Default)]
pub struct BranchOutput {
    pub analysis: Option<AnalysisOutput>,
    pub chunking: Option<ChunkingOutput>,
    pub notify: Option<NotifyOutput>,
    pub errors: Vec<String>,
}

/// The shared result bag threaded through the pipeline. Each stage fills
/// only its own slot; `errors` is the sole additive field merged across
/// stages.
#[derive(Debug, Default)]
pub struct RunState {
    pub analysis: Option<AnalysisOutput>,
    pub chunking: Option<ChunkingOutput>,
    pub notify: Option<NotifyOutput>,
    pub errors: Vec<String>,
}

impl RunState {
    /// Merge a branch's output into the run state. Filling an already-filled
    /// slot violates the additive-keys-only discipline and is rejected.
    pub fn merge(&mut self, branch: BranchOutput) -> anyhow::Result<()> {
        if let Some(analysis) = branch.analysis {
            if self.analysis.is_some() {
                anyhow::bail!("analysis slot already filled");
            }
            self.analysis = Some(analysis);
        }
        if let Some(chunking) = branch.chunking {
            if self.chunking.is_some() {
                anyhow::bail!("chunking slot already filled");
            }
            self.chunking = Some(chunking);
        }
        if let Some(notify) = branch.notify {
            if self.notify.is_some() {
                anyhow::bail!("notify slot already filled");
            }
            self.notify = Some(notify);
        }
        self.errors.extend(branch.errors);
        Ok(())
    }

    /// Risky clients from the analysis slot, empty when analysis is absent.
    pub fn risky_clients(&self) -> &[ClientRiskAssessment] {
        self.analysis
            .as_ref()
            .map(|a| a.risky.as_slice())
            .unwrap_or(&[])
    }
}
