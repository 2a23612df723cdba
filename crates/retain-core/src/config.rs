use std::env;
use std::path::PathBuf;

use crate::error::{RetainError, RetainResult};

/// Platform module vocabulary, referenced by the oracle prompts and the
/// engagement templates.
pub const CORE_MODULES: &[&str] = &[
    "Timesheets",
    "Claims",
    "Tasks",
    "Purchase Orders",
    "Delivery Dockets",
    "Site Diaries",
    "Cost Tracking",
    "Reports",
    "Bills",
    "Scheduling",
    "Dashboard",
    "Daywork Dockets",
    "Variations",
    "Custom Forms",
    "Suppliers",
];

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub password: Option<String>,
    pub recipient: String,
}

impl SmtpSettings {
    pub fn is_configured(&self) -> bool {
        !self.sender.is_empty() && self.password.is_some()
    }
}

/// Process-wide settings, resolved once from the environment at startup and
/// passed by reference into each component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub analysis_temperature: f64,
    pub chunking_temperature: f64,
    pub query_temperature: f64,
    /// None disables the request timeout and restores the original
    /// block-forever behavior.
    pub oracle_timeout_secs: Option<u64>,

    pub data_dir: PathBuf,
    pub usage_file: PathBuf,
    pub tickets_file: PathBuf,
    pub results_file: PathBuf,
    pub debug_response_file: PathBuf,
    pub email_preview_file: PathBuf,
    /// Directory of per-module engagement email templates. The engagement
    /// pass is skipped when it does not exist.
    pub client_templates_dir: PathBuf,

    pub store_path: PathBuf,
    pub collection_name: String,

    pub smtp: SmtpSettings,

    /// Clients with both usage and ticket data; drives the availability
    /// marking in the synthesized all-clients table.
    pub full_data_clients: Vec<String>,
    /// Ticket custom field carrying the explicit client attribution.
    pub client_field: String,
    /// Ticket custom field carrying the affected-modules list.
    pub modules_field: String,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env_string("RETAIN_DATA_DIR", "data"));
        let timeout = env_parse("RETAIN_ORACLE_TIMEOUT_SECS", 120u64);

        Settings {
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: env_string("RETAIN_MODEL", "gemini-2.5-flash"),
            embedding_model: env_string("RETAIN_EMBEDDING_MODEL", "text-embedding-004"),
            analysis_temperature: env_parse("RETAIN_ANALYSIS_TEMPERATURE", 0.3),
            chunking_temperature: env_parse("RETAIN_CHUNKING_TEMPERATURE", 0.2),
            query_temperature: env_parse("RETAIN_QUERY_TEMPERATURE", 0.3),
            oracle_timeout_secs: if timeout == 0 { None } else { Some(timeout) },

            usage_file: data_dir.join(env_string("RETAIN_USAGE_FILE", "usage.json")),
            tickets_file: data_dir.join(env_string("RETAIN_TICKETS_FILE", "tickets.json")),
            results_file: data_dir.join("analysis_results.json"),
            debug_response_file: data_dir.join("debug_oracle_response.txt"),
            email_preview_file: data_dir.join("email_preview.html"),
            client_templates_dir: PathBuf::from(env_string(
                "CLIENT_TEMPLATES_DIR",
                "client_templates",
            )),
            data_dir,

            store_path: PathBuf::from(env_string("RETAIN_STORE_PATH", "./retain_store")),
            collection_name: env_string("RETAIN_COLLECTION", "retention_documents"),

            smtp: SmtpSettings {
                host: env_string("SMTP_HOST", "smtp.gmail.com"),
                port: env_parse("SMTP_PORT", 587u16),
                sender: env_string("EMAIL_SENDER", ""),
                password: env::var("EMAIL_APP_PASSWORD").ok().filter(|p| !p.is_empty()),
                recipient: env_string("EMAIL_RECEIVER", ""),
            },

            full_data_clients: env_string(
                "RETAIN_FULL_DATA_CLIENTS",
                "Development,Construction KaT,UB Civil",
            )
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
            client_field: env_string("RETAIN_CLIENT_FIELD", "customfield_10159"),
            modules_field: env_string("RETAIN_MODULES_FIELD", "customfield_10370"),
        }
    }

    /// Hard precondition: the run does not begin without credentials.
    pub fn require_api_key(&self) -> RetainResult<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            RetainError::Config(
                "GEMINI_API_KEY not set; export it or add it to your environment".to_string(),
            )
        })
    }

    /// True when the client appears in the full-data roster, alias-aware.
    pub fn has_full_data(&self, client_name: &str) -> bool {
        self.full_data_clients
            .iter()
            .any(|c| crate::same_client(c, client_name))
    }
}
