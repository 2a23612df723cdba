//! Ticket normalizer: raw heterogeneous ticket objects into the canonical
//! `TicketRecord` schema. Attribution is a total function; no record is ever
//! dropped for missing fields.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use retain_core::canonical_client_name;
use retain_core::config::Settings;
use retain_core::types::TicketRecord;

static CLIENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Client:\s*([^\n]+)").expect("client pattern"));

static MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Module:\s*([^\n]+)").expect("module pattern"));

/// Trailing parenthetical at the end of a summary line, e.g.
/// `Claims export format inconsistent (Construction KaT)`.
static SUMMARY_CLIENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]+)\)\s*$").expect("summary pattern"));

/// Flatten the nested rich-text description structure: paragraphs containing
/// text runs, joined with single spaces. Any malformed shape yields "".
pub fn flatten_description(description: &Value) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(blocks) = description.get("content").and_then(Value::as_array) {
        for block in blocks {
            if block.get("type").and_then(Value::as_str) != Some("paragraph") {
                continue;
            }
            if let Some(items) = block.get("content").and_then(Value::as_array) {
                for item in items {
                    if item.get("type").and_then(Value::as_str) == Some("text") {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            parts.push(text);
                        }
                    }
                }
            }
        }
    }
    parts.join(" ")
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Client attribution, first match wins: explicit custom field (unless it is
/// the literal "Unknown" placeholder), then a `Client:` marker in the
/// description, then a trailing parenthetical in the summary, then "Unknown".
fn attribute_client(fields: &Value, description: &str, settings: &Settings) -> String {
    let explicit = fields
        .get(&settings.client_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != "Unknown");
    if let Some(client) = explicit {
        return canonical_client_name(client);
    }

    if let Some(client) = first_capture(&CLIENT_RE, description) {
        return canonical_client_name(&client);
    }

    if let Some(summary) = fields.get("summary").and_then(Value::as_str) {
        if let Some(client) = first_capture(&SUMMARY_CLIENT_RE, summary) {
            return canonical_client_name(&client);
        }
    }

    "Unknown".to_string()
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        // Ids sometimes arrive numeric.
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn named_field(fields: &Value, key: &str) -> String {
    fields
        .get(key)
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

fn affected_modules(fields: &Value, settings: &Settings) -> Vec<String> {
    fields
        .get(&settings.modules_field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("value").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Normalize one raw ticket object. Never fails: every missing or malformed
/// field collapses to an empty or "Unknown" value.
pub fn normalize_ticket(raw: &Value, settings: &Settings) -> TicketRecord {
    let empty = Value::Object(Default::default());
    let fields = raw.get("fields").unwrap_or(&empty);

    let description = fields
        .get("description")
        .map(flatten_description)
        .unwrap_or_default();

    let labels: Vec<String> = fields
        .get("labels")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let affected_module = first_capture(&MODULE_RE, &description)
        .or_else(|| labels.first().cloned())
        .unwrap_or_default();

    TicketRecord {
        key: string_field(raw, "key"),
        id: string_field(raw, "id"),
        client_name: attribute_client(fields, &description, settings),
        summary: string_field(fields, "summary"),
        description,
        priority: named_field(fields, "priority"),
        status: named_field(fields, "status"),
        created: string_field(fields, "created"),
        updated: string_field(fields, "updated"),
        affected_module,
        affected_modules: affected_modules(fields, settings),
        labels,
    }
}

/// Normalize a whole batch, preserving input order.
pub fn normalize_tickets(raw: &[Value], settings: &Settings) -> Vec<TicketRecord> {
    raw.iter().map(|t| normalize_ticket(t, settings)).collect()
}

/// Group normalized tickets by canonical client name, sorted by name for
/// deterministic iteration.
pub fn group_by_client(tickets: &[TicketRecord]) -> BTreeMap<String, Vec<&TicketRecord>> {
    let mut grouped: BTreeMap<String, Vec<&TicketRecord>> = BTreeMap::new();
    for ticket in tickets {
        grouped
            .entry(canonical_client_name(&ticket.client_name))
            .or_default()
            .push(ticket);
    }
    grouped
}
