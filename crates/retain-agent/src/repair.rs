//! Multi-tier recovery of the oracle's risk-assessment JSON. The tiers are
//! ordered, independently testable strategies: direct parse, regex repair,
//! then per-object salvage. Terminal failure yields an empty list, never a
//! panic or an error out of the classifier.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use retain_core::types::ClientRiskAssessment;

/// Which recovery tier produced the records, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Direct,
    Repaired,
    Salvaged,
    Failed,
}

static TRAILING_COMMA_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]").expect("trailing comma pattern"));
static TRAILING_COMMA_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\}").expect("trailing comma pattern"));
static OBJECT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}\s*\{").expect("object boundary pattern"));
/// A quoted value followed by a newline and a quoted key with no comma
/// between them.
static MISSING_COMMA_AFTER_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""\s*\n\s*"([A-Za-z_])"#).expect("string pair pattern"));
/// Balanced-brace object candidate, one level of nesting deep.
static OBJECT_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("object pattern"));

/// Strip a leading/trailing markdown code fence if present.
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Locate the outermost `[...]` span. None when no array brackets exist.
pub fn extract_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// The fixed repair sequence of state B: trailing commas, missing commas at
/// object boundaries, missing commas between adjacent quoted pairs.
pub fn apply_repairs(json_str: &str) -> String {
    let fixed = TRAILING_COMMA_BRACKET.replace_all(json_str, "]");
    let fixed = TRAILING_COMMA_BRACE.replace_all(&fixed, "}");
    let fixed = OBJECT_BOUNDARY.replace_all(&fixed, "},{");
    MISSING_COMMA_AFTER_STRING
        .replace_all(&fixed, "\",\n\"$1")
        .into_owned()
}

/// State C: scan for balanced-brace candidates, parse each independently
/// with the per-object trailing-comma fix, and keep only objects that carry
/// a `client_name`.
pub fn salvage_objects(json_str: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    for candidate in OBJECT_CANDIDATE.find_iter(json_str) {
        let fixed = TRAILING_COMMA_BRACE.replace_all(candidate.as_str(), "}");
        let fixed = TRAILING_COMMA_BRACKET.replace_all(&fixed, "]");
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&fixed) {
            if map.contains_key("client_name") {
                objects.push(Value::Object(map));
            }
        }
    }
    objects
}

/// Coerce one parsed object into a `ClientRiskAssessment`. A record that
/// parsed as part of the array is always kept, even without a client name;
/// the name requirement belongs to the salvage tier alone. Fields that miss
/// the strict schema degrade one by one rather than rejecting the record.
pub fn coerce_assessment(value: Value) -> ClientRiskAssessment {
    match serde_json::from_value::<ClientRiskAssessment>(value.clone()) {
        Ok(assessment) => assessment,
        Err(err) => {
            let client_name = value
                .get("client_name")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            debug!(
                "Assessment for {:?} needs field coercion: {}",
                client_name, err
            );
            coerce_fields(client_name, value)
        }
    }
}

/// Field-by-field salvage for objects that miss the strict schema: numbers
/// that arrived as strings, module entries that arrived as bare names.
fn coerce_fields(client_name: String, value: Value) -> ClientRiskAssessment {
    let mut assessment = ClientRiskAssessment {
        client_name,
        ..Default::default()
    };

    let get = |key: &str| value.get(key);

    if let Some(risk) = get("risk_factor").and_then(Value::as_str) {
        assessment.risk_factor = risk.to_string();
    }
    if let Some(trend) = get("usage_trend").and_then(Value::as_str) {
        assessment.usage_trend = trend.to_string();
    }
    if let Some(summary) = get("summary").and_then(Value::as_str) {
        assessment.summary = summary.to_string();
    }
    assessment.churn_probability = lenient_f64(get("churn_probability"));
    assessment.trend_percentage = lenient_f64(get("trend_percentage"));
    assessment.usage_health_score = lenient_f64(get("usage_health_score"));
    assessment.total_usage_count = lenient_f64(get("total_usage_count")) as u64;
    assessment.total_modules_used = lenient_f64(get("total_modules_used")) as u64;
    assessment.weeks_active = lenient_f64(get("weeks_active")) as u32;
    assessment.active_modules = string_list(get("active_modules"));
    assessment.least_used_modules = string_list(get("least_used_modules"));
    assessment.key_concerns = string_list(get("key_concerns"));
    assessment.recommendations = string_list(get("recommendations"));

    if let Some(Value::Array(modules)) = get("most_used_modules") {
        for entry in modules {
            match serde_json::from_value(entry.clone()) {
                Ok(module) => assessment.most_used_modules.push(module),
                Err(_) => {
                    if let Some(name) = entry.as_str() {
                        assessment
                            .most_used_modules
                            .push(retain_core::types::ModuleCount {
                                name: name.to_string(),
                                count: 0,
                            });
                    }
                }
            }
        }
    }
    if let Some(Value::Array(tickets)) = get("bug_tickets_affecting") {
        for entry in tickets {
            if let Ok(ticket) = serde_json::from_value(entry.clone()) {
                assessment.bug_tickets_affecting.push(ticket);
            }
        }
    }

    assessment
}

fn lenient_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn assessments_from(value: Value) -> Vec<ClientRiskAssessment> {
    match value {
        Value::Array(items) => items.into_iter().map(coerce_assessment).collect(),
        Value::Object(_) => vec![coerce_assessment(value)],
        _ => Vec::new(),
    }
}

/// The full parsing state machine over a raw oracle response. States are
/// attempted in strict order; the first one yielding records wins.
pub fn parse_assessments(raw: &str) -> (Vec<ClientRiskAssessment>, RepairOutcome) {
    let cleaned = strip_code_fences(raw);
    let span = extract_array_span(cleaned).unwrap_or(cleaned);

    // State A: direct parse.
    if let Ok(value) = serde_json::from_str::<Value>(span) {
        let records = assessments_from(value);
        if !records.is_empty() {
            return (records, RepairOutcome::Direct);
        }
    }

    // State B: regex repairs, then reparse.
    let repaired = apply_repairs(span);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        let records = assessments_from(value);
        if !records.is_empty() {
            debug!("Recovered assessment array after regex repair");
            return (records, RepairOutcome::Repaired);
        }
    }

    // State C: per-object salvage.
    let salvaged: Vec<ClientRiskAssessment> = salvage_objects(span)
        .into_iter()
        .map(coerce_assessment)
        .collect();
    if !salvaged.is_empty() {
        warn!(
            "Recovered {} client objects from malformed response",
            salvaged.len()
        );
        return (salvaged, RepairOutcome::Salvaged);
    }

    (Vec::new(), RepairOutcome::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_a_recovers_valid_array() {
        let raw = "```json\n[{\"client_name\": \"Development\", \"risk_factor\": \"low\"}]\n```";
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Direct);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].client_name, "Development");
        assert_eq!(records[0].risk_factor, "low");
    }

    #[test]
    fn test_state_a_ignores_prose_around_the_array() {
        let raw = "Here is your analysis:\n[{\"client_name\": \"A\"}]\nLet me know!";
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Direct);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_state_b_trailing_comma_yields_both_records() {
        // End-to-end scenario: trailing comma before the closing bracket.
        let raw = r#"[
            {"client_name": "A", "risk_factor": "high", "churn_probability": 85},
            {"client_name": "B", "risk_factor": "low", "churn_probability": 10},
        ]"#;
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Repaired);
        assert_eq!(records.len(), 2);
        let risky: Vec<_> = records.iter().filter(|r| r.is_risky()).collect();
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].client_name, "A");
    }

    #[test]
    fn test_state_b_missing_object_boundary_comma() {
        let raw = r#"[{"client_name": "A", "risk_factor": "low"}
            {"client_name": "B", "risk_factor": "high"}]"#;
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Repaired);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_state_b_missing_comma_between_quoted_pairs() {
        let raw = "[{\"client_name\": \"A\", \"risk_factor\": \"low\"\n\"summary\": \"fine\"}]";
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Repaired);
        assert_eq!(records[0].summary, "fine");
    }

    #[test]
    fn test_state_c_salvages_only_objects_with_client_name() {
        let raw = r#"The model rambled [ {"client_name": "A", "risk_factor": "medium"}
            broken {{{ garbage
            {"no_name": true}
            {"client_name": "B", "risk_factor": "low",} more garbage"#;
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Salvaged);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client_name, "A");
        assert_eq!(records[1].client_name, "B");
    }

    #[test]
    fn test_terminal_failure_is_empty_not_panic() {
        let (records, outcome) = parse_assessments("no json here at all");
        assert_eq!(outcome, RepairOutcome::Failed);
        assert!(records.is_empty());
    }

    #[test]
    fn test_coercion_tolerates_numeric_strings_and_bare_module_names() {
        let value = serde_json::json!({
            "client_name": "Development",
            "risk_factor": "high",
            "churn_probability": "85%",
            "total_usage_count": "412",
            "most_used_modules": ["Timesheets", {"name": "Claims", "count": 9}],
            "key_concerns": ["declining usage"],
        });
        let assessment = coerce_assessment(value);
        assert_eq!(assessment.churn_probability, 85.0);
        assert_eq!(assessment.total_usage_count, 412);
        assert_eq!(assessment.most_used_modules.len(), 2);
        assert_eq!(assessment.most_used_modules[0].name, "Timesheets");
        assert_eq!(assessment.most_used_modules[1].count, 9);
    }

    #[test]
    fn test_parsed_array_keeps_nameless_records() {
        // A record the array parse delivered stays in the result set even
        // without a client name; only the salvage tier requires one.
        let raw = r#"[{"client_name": "A", "risk_factor": "low"}, {"risk_factor": "high"}]"#;
        let (records, outcome) = parse_assessments(raw);
        assert_eq!(outcome, RepairOutcome::Direct);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client_name, "A");
        assert_eq!(records[1].client_name, "");
        assert_eq!(records[1].risk_factor, "high");
    }
}
