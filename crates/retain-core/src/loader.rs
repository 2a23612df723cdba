//! Input loading for the two source documents: weekly usage records and raw
//! support tickets. Usage data is a hard precondition; ticket data degrades
//! to an empty set when absent.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde_json::Value;

use crate::error::{RetainError, RetainResult};
use crate::types::{ClientUsage, UsageSummary};

/// Load and decode a JSON document. Absence is a `MissingInput` error so the
/// caller can distinguish the hard-precondition case.
pub fn load_json_file(path: &Path) -> RetainResult<Value> {
    if !path.exists() {
        return Err(RetainError::MissingInput(path.display().to_string()));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Load the weekly usage document: an array of client usage objects.
pub fn load_usage_data(path: &Path) -> RetainResult<Vec<ClientUsage>> {
    let value = load_json_file(path)?;
    let records: Vec<ClientUsage> = serde_json::from_value(value)?;
    debug!("Loaded {} client usage records from {}", records.len(), path.display());
    Ok(records)
}

/// Load raw ticket objects, tolerating the three shapes the source system
/// produces: an API envelope with an `issues` list, a bare array, or a
/// single object.
pub fn load_ticket_values(path: &Path) -> RetainResult<Vec<Value>> {
    let value = load_json_file(path)?;
    Ok(ticket_values_from(value))
}

/// Envelope handling shared by the file loader and in-memory inputs.
pub fn ticket_values_from(value: Value) -> Vec<Value> {
    match value {
        Value::Object(mut map) => {
            if let Some(Value::Array(issues)) = map.remove("issues") {
                issues
            } else {
                vec![Value::Object(map)]
            }
        }
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

/// Per-client aggregate summaries: total activity count, distinct modules,
/// weeks of data.
pub fn usage_summary(usage: &[ClientUsage]) -> HashMap<String, UsageSummary> {
    usage
        .iter()
        .map(|client| {
            (
                client.client_name.clone(),
                UsageSummary {
                    total_activities: client.total_activities(),
                    modules_used: client.modules_used(),
                    weeks_of_data: client.usage.len(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_usage_file_is_hard_error() {
        let err = load_usage_data(Path::new("/nonexistent/usage.json")).unwrap_err();
        assert!(matches!(err, RetainError::MissingInput(_)));
    }

    #[test]
    fn test_usage_passthrough() {
        let file = write_temp(
            r#"[{"client_name": "Development", "usage": [
                {"start_range": "2024-01-01", "end_range": "2024-01-07",
                 "previous_activity_week": "w0", "current_activity_week": "w1",
                 "activities": [{"name": "Timesheets", "count": 12}]}
            ]}]"#,
        );
        let records = load_usage_data(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].client_name, "Development");
        assert_eq!(records[0].usage[0].activities[0].count, 12);
    }

    #[test]
    fn test_ticket_envelope_shapes() {
        let envelope = json!({"issues": [{"key": "BUG-1"}, {"key": "BUG-2"}]});
        assert_eq!(ticket_values_from(envelope).len(), 2);

        let bare = json!([{"key": "BUG-1"}]);
        assert_eq!(ticket_values_from(bare).len(), 1);

        let single = json!({"key": "BUG-1"});
        let singles = ticket_values_from(single);
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0]["key"], "BUG-1");

        assert!(ticket_values_from(json!("not tickets")).is_empty());
    }

    #[test]
    fn test_usage_summary_counts() {
        let usage = vec![ClientUsage {
            client_name: "A".into(),
            usage: vec![crate::types::WeeklyUsage {
                activities: vec![
                    crate::types::Activity {
                        name: "Claims".into(),
                        count: 3,
                    },
                    crate::types::Activity {
                        name: "Bills".into(),
                        count: 4,
                    },
                ],
                ..Default::default()
            }],
            client_representatives: vec![],
        }];
        let summary = usage_summary(&usage);
        let a = &summary["A"];
        assert_eq!(a.total_activities, 7);
        assert_eq!(a.weeks_of_data, 1);
        assert_eq!(a.modules_used.len(), 2);
    }
}
