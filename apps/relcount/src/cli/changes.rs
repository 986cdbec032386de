//! # Change Files
//!
//! JSON array of edge changes applied by `relcount apply`:
//!
//! ```json
//! [
//!   {"op": "create", "label": "KNOWS", "start": 1, "end": 2,
//!    "properties": {"since": 2020, "kind": "friend"}},
//!   {"op": "update", "edge": 0, "properties": {"kind": "colleague"}},
//!   {"op": "delete", "edge": 0}
//! ]
//! ```
//!
//! Property values that are not strings are stored as their JSON text.
//! Property order follows the file.

use relcount_core::RelcountError;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Maximum number of changes in one file.
pub const MAX_CHANGES_PER_FILE: usize = 1_000_000;

/// One edge change read from a change file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeRecord {
    Create {
        label: String,
        start: u64,
        end: u64,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Update {
        edge: u64,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Delete {
        edge: u64,
    },
}

impl ChangeRecord {
    /// Edge properties as the graph stores them.
    #[must_use]
    pub fn properties(&self) -> Vec<(String, String)> {
        match self {
            ChangeRecord::Create { properties, .. } | ChangeRecord::Update { properties, .. } => {
                properties
                    .iter()
                    .map(|(k, v)| (k.clone(), property_text(v)))
                    .collect()
            }
            ChangeRecord::Delete { .. } => Vec::new(),
        }
    }
}

fn property_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a change file.
pub fn parse_changes(contents: &[u8]) -> Result<Vec<ChangeRecord>, RelcountError> {
    let changes: Vec<ChangeRecord> = serde_json::from_slice(contents)
        .map_err(|e| RelcountError::DeserializationError(format!("Change file: {}", e)))?;

    if changes.len() > MAX_CHANGES_PER_FILE {
        return Err(RelcountError::DeserializationError(format!(
            "Change count {} exceeds maximum allowed {}",
            changes.len(),
            MAX_CHANGES_PER_FILE
        )));
    }
    if changes
        .iter()
        .any(|c| matches!(c, ChangeRecord::Create { label, .. } if label.is_empty()))
    {
        return Err(RelcountError::InvalidEvent("empty label".to_string()));
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_operations() {
        let changes = parse_changes(
            br#"[
                {"op": "create", "label": "KNOWS", "start": 1, "end": 2,
                 "properties": {"kind": "friend", "since": 2020}},
                {"op": "update", "edge": 0, "properties": {"kind": "colleague"}},
                {"op": "delete", "edge": 0}
            ]"#,
        )
        .expect("parse");

        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes[0].properties(),
            vec![
                ("kind".to_string(), "friend".to_string()),
                ("since".to_string(), "2020".to_string()),
            ]
        );
        assert!(matches!(changes[1], ChangeRecord::Update { edge: 0, .. }));
        assert_eq!(changes[2], ChangeRecord::Delete { edge: 0 });
    }

    #[test]
    fn properties_default_to_empty() {
        let changes =
            parse_changes(br#"[{"op": "create", "label": "R", "start": 1, "end": 1}]"#)
                .expect("parse");
        assert!(changes[0].properties().is_empty());
    }

    #[test]
    fn rejects_unknown_op_and_empty_label() {
        assert!(parse_changes(br#"[{"op": "merge", "edge": 1}]"#).is_err());
        assert!(
            parse_changes(br#"[{"op": "create", "label": "", "start": 1, "end": 2}]"#).is_err()
        );
        assert!(parse_changes(b"not json").is_err());
    }
}
