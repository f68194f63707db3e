//! Oracle-reported data-quality issues in extracted statements: missing
//! line items, inconsistencies and anomalies.
//!
//! Issue detection is advisory. An unusable oracle response yields no issues
//! rather than an error.

use crate::mapping::deserialize_confidence;
use crate::parser::recover_json;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingField,
    Inconsistency,
    Anomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIssue {
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub description: String,
    /// Labels of the line items the issue concerns.
    #[serde(default)]
    pub affected_items: Vec<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
}

/// Recover issues from an oracle response. Elements that do not describe an
/// issue are dropped; a response with no usable JSON yields an empty list.
pub fn parse_issue_response(response: &str) -> Vec<DataIssue> {
    let value = match recover_json(response) {
        Ok(value) => value,
        Err(reason) => {
            warn!("Ignoring issue detection response: {}", reason);
            return Vec::new();
        }
    };

    let elements = match value {
        Value::Array(elements) => elements,
        Value::Object(mut obj) => match obj.remove("issues") {
            Some(Value::Array(elements)) => elements,
            Some(_) => {
                warn!("Ignoring issue detection response: 'issues' is not an array");
                return Vec::new();
            }
            None => vec![Value::Object(obj)],
        },
        _ => return Vec::new(),
    };

    let total = elements.len();
    let issues: Vec<DataIssue> = elements
        .into_iter()
        .enumerate()
        .filter_map(|(idx, element)| match serde_json::from_value(element) {
            Ok(issue) => Some(issue),
            Err(e) => {
                warn!("Dropping issue {}: {}", idx, e);
                None
            }
        })
        .collect();

    info!("Parsed {} of {} reported issues", issues.len(), total);
    issues
}
