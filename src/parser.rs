//! Recover mapping candidates from free-form oracle output.
//!
//! Oracles wrap JSON in markdown fences, prefix it with prose, or return
//! something that is not JSON at all. Recovery is attempted in order (trim,
//! strip fences, bracket-slice, parse) and anything unusable degrades to the
//! default mapping set instead of failing the batch.

use crate::error::Result;
use crate::ingestion::LineItem;
use crate::mapping::MappingCandidate;
use log::{error, info, warn};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Reasoning attached to every candidate of the default (degraded) set.
pub const DEFAULT_MAPPING_REASON: &str = "automatic mapping failed.";
/// Reasoning for line items the oracle left out of an otherwise usable response.
pub const UNANSWERED_MAPPING_REASON: &str = "oracle returned no mapping for this line item.";

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Mapped(Vec<MappingCandidate>),
    /// The response was unusable; `candidates` is the default set.
    Degraded {
        candidates: Vec<MappingCandidate>,
        reason: String,
    },
}

impl ParseOutcome {
    pub fn candidates(&self) -> &[MappingCandidate] {
        match self {
            ParseOutcome::Mapped(candidates) => candidates,
            ParseOutcome::Degraded { candidates, .. } => candidates,
        }
    }

    pub fn into_candidates(self) -> Vec<MappingCandidate> {
        match self {
            ParseOutcome::Mapped(candidates) => candidates,
            ParseOutcome::Degraded { candidates, .. } => candidates,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ParseOutcome::Degraded { .. })
    }

    pub fn degradation_reason(&self) -> Option<&str> {
        match self {
            ParseOutcome::Mapped(_) => None,
            ParseOutcome::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// One candidate per line item: no target, zero confidence.
pub fn default_mappings(line_items: &[LineItem]) -> Vec<MappingCandidate> {
    line_items
        .iter()
        .map(|item| MappingCandidate::unmapped(item, DEFAULT_MAPPING_REASON))
        .collect()
}

pub(crate) fn degraded(line_items: &[LineItem], reason: impl Into<String>) -> ParseOutcome {
    let reason = reason.into();
    warn!(
        "Falling back to default mappings for {} line items: {}",
        line_items.len(),
        reason
    );
    ParseOutcome::Degraded {
        candidates: default_mappings(line_items),
        reason,
    }
}

/// Surface a failed oracle invocation unchanged; parse a successful one.
pub fn parse_oracle_result(
    result: Result<String>,
    line_items: &[LineItem],
) -> Result<ParseOutcome> {
    match result {
        Ok(text) => Ok(parse_mapping_response(&text, line_items)),
        Err(e) => {
            error!("Oracle invocation failed: {}", e);
            Err(e)
        }
    }
}

pub fn parse_mapping_response(response: &str, line_items: &[LineItem]) -> ParseOutcome {
    let value = match recover_json(response) {
        Ok(value) => value,
        Err(reason) => return degraded(line_items, reason),
    };

    let elements = match value {
        Value::Array(elements) => elements,
        Value::Object(mut obj) => match obj.remove("mappings") {
            Some(Value::Array(elements)) => elements,
            Some(_) => return degraded(line_items, "'mappings' is not an array"),
            None => vec![Value::Object(obj)],
        },
        _ => return degraded(line_items, "oracle response JSON is not an array or object"),
    };

    let known_ids: HashSet<&str> = line_items.iter().map(|item| item.id.as_str()).collect();
    let total = elements.len();
    let mut seen = HashSet::new();
    let mut claimed_items = HashSet::new();
    let mut candidates = Vec::with_capacity(total);

    for (idx, element) in elements.iter().enumerate() {
        match parse_element(element, line_items, &mut claimed_items) {
            Ok(candidate) => {
                if !line_items.is_empty() && !known_ids.contains(candidate.source_id.as_str()) {
                    warn!(
                        "Dropping mapping {}: source id '{}' matches no input line item",
                        idx, candidate.source_id
                    );
                    continue;
                }
                if !seen.insert(candidate.source_id.clone()) {
                    warn!(
                        "Mapping {} duplicates source id '{}', keeping the first",
                        idx, candidate.source_id
                    );
                    continue;
                }
                candidates.push(candidate);
            }
            Err(e) => warn!("Dropping mapping {}: {}", idx, e),
        }
    }

    let dropped = total - candidates.len();
    if dropped > 0 {
        warn!(
            "Dropped {} of {} mapping entries from oracle response",
            dropped, total
        );
    }

    if candidates.is_empty() && !line_items.is_empty() {
        return degraded(
            line_items,
            "oracle response contained no valid mapping entries",
        );
    }

    let parsed = candidates.len();
    let unanswered: Vec<&LineItem> = line_items
        .iter()
        .filter(|item| !seen.contains(&item.id))
        .collect();
    if !unanswered.is_empty() {
        warn!(
            "Oracle returned no mapping for {} of {} line items",
            unanswered.len(),
            line_items.len()
        );
        candidates.extend(
            unanswered
                .into_iter()
                .map(|item| MappingCandidate::unmapped(item, UNANSWERED_MAPPING_REASON)),
        );
    }

    info!("Parsed {} mappings from oracle response", parsed);
    ParseOutcome::Mapped(candidates)
}

/// Trim, strip fences and bracket-slice `response`, then parse the payload.
pub(crate) fn recover_json(response: &str) -> std::result::Result<Value, String> {
    let text = strip_code_fences(response.trim());
    let payload = extract_json_payload(text)
        .ok_or_else(|| "no JSON array or object found in oracle response".to_string())?;
    serde_json::from_str(payload).map_err(|e| format!("JSON parse error: {}", e))
}

/// Strip a leading ``` fence (and a language tag on its line) plus the
/// closing fence. Text that does not start with a fence is returned as is.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let body = match rest.find('\n') {
        Some(nl) if is_language_tag(rest[..nl].trim()) => &rest[nl + 1..],
        _ => rest,
    };

    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };

    body.trim()
}

fn is_language_tag(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// Slice from the first `[` or `{` to the last matching closer.
pub(crate) fn extract_json_payload(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '[' || c == '{')?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_element(
    element: &Value,
    line_items: &[LineItem],
    claimed_items: &mut HashSet<usize>,
) -> std::result::Result<MappingCandidate, String> {
    let obj = element
        .as_object()
        .ok_or_else(|| "mapping is not a JSON object".to_string())?;

    let source_id = text_field(obj, &["source_id"]);
    let source_name = text_field(obj, &["source_name", "source_label"]);

    let confidence = number_field(obj, "confidence")
        .ok_or_else(|| "missing or invalid 'confidence'".to_string())?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("confidence {} outside [0, 1]", confidence));
    }

    let (source_id, source_name) = match (source_id, source_name) {
        (Some(id), Some(name)) => (id, name),
        (Some(id), None) => {
            let name = line_items
                .iter()
                .find(|item| item.id == id)
                .map(|item| item.label.clone())
                .ok_or_else(|| format!("missing 'source_name' for unknown source id '{}'", id))?;
            (id, name)
        }
        (None, Some(name)) => {
            let id = claim_by_label(&name, line_items, claimed_items)
                .unwrap_or_else(|| name.clone());
            (id, name)
        }
        (None, None) => return Err("missing 'source_id' and 'source_name'".to_string()),
    };
    if let Some(idx) = line_items.iter().position(|item| item.id == source_id) {
        claimed_items.insert(idx);
    }

    let target_id = text_field(obj, &["target_id", "canonical_code"]);
    let target_name = text_field(obj, &["target_name", "canonical_label"]);
    let reasoning = text_field(obj, &["reasoning"]).unwrap_or_default();

    Ok(MappingCandidate::new(
        source_id,
        source_name,
        target_id,
        target_name,
        confidence,
        reasoning,
    ))
}

// Labels are not unique (the same row can appear under several periods), so
// each line item can be claimed once.
fn claim_by_label(
    label: &str,
    line_items: &[LineItem],
    claimed: &mut HashSet<usize>,
) -> Option<String> {
    let wanted = label.trim();
    let (idx, item) = line_items
        .iter()
        .enumerate()
        .find(|(idx, item)| {
            !claimed.contains(idx) && item.label.trim().eq_ignore_ascii_case(wanted)
        })?;
    claimed.insert(idx);
    Some(item.id.clone())
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match obj.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::StatementType;

    fn items(labels: &[&str]) -> Vec<LineItem> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                LineItem::new(
                    format!("li-{}", i),
                    *label,
                    100.0,
                    "FY2023",
                    StatementType::IncomeStatement,
                )
            })
            .collect()
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let response = "```json\n[{\"source_label\":\"Cash\",\"canonical_code\":\"1000\",\"canonical_label\":\"Cash\",\"confidence\":0.95,\"reasoning\":\"exact\"}]\n```";
        let outcome = parse_mapping_response(response, &items(&["Cash"]));

        assert!(!outcome.is_degraded());
        let candidates = outcome.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].target_id.as_deref(), Some("1000"));
        assert_eq!(candidates[0].target_name.as_deref(), Some("Cash"));
        assert_eq!(candidates[0].source_id, "li-0");
        assert_eq!(candidates[0].reasoning, "exact");
    }

    #[test]
    fn test_not_json_yields_default_set() {
        let line_items = items(&["Revenue", "Rent", "Wages"]);
        let outcome = parse_mapping_response("not json at all", &line_items);

        assert!(outcome.is_degraded());
        let candidates = outcome.candidates();
        assert_eq!(candidates.len(), 3);
        for (candidate, item) in candidates.iter().zip(&line_items) {
            assert_eq!(candidate.confidence, 0.0);
            assert_eq!(candidate.source_id, item.id);
            assert!(candidate.target_id.is_none());
            assert!(candidate.target_name.is_none());
            assert_eq!(candidate.reasoning, DEFAULT_MAPPING_REASON);
        }
    }

    #[test]
    fn test_prose_around_json() {
        let response = r#"Sure! Here are the mappings:
[{"source_id": "li-0", "source_name": "Sales", "target_id": "revenue.product",
  "target_name": "Product Revenue", "confidence": 0.88, "reasoning": "synonym"}]
Let me know if you need anything else."#;
        let outcome = parse_mapping_response(response, &items(&["Sales"]));
        assert_eq!(outcome.candidates()[0].target_id.as_deref(), Some("revenue.product"));
    }

    #[test]
    fn test_malformed_json_degrades() {
        let outcome = parse_mapping_response(
            "[{\"source_name\": \"Cash\", \"confidence\": }]",
            &items(&["Cash"]),
        );
        assert!(outcome.is_degraded());
        assert!(outcome.degradation_reason().unwrap().contains("JSON parse error"));
    }

    #[test]
    fn test_invalid_elements_are_dropped() {
        let response = r#"[
            {"source_id": "li-0", "source_name": "Cash", "target_id": "cash", "confidence": 0.9},
            {"source_name": "Rent"},
            {"source_id": "li-2", "source_name": "Wages", "confidence": 1.4},
            "stray string",
            {"source_id": "li-3", "source_name": "Misc", "target_id": null, "confidence": "0.4"}
        ]"#;
        let outcome = parse_mapping_response(response, &items(&["Cash", "Rent", "Wages", "Misc"]));

        assert!(!outcome.is_degraded());
        let ids: Vec<&str> = outcome.candidates().iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["li-0", "li-3", "li-1", "li-2"]);
        assert!(outcome.candidates()[1].target_id.is_none());
        assert!((outcome.candidates()[1].confidence - 0.4).abs() < f64::EPSILON);
        assert_eq!(outcome.candidates()[2].reasoning, UNANSWERED_MAPPING_REASON);
    }

    #[test]
    fn test_unknown_source_ids_are_dropped() {
        let response = r#"[
            {"source_id": "zzz", "source_name": "Invented", "target_id": "cash", "confidence": 0.95},
            {"source_name": "Goodwill", "target_id": "intangibles", "confidence": 0.93},
            {"source_id": "li-1", "source_name": "Rent", "target_id": "opex.ga", "confidence": 0.8}
        ]"#;
        let outcome = parse_mapping_response(response, &items(&["Cash", "Rent"]));

        assert!(!outcome.is_degraded());
        let ids: Vec<&str> = outcome.candidates().iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["li-1", "li-0"]);
        assert!(outcome.candidates().iter().all(|c| c.confidence < 0.9));
    }

    #[test]
    fn test_only_unknown_ids_degrades() {
        let response = r#"[{"source_id": "zzz", "source_name": "Invented", "confidence": 0.95}]"#;
        let outcome = parse_mapping_response(response, &items(&["Cash", "Rent"]));
        assert!(outcome.is_degraded());
        assert_eq!(outcome.candidates(), default_mappings(&items(&["Cash", "Rent"])).as_slice());
    }

    #[test]
    fn test_every_line_item_gets_one_candidate() {
        let line_items = items(&["Revenue", "Revenue", "Rent", "Wages"]);
        let response = r#"[
            {"source_id": "li-0", "source_name": "Revenue", "target_id": "revenue", "confidence": 0.95},
            {"source_name": "Revenue", "target_id": "revenue", "confidence": 0.9},
            {"source_id": "li-0", "source_name": "Revenue", "target_id": "other", "confidence": 0.5}
        ]"#;
        let outcome = parse_mapping_response(response, &line_items);

        let mut ids: Vec<&str> = outcome
            .candidates()
            .iter()
            .map(|c| c.source_id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["li-0", "li-1", "li-2", "li-3"]);

        let rent = outcome.candidates().iter().find(|c| c.source_id == "li-2").unwrap();
        assert_eq!(rent.confidence, 0.0);
        assert!(rent.target_id.is_none());
        assert_eq!(rent.reasoning, UNANSWERED_MAPPING_REASON);
    }

    #[test]
    fn test_all_elements_invalid_degrades() {
        let outcome = parse_mapping_response(r#"[{"foo": 1}]"#, &items(&["Cash", "Rent"]));
        assert!(outcome.is_degraded());
        assert_eq!(outcome.candidates().len(), 2);
    }

    #[test]
    fn test_duplicate_source_ids_keep_first() {
        let response = r#"[
            {"source_id": "li-0", "source_name": "Cash", "target_id": "a", "confidence": 0.9},
            {"source_id": "li-0", "source_name": "Cash", "target_id": "b", "confidence": 0.8}
        ]"#;
        let outcome = parse_mapping_response(response, &items(&["Cash"]));
        assert_eq!(outcome.candidates().len(), 1);
        assert_eq!(outcome.candidates()[0].target_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_repeated_labels_claim_distinct_items() {
        let line_items = items(&["Revenue", "Revenue"]);
        let response = r#"[
            {"source_name": "Revenue", "target_id": "revenue", "confidence": 0.95},
            {"source_name": "revenue", "target_id": "revenue", "confidence": 0.95}
        ]"#;
        let outcome = parse_mapping_response(response, &line_items);
        let ids: Vec<&str> = outcome.candidates().iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["li-0", "li-1"]);
    }

    #[test]
    fn test_source_id_only_resolves_label() {
        let response = r#"[{"source_id": "li-1", "target_id": 4000, "confidence": 0.75}]"#;
        let outcome = parse_mapping_response(response, &items(&["Cash", "Interest"]));
        let candidate = &outcome.candidates()[0];
        assert_eq!(candidate.source_name, "Interest");
        assert_eq!(candidate.target_id.as_deref(), Some("4000"));
    }

    #[test]
    fn test_single_object_and_wrapped_array() {
        let single =
            r#"{"source_id": "li-0", "source_name": "Cash", "target_id": "cash", "confidence": 0.99}"#;
        assert_eq!(parse_mapping_response(single, &items(&["Cash"])).candidates().len(), 1);

        let wrapped =
            r#"{"mappings": [{"source_id": "li-0", "source_name": "Cash", "confidence": 0.5}]}"#;
        let outcome = parse_mapping_response(wrapped, &items(&["Cash"]));
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.candidates()[0].confidence, 0.5);
    }

    #[test]
    fn test_empty_array_without_items_is_mapped() {
        let outcome = parse_mapping_response("[]", &[]);
        assert_eq!(outcome, ParseOutcome::Mapped(vec![]));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```[1, 2]```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n[\n1\n]"), "[\n1\n]");
        assert_eq!(strip_code_fences("[1]"), "[1]");
    }

    #[test]
    fn test_extract_json_payload() {
        assert_eq!(extract_json_payload("x [1, [2]] y"), Some("[1, [2]]"));
        assert_eq!(extract_json_payload("x {\"a\": [1]} y"), Some("{\"a\": [1]}"));
        assert_eq!(extract_json_payload("] backwards ["), None);
        assert_eq!(extract_json_payload("nothing here"), None);
    }

    #[test]
    fn test_transport_failure_propagates() {
        let result = parse_oracle_result(
            Err(crate::error::MappingError::OracleUnavailable("503".to_string())),
            &items(&["Cash"]),
        );
        assert!(result.unwrap_err().is_retryable());

        let ok = parse_oracle_result(Ok("garbage".to_string()), &items(&["Cash"])).unwrap();
        assert!(ok.is_degraded());
    }
}
