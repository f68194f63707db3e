// Prompt construction for chart-of-accounts mapping.

use crate::chart_of_accounts::AccountEntry;
use crate::config::MAX_COA_SAMPLE;
use crate::error::Result;
use crate::ingestion::{LineItem, StatementType};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

pub const MAPPING_ROLE_PROMPT: &str = "You are an expert accountant with deep knowledge of financial statements across industries. Your task is to map source financial statement line items to a canonical chart of accounts (COA).";

pub const MAPPING_INSTRUCTIONS: &str = r#"INSTRUCTIONS:
1. Map each source line item to the most appropriate canonical account from the COA above.
2. Consider aliases, abbreviations and industry-specific terminology.
3. Use the source item's "id" as "source_id" and its "name" as "source_name".
4. If no account fits, set "target_id" and "target_name" to null and use a confidence below 0.5.
5. Confidence scale:
   - >= 0.9: exact match
   - 0.8-0.99: strong match
   - 0.5-0.79: probable match
   - < 0.5: uncertain
6. Review thresholds applied to your confidence:
   - > 0.9: auto-approved
   - 0.7-0.9: needs review
   - < 0.7: manual mapping required
7. Explain your reasoning for each mapping in one sentence.

Return ONLY a JSON array with exactly this structure, one element per source line item:"#;

pub const ISSUE_DETECTION_PROMPT: &str = "You are a financial analysis expert. Review the extracted line items below and identify:
1. Missing critical line items
2. Inconsistencies or anomalies
3. Fields that should exist but don't";

const ISSUE_RESPONSE_FORMAT: &str = r#"Return a JSON array of issues:
[
  {
    "issue_type": "missing_field" | "inconsistency" | "anomaly",
    "severity": "error" | "warning" | "info",
    "description": "Description of the issue",
    "affected_items": ["list", "of", "items"],
    "suggestion": "How to fix it",
    "confidence": 0.85
  }
]

Return ONLY the JSON array. Return [] if there are no issues."#;

/// One element of the array the oracle is asked to return.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExpectedMapping {
    #[schemars(description = "The source line item's id, copied verbatim")]
    pub source_id: String,
    #[schemars(description = "The source line item's name, copied verbatim")]
    pub source_name: String,
    #[schemars(description = "Canonical account id, or null when no account fits")]
    pub target_id: Option<String>,
    #[schemars(description = "Canonical account name, or null when no account fits")]
    pub target_name: Option<String>,
    #[schemars(description = "Match confidence between 0.0 and 1.0")]
    pub confidence: f64,
    #[schemars(description = "One-sentence explanation of the mapping")]
    pub reasoning: String,
}

impl ExpectedMapping {
    fn example() -> Self {
        Self {
            source_id: "source item id".to_string(),
            source_name: "Original Label".to_string(),
            target_id: Some("canonical account id".to_string()),
            target_name: Some("Canonical Account Name".to_string()),
            confidence: 0.95,
            reasoning: "Brief explanation".to_string(),
        }
    }
}

#[derive(Serialize)]
struct PromptLineItem<'a> {
    id: &'a str,
    name: &'a str,
    value: f64,
    period: &'a str,
    #[serde(rename = "type")]
    statement_type: StatementType,
}

impl<'a> From<&'a LineItem> for PromptLineItem<'a> {
    fn from(item: &'a LineItem) -> Self {
        Self {
            id: &item.id,
            name: &item.label,
            value: item.value,
            period: &item.period,
            statement_type: item.statement_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappingPromptBuilder {
    coa_sample_limit: usize,
}

impl Default for MappingPromptBuilder {
    fn default() -> Self {
        Self::new(MAX_COA_SAMPLE)
    }
}

impl MappingPromptBuilder {
    /// `coa_sample_limit` is capped at [`MAX_COA_SAMPLE`].
    pub fn new(coa_sample_limit: usize) -> Self {
        Self {
            coa_sample_limit: coa_sample_limit.min(MAX_COA_SAMPLE),
        }
    }

    pub fn coa_sample_limit(&self) -> usize {
        self.coa_sample_limit
    }

    /// Build the mapping prompt. Identical inputs always produce an identical
    /// prompt. Only the first `coa_sample_limit` COA entries are included.
    pub fn build(
        &self,
        line_items: &[LineItem],
        coa_sample: &[AccountEntry],
        statement_type: StatementType,
        context: Option<&str>,
    ) -> Result<String> {
        let coa = &coa_sample[..coa_sample.len().min(self.coa_sample_limit)];
        let items: Vec<PromptLineItem> = line_items.iter().map(PromptLineItem::from).collect();

        let context_block = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("ADDITIONAL CONTEXT:\n{}\n\n", context),
            None => String::new(),
        };

        Ok(format!(
            "{role}\n\n\
             STATEMENT TYPE: {statement_type}\n\n\
             {context_block}\
             CANONICAL CHART OF ACCOUNTS ({coa_count} entries):\n{coa}\n\n\
             SOURCE LINE ITEMS:\n{items}\n\n\
             {instructions}\n{example}\n\n\
             CRITICAL: Return ONLY the JSON array, no additional text or explanation outside the JSON.",
            role = MAPPING_ROLE_PROMPT,
            statement_type = statement_type,
            context_block = context_block,
            coa_count = coa.len(),
            coa = serde_json::to_string_pretty(coa)?,
            items = serde_json::to_string_pretty(&items)?,
            instructions = MAPPING_INSTRUCTIONS,
            example = serde_json::to_string_pretty(&[ExpectedMapping::example()])?,
        ))
    }
}

impl MappingPromptBuilder {
    /// Prompt asking the oracle to review `line_items` for missing fields,
    /// inconsistencies and anomalies.
    pub fn build_issue_check(
        &self,
        line_items: &[LineItem],
        statement_type: StatementType,
    ) -> Result<String> {
        let items: Vec<PromptLineItem> = line_items.iter().map(PromptLineItem::from).collect();

        Ok(format!(
            "{prompt}\n\n\
             STATEMENT TYPE: {statement_type}\n\n\
             LINE ITEMS:\n{items}\n\n\
             {format}",
            prompt = ISSUE_DETECTION_PROMPT,
            statement_type = statement_type,
            items = serde_json::to_string_pretty(&items)?,
            format = ISSUE_RESPONSE_FORMAT,
        ))
    }
}

/// JSON Schema for the expected response array, reduced to the subset
/// Gemini's `responseSchema` accepts (no `$schema`, `title` or `definitions`,
/// nullable types expressed with `nullable`).
pub fn response_schema() -> Result<Value> {
    let settings = schemars::gen::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let root = settings
        .into_generator()
        .into_root_schema_for::<Vec<ExpectedMapping>>();
    let mut value = serde_json::to_value(root)?;
    clean_schema(&mut value);
    Ok(value)
}

fn clean_schema(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("title");
            map.remove("definitions");
            map.remove("format");

            if let Some(Value::Array(types)) = map.get("type").cloned() {
                let non_null: Vec<Value> = types.into_iter().filter(|t| t != "null").collect();
                if non_null.len() == 1 {
                    map.insert("type".to_string(), non_null[0].clone());
                    map.insert("nullable".to_string(), Value::Bool(true));
                }
            }

            for child in map.values_mut() {
                clean_schema(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                clean_schema(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::ChartOfAccounts;

    fn line_items() -> Vec<LineItem> {
        vec![
            LineItem::new(
                "li-0",
                "Product Sales",
                1_200_000.0,
                "FY2023",
                StatementType::IncomeStatement,
            ),
            LineItem::new("li-1", "Wages", 300_000.0, "FY2023", StatementType::IncomeStatement),
        ]
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let builder = MappingPromptBuilder::default();
        let coa = ChartOfAccounts::default_template().flatten();
        let a = builder
            .build(&line_items(), &coa, StatementType::IncomeStatement, Some("SaaS company"))
            .unwrap();
        let b = builder
            .build(&line_items(), &coa, StatementType::IncomeStatement, Some("SaaS company"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_contents() {
        let builder = MappingPromptBuilder::default();
        let coa = ChartOfAccounts::default_template().flatten();
        let prompt = builder
            .build(&line_items(), &coa, StatementType::IncomeStatement, Some("SaaS company"))
            .unwrap();

        assert!(prompt.contains("STATEMENT TYPE: income_statement"));
        assert!(prompt.contains("ADDITIONAL CONTEXT:\nSaaS company"));
        assert!(prompt.contains("\"id\": \"li-0\""));
        assert!(prompt.contains("\"name\": \"Product Sales\""));
        assert!(prompt.contains("\"type\": \"income_statement\""));
        assert!(prompt.contains("\"id\": \"opex.rd\""));
        assert!(prompt.contains("0.8-0.99: strong match"));
        assert!(prompt.contains("\"source_id\""));
        assert!(prompt.contains("\"target_name\""));
    }

    #[test]
    fn test_context_block_omitted_when_blank() {
        let builder = MappingPromptBuilder::default();
        let prompt = builder
            .build(&line_items(), &[], StatementType::BalanceSheet, Some("   "))
            .unwrap();
        assert!(!prompt.contains("ADDITIONAL CONTEXT"));
        assert!(prompt.contains("(0 entries)"));
    }

    #[test]
    fn test_coa_sample_is_capped() {
        let coa: Vec<AccountEntry> = (0..80)
            .map(|i| AccountEntry {
                id: format!("acct-{:03}", i),
                name: format!("Account {}", i),
                parent_id: None,
            })
            .collect();

        let prompt = MappingPromptBuilder::new(500)
            .build(&line_items(), &coa, StatementType::IncomeStatement, None)
            .unwrap();
        assert!(prompt.contains("(50 entries)"));
        assert!(prompt.contains("acct-049"));
        assert!(!prompt.contains("acct-050"));

        let prompt = MappingPromptBuilder::new(10)
            .build(&line_items(), &coa, StatementType::IncomeStatement, None)
            .unwrap();
        assert!(!prompt.contains("acct-010"));
    }

    #[test]
    fn test_issue_check_prompt() {
        let builder = MappingPromptBuilder::default();
        let prompt = builder
            .build_issue_check(&line_items(), StatementType::IncomeStatement)
            .unwrap();

        assert!(prompt.starts_with(ISSUE_DETECTION_PROMPT));
        assert!(prompt.contains("STATEMENT TYPE: income_statement"));
        assert!(prompt.contains("\"name\": \"Wages\""));
        assert!(prompt.contains("\"issue_type\": \"missing_field\""));
        assert_eq!(
            prompt,
            builder
                .build_issue_check(&line_items(), StatementType::IncomeStatement)
                .unwrap()
        );
    }

    #[test]
    fn test_response_schema_is_clean() {
        let schema = response_schema().unwrap();
        let text = schema.to_string();
        assert!(!text.contains("$schema"));
        assert!(!text.contains("definitions"));
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["properties"]["target_id"]["type"], "string");
        assert_eq!(schema["items"]["properties"]["target_id"]["nullable"], true);
        assert_eq!(schema["items"]["properties"]["confidence"]["type"], "number");
    }
}
