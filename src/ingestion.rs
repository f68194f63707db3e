use crate::document::{Document, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "income_statement",
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single labelled figure from a source statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub period: String,
    pub statement_type: StatementType,
}

impl LineItem {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        value: f64,
        period: impl Into<String>,
        statement_type: StatementType,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value,
            period: period.into(),
            statement_type,
        }
    }
}

/// Period used when a value column has no header text.
pub const UNLABELLED_PERIOD: &str = "unspecified";

/// Derive line items from every table in `document`.
pub fn line_items_from_document(
    document: &Document,
    statement_type: StatementType,
) -> Vec<LineItem> {
    document
        .tables
        .iter()
        .enumerate()
        .flat_map(|(idx, table)| line_items_from_table(table, idx, statement_type))
        .collect()
}

/// One line item per (row, numeric column). The label is the row's first
/// non-empty cell; the period is the header of the value's column.
///
/// Rows without a label or without any parseable amount are skipped.
pub fn line_items_from_table(
    table: &Table,
    table_index: usize,
    statement_type: StatementType,
) -> Vec<LineItem> {
    let mut items = Vec::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        let Some(label_col) = row.iter().position(|cell| !cell.trim().is_empty()) else {
            continue;
        };
        let label = row[label_col].trim();
        if parse_amount(label).is_some() {
            continue;
        }

        for (col_idx, cell) in row.iter().enumerate().skip(label_col + 1) {
            let Some(value) = parse_amount(cell) else {
                continue;
            };

            let period = table
                .headers
                .get(col_idx)
                .map(|h| h.trim())
                .filter(|h| !h.is_empty())
                .unwrap_or(UNLABELLED_PERIOD);

            items.push(LineItem {
                id: format!("p{}-t{}-r{}-c{}", table.page, table_index, row_idx, col_idx),
                label: label.to_string(),
                value,
                period: period.to_string(),
                statement_type,
            });
        }
    }

    items
}

/// Parse a statement amount such as `"$1,234.50"`, `"(1,200)"` or `"-75"`.
///
/// Parenthesised amounts are negative. Dashes used as "nil" markers and
/// non-numeric text yield `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut text = raw.trim();
    let mut negative = false;

    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        negative = true;
        text = &text[1..text.len() - 1];
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥' | ' ' | '\u{a0}'))
        .collect();

    let cleaned = match cleaned.strip_prefix('-') {
        Some(rest) => {
            negative = !negative;
            rest.to_string()
        }
        None => cleaned,
    };

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}
