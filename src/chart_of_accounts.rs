use crate::error::{MappingError, Result};
use crate::ingestion::StatementType;
use serde::{Deserialize, Serialize};

/// A node in the canonical chart of accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAccount {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "parent")]
    pub parent_id: Option<String>,
    /// Root accounts carry the statement they belong to; children inherit it.
    #[serde(default, rename = "type")]
    pub statement_type: Option<StatementType>,
    #[serde(default)]
    pub children: Vec<CanonicalAccount>,
}

impl CanonicalAccount {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            statement_type: None,
            children: Vec::new(),
        }
    }

    pub fn with_statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = Some(statement_type);
        self
    }

    pub fn with_child(mut self, child: CanonicalAccount) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn link_children(&mut self) {
        for child in &mut self.children {
            child.parent_id = Some(self.id.clone());
            if child.statement_type.is_none() {
                child.statement_type = self.statement_type;
            }
            child.link_children();
        }
    }
}

/// Flat, prompt-friendly view of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub name: String,
    pub accounts: Vec<CanonicalAccount>,
}

impl ChartOfAccounts {
    pub fn new(name: impl Into<String>, accounts: Vec<CanonicalAccount>) -> Self {
        let mut chart = Self {
            name: name.into(),
            accounts,
        };
        chart.link();
        chart
    }

    /// Parse a chart from JSON: either `{"name": .., "accounts": [..]}` or a
    /// bare array of root accounts.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.is_array() {
            let accounts: Vec<CanonicalAccount> = serde_json::from_value(value)?;
            return Ok(Self::new(name, accounts));
        }
        if value.get("accounts").is_some() {
            let chart: ChartOfAccounts = serde_json::from_value(value)?;
            return Ok(Self::new(chart.name, chart.accounts));
        }
        Err(MappingError::InvalidConfig(
            "chart of accounts must be an array or an object with 'accounts'".to_string(),
        ))
    }

    /// The built-in template used when no organisation-specific chart exists.
    pub fn default_template() -> Self {
        let income = StatementType::IncomeStatement;
        Self::new(
            "default",
            vec![
                CanonicalAccount::new("revenue", "Revenue")
                    .with_statement_type(income)
                    .with_child(CanonicalAccount::new("revenue.product", "Product Revenue"))
                    .with_child(CanonicalAccount::new("revenue.service", "Service Revenue"))
                    .with_child(CanonicalAccount::new("revenue.other", "Other Revenue")),
                CanonicalAccount::new("cogs", "Cost of Revenue")
                    .with_statement_type(income)
                    .with_child(CanonicalAccount::new("cogs.materials", "Direct Materials"))
                    .with_child(CanonicalAccount::new("cogs.labor", "Direct Labor"))
                    .with_child(CanonicalAccount::new("cogs.overhead", "Manufacturing Overhead")),
                CanonicalAccount::new("opex", "Operating Expenses")
                    .with_statement_type(income)
                    .with_child(CanonicalAccount::new("opex.rd", "Research & Development"))
                    .with_child(CanonicalAccount::new("opex.sales", "Sales & Marketing"))
                    .with_child(CanonicalAccount::new("opex.ga", "General & Administrative")),
            ],
        )
    }

    fn link(&mut self) {
        for account in &mut self.accounts {
            account.parent_id = None;
            account.link_children();
        }
    }

    /// Depth-first, pre-order listing of every account.
    pub fn flatten(&self) -> Vec<AccountEntry> {
        let mut entries = Vec::new();
        for account in &self.accounts {
            push_entries(account, None, &mut entries);
        }
        entries
    }

    /// Accounts relevant to `statement_type` (untyped roots always count),
    /// flattened and capped at `limit`.
    pub fn sample(&self, statement_type: StatementType, limit: usize) -> Vec<AccountEntry> {
        let mut entries = Vec::new();
        for account in &self.accounts {
            if account.statement_type.map_or(true, |t| t == statement_type) {
                push_entries(account, None, &mut entries);
            }
        }
        entries.truncate(limit);
        entries
    }

    pub fn find(&self, id: &str) -> Option<&CanonicalAccount> {
        fn walk<'a>(accounts: &'a [CanonicalAccount], id: &str) -> Option<&'a CanonicalAccount> {
            for account in accounts {
                if account.id == id {
                    return Some(account);
                }
                if let Some(found) = walk(&account.children, id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.accounts, id)
    }

    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn push_entries(account: &CanonicalAccount, parent: Option<&str>, out: &mut Vec<AccountEntry>) {
    out.push(AccountEntry {
        id: account.id.clone(),
        name: account.name.clone(),
        parent_id: parent.map(str::to_string),
    });
    for child in &account.children {
        push_entries(child, Some(&account.id), out);
    }
}
