use crate::chart_of_accounts::ChartOfAccounts;
use crate::classifier::classify_all;
use crate::config::MapperConfig;
use crate::error::Result;
use crate::ingestion::{LineItem, StatementType};
use crate::issues::{parse_issue_response, DataIssue};
use crate::mapping::{MappingSet, MappingSummary};
use crate::oracle::{generate_with_timeout, GenerationParams, Oracle};
use crate::parser::{degraded, parse_oracle_result, ParseOutcome};
use crate::prompts::MappingPromptBuilder;
use crate::workflow::MappingReviewWorkflow;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;

/// One independent mapping batch.
#[derive(Debug, Clone)]
pub struct MappingRequest {
    pub line_items: Vec<LineItem>,
    pub statement_type: StatementType,
    pub context: Option<String>,
}

impl MappingRequest {
    pub fn new(line_items: Vec<LineItem>, statement_type: StatementType) -> Self {
        Self {
            line_items,
            statement_type,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Classified result of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRun {
    pub set: MappingSet,
    /// Why the default mapping set was used, if it was.
    pub degraded_reason: Option<String>,
}

impl MappingRun {
    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }

    pub fn summary(&self) -> MappingSummary {
        self.set.summary()
    }

    pub fn into_review(self) -> MappingReviewWorkflow {
        MappingReviewWorkflow::new(self.set)
    }

    fn from_outcome(outcome: ParseOutcome) -> Self {
        let degraded_reason = outcome.degradation_reason().map(str::to_string);
        let mut candidates = outcome.into_candidates();
        classify_all(&mut candidates);
        Self {
            set: MappingSet::new(candidates),
            degraded_reason,
        }
    }
}

/// Prompt, oracle call, parse and classify for batches of line items.
pub struct CoaMapper {
    oracle: Option<Arc<dyn Oracle>>,
    prompts: MappingPromptBuilder,
    config: MapperConfig,
}

impl CoaMapper {
    pub fn new(config: MapperConfig, oracle: Arc<dyn Oracle>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle: Some(oracle),
            prompts: MappingPromptBuilder::new(config.coa_sample_limit),
            config,
        })
    }

    /// A mapper with no oracle: every batch yields the default mapping set.
    pub fn without_oracle(config: MapperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle: None,
            prompts: MappingPromptBuilder::new(config.coa_sample_limit),
            config,
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map one batch. Transport failures and timeouts propagate; unusable
    /// oracle output degrades to the default set.
    pub async fn map_line_items(
        &self,
        line_items: &[LineItem],
        chart: &ChartOfAccounts,
        statement_type: StatementType,
        context: Option<&str>,
    ) -> Result<MappingRun> {
        if line_items.is_empty() {
            debug!("No line items to map");
            return Ok(MappingRun {
                set: MappingSet::default(),
                degraded_reason: None,
            });
        }

        let Some(oracle) = &self.oracle else {
            return Ok(MappingRun::from_outcome(degraded(
                line_items,
                "no oracle configured",
            )));
        };

        let coa_sample = chart.sample(statement_type, self.prompts.coa_sample_limit());
        let prompt = self
            .prompts
            .build(line_items, &coa_sample, statement_type, context)?;

        info!(
            "Mapping {} {} line items against {} COA entries",
            line_items.len(),
            statement_type,
            coa_sample.len()
        );

        let response = generate_with_timeout(
            oracle.as_ref(),
            &prompt,
            &self.config.generation,
            self.config.oracle_timeout(),
        )
        .await;

        let run = MappingRun::from_outcome(parse_oracle_result(response, line_items)?);
        let summary = run.summary();
        info!(
            "Mapped {} items: {} high, {} medium, {} low confidence",
            summary.total_items,
            summary.high_confidence,
            summary.medium_confidence,
            summary.low_confidence
        );
        Ok(run)
    }

    /// Ask the oracle to review `line_items` for missing fields,
    /// inconsistencies and anomalies. Transport failures propagate; an
    /// unusable response or a missing oracle yields no issues.
    pub async fn detect_issues(
        &self,
        line_items: &[LineItem],
        statement_type: StatementType,
    ) -> Result<Vec<DataIssue>> {
        if line_items.is_empty() {
            return Ok(Vec::new());
        }
        let Some(oracle) = &self.oracle else {
            warn!("No oracle configured, skipping issue detection");
            return Ok(Vec::new());
        };

        info!(
            "Detecting issues in {} {} line items",
            line_items.len(),
            statement_type
        );
        let prompt = self.prompts.build_issue_check(line_items, statement_type)?;
        let params = GenerationParams {
            temperature: 0.2,
            max_tokens: 1024,
            ..self.config.generation
        };

        let response = generate_with_timeout(
            oracle.as_ref(),
            &prompt,
            &params,
            self.config.oracle_timeout(),
        )
        .await?;
        Ok(parse_issue_response(&response))
    }

    /// Map independent batches concurrently. Results keep request order; each
    /// batch succeeds or fails on its own.
    pub async fn map_batches(
        &self,
        requests: &[MappingRequest],
        chart: &ChartOfAccounts,
    ) -> Vec<Result<MappingRun>> {
        let futures = requests.iter().map(|request| {
            self.map_line_items(
                &request.line_items,
                chart,
                request.statement_type,
                request.context.as_deref(),
            )
        });
        join_all(futures).await
    }
}
