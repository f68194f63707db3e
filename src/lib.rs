//! # COA Mapper
//!
//! Reconciles line items extracted from semi-structured financial documents
//! against a canonical chart of accounts (COA), using an external generative
//! model as a black-box oracle, and tiers the resulting mappings for human review.
//!
//! ## Core Concepts
//!
//! - **Layout extraction**: Offset-based OCR/layout output is rebuilt into typed
//!   documents, tables and entities (`document`, `span`)
//! - **Oracle**: Any `prompt -> text` completion function; its output is untrusted
//! - **Recovery**: Fenced, prose-wrapped or malformed output is salvaged where
//!   possible, otherwise degraded to zero-confidence defaults (`parser`)
//! - **Review**: Confident mappings are auto-approved, the rest wait for a reviewer
//!   to approve, reject or override them (`classifier`, `workflow`)
//! - **Issue detection**: The oracle can also flag missing fields, inconsistencies
//!   and anomalies in the extracted line items (`issues`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use coa_mapper::*;
//! use std::sync::Arc;
//!
//! let extractor = DocumentStructureExtractor::new(Box::new(my_backend));
//! let document = extractor
//!     .extract(&pdf_bytes, "application/pdf", "gs://statements/acme-2023.pdf")
//!     .await?;
//! let items = line_items_from_document(&document, StatementType::IncomeStatement);
//!
//! let mapper = CoaMapper::new(MapperConfig::default(), Arc::new(my_oracle))?;
//! let run = mapper
//!     .map_line_items(
//!         &items,
//!         &ChartOfAccounts::default_template(),
//!         StatementType::IncomeStatement,
//!         None,
//!     )
//!     .await?;
//!
//! let mut review = run.into_review();
//! review.approve(&["p1-t0-r2-c1"])?;
//! println!("{:?}", review.summary());
//! ```

pub mod chart_of_accounts;
pub mod classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod ingestion;
pub mod issues;
pub mod layout;
pub mod mapper;
pub mod mapping;
pub mod oracle;
pub mod parser;
pub mod prompts;
pub mod span;
pub mod workflow;

#[cfg(feature = "gcp")]
pub mod cloud;

pub use chart_of_accounts::{AccountEntry, CanonicalAccount, ChartOfAccounts};
pub use classifier::{
    apply_initial_status, band_for, classify, classify_all, Classification, ConfidenceBand,
    AUTO_APPROVE_THRESHOLD, REVIEW_THRESHOLD,
};
pub use config::{MapperConfig, ProcessorConfig, MAX_COA_SAMPLE};
pub use document::{
    build_document, Document, DocumentStructureExtractor, ExtractedEntity, LayoutBackend,
    ObjectStore, SourceRef, Table,
};
pub use error::{MappingError, Result};
pub use ingestion::*;
pub use issues::{parse_issue_response, DataIssue, IssueSeverity, IssueType};
pub use layout::RawLayout;
pub use mapper::{CoaMapper, MappingRequest, MappingRun};
pub use mapping::{MappingCandidate, MappingSet, MappingStatus, MappingSummary};
pub use oracle::{generate_with_timeout, GenerationParams, Oracle};
pub use parser::{
    default_mappings, parse_mapping_response, parse_oracle_result, ParseOutcome,
    DEFAULT_MAPPING_REASON, UNANSWERED_MAPPING_REASON,
};
pub use prompts::{response_schema, MappingPromptBuilder};
pub use span::{resolve_spans, TextSpan};
pub use workflow::*;
