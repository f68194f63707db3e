//! Confidence → initial review status and reporting band.
//!
//! | confidence       | status   | band   |
//! |------------------|----------|--------|
//! | `> 0.9`          | approved | high   |
//! | `0.7 ..= 0.9`    | pending  | medium |
//! | `< 0.7`          | pending  | low    |
//!
//! Medium and low both start as pending; only the band tells them apart.

use crate::mapping::{MappingCandidate, MappingStatus};
use serde::{Deserialize, Serialize};

/// Strictly above this, a mapping is approved without review.
pub const AUTO_APPROVE_THRESHOLD: f64 = 0.9;
/// At or above this (and not auto-approved), a mapping is medium confidence.
pub const REVIEW_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: MappingStatus,
    pub band: ConfidenceBand,
}

pub fn band_for(confidence: f64) -> ConfidenceBand {
    if confidence > AUTO_APPROVE_THRESHOLD {
        ConfidenceBand::High
    } else if confidence >= REVIEW_THRESHOLD {
        ConfidenceBand::Medium
    } else {
        // also NaN
        ConfidenceBand::Low
    }
}

pub fn classify(confidence: f64) -> Classification {
    let band = band_for(confidence);
    let status = match band {
        ConfidenceBand::High => MappingStatus::Approved,
        ConfidenceBand::Medium | ConfidenceBand::Low => MappingStatus::Pending,
    };
    Classification { status, band }
}

/// Set the initial status of a freshly parsed candidate.
pub fn apply_initial_status(candidate: &mut MappingCandidate) -> Classification {
    let classification = classify(candidate.confidence);
    candidate.status = classification.status;
    candidate.auto_applied = classification.status == MappingStatus::Approved;
    classification
}

pub fn classify_all(candidates: &mut [MappingCandidate]) {
    for candidate in candidates {
        apply_initial_status(candidate);
    }
}
