use crate::classifier::{band_for, ConfidenceBand};
use crate::ingestion::LineItem;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MappingStatus::Pending => "pending",
            MappingStatus::Approved => "approved",
            MappingStatus::Rejected => "rejected",
        })
    }
}

/// A proposed mapping from one source line item to a canonical account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingCandidate {
    pub source_id: String,
    pub source_name: String,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub status: MappingStatus,
    /// Set when the classifier approved the mapping without human review.
    #[serde(default)]
    pub auto_applied: bool,
}

impl MappingCandidate {
    /// Build a pending candidate. Confidence is clamped into `[0, 1]`; a
    /// non-finite confidence becomes 0.0.
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        target_id: Option<String>,
        target_name: Option<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        let confidence = clamp_confidence(confidence);

        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            target_id,
            target_name,
            confidence,
            reasoning: reasoning.into(),
            status: MappingStatus::Pending,
            auto_applied: false,
        }
    }

    /// A zero-confidence, targetless candidate for `item`.
    pub fn unmapped(item: &LineItem, reasoning: impl Into<String>) -> Self {
        Self::new(item.id.clone(), item.label.clone(), None, None, 0.0, reasoning)
    }

    pub fn band(&self) -> ConfidenceBand {
        band_for(self.confidence)
    }

    pub fn is_mapped(&self) -> bool {
        self.target_id.is_some()
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Clamping counterpart of [`MappingCandidate::new`] for deserialized records.
pub(crate) fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_confidence)
}

/// Aggregate counts over a [`MappingSet`]. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingSummary {
    pub total_items: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub auto_approved: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    candidates: Vec<MappingCandidate>,
}

impl MappingSet {
    pub fn new(candidates: Vec<MappingCandidate>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[MappingCandidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<MappingCandidate> {
        self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, source_id: &str) -> Option<&MappingCandidate> {
        self.candidates.iter().find(|c| c.source_id == source_id)
    }

    pub(crate) fn get_mut(&mut self, source_id: &str) -> Option<&mut MappingCandidate> {
        self.candidates.iter_mut().find(|c| c.source_id == source_id)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.get(source_id).is_some()
    }

    pub fn with_status(&self, status: MappingStatus) -> Vec<&MappingCandidate> {
        self.candidates.iter().filter(|c| c.status == status).collect()
    }

    pub fn summary(&self) -> MappingSummary {
        let mut summary = MappingSummary {
            total_items: self.candidates.len(),
            ..Default::default()
        };

        for candidate in &self.candidates {
            match candidate.band() {
                ConfidenceBand::High => summary.high_confidence += 1,
                ConfidenceBand::Medium => summary.medium_confidence += 1,
                ConfidenceBand::Low => summary.low_confidence += 1,
            }
            match candidate.status {
                MappingStatus::Pending => summary.pending += 1,
                MappingStatus::Approved => summary.approved += 1,
                MappingStatus::Rejected => summary.rejected += 1,
            }
            if candidate.auto_applied && candidate.status == MappingStatus::Approved {
                summary.auto_approved += 1;
            }
        }

        summary
    }
}
