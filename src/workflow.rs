use crate::error::{MappingError, Result};
use crate::mapping::{MappingCandidate, MappingSet, MappingStatus, MappingSummary};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

const OVERRIDE_FIELDS: [&str; 4] = ["target_id", "target_name", "reasoning", "status"];

/// Manual correction of a single mapping.
///
/// `target_id`/`target_name` distinguish "leave unchanged" (`None`) from
/// "clear" (`Some(None)`). The status only changes when one is supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingOverride {
    #[serde(default, deserialize_with = "present")]
    pub target_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub target_name: Option<Option<String>>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub status: Option<MappingStatus>,
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl MappingOverride {
    pub fn retarget(target_id: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            target_id: Some(Some(target_id.into())),
            target_name: Some(Some(target_name.into())),
            ..Default::default()
        }
    }

    pub fn clear_target() -> Self {
        Self {
            target_id: Some(None),
            target_name: Some(None),
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_status(mut self, status: MappingStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Parse an override payload, rejecting fields other than
    /// `target_id`, `target_name`, `reasoning` and `status`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            MappingError::InvalidOverride("override must be a JSON object".to_string())
        })?;

        let unknown: Vec<String> = obj
            .keys()
            .filter(|key| !OVERRIDE_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(MappingError::UnknownOverrideField(unknown));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| MappingError::InvalidOverride(e.to_string()))
    }

    fn changes_target(&self) -> bool {
        self.target_id.is_some() || self.target_name.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    Override,
}

/// The status decision of a batch review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub mapping_ids: Vec<String>,
    pub action: ReviewDecision,
    /// Per-id overrides applied before the status decision.
    #[serde(default)]
    pub overrides: BTreeMap<String, MappingOverride>,
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub mapping_id: String,
    pub action: ReviewAction,
    pub previous_status: MappingStatus,
    pub new_status: MappingStatus,
    pub at: DateTime<Utc>,
}

/// Review state machine over one [`MappingSet`].
///
/// `pending -> approved | rejected`, and `approved <-> rejected`, only ever
/// through an explicit call. Mutation takes `&mut self`; share across tasks
/// with [`SharedReview`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingReviewWorkflow {
    set: MappingSet,
    history: Vec<ReviewEvent>,
}

impl MappingReviewWorkflow {
    pub fn new(set: MappingSet) -> Self {
        Self {
            set,
            history: Vec::new(),
        }
    }

    pub fn set(&self) -> &MappingSet {
        &self.set
    }

    pub fn into_set(self) -> MappingSet {
        self.set
    }

    pub fn history(&self) -> &[ReviewEvent] {
        &self.history
    }

    pub fn get(&self, id: &str) -> Option<&MappingCandidate> {
        self.set.get(id)
    }

    pub fn with_status(&self, status: MappingStatus) -> Vec<&MappingCandidate> {
        self.set.with_status(status)
    }

    /// Recomputed from the candidates on every call.
    pub fn summary(&self) -> MappingSummary {
        self.set.summary()
    }

    /// Approve every known id. Unknown ids are reported in
    /// [`MappingError::UnknownMappings`]; the known ones are still applied.
    pub fn approve<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<usize> {
        self.transition(ids, MappingStatus::Approved, ReviewAction::Approve)
    }

    /// Reject every known id; see [`approve`](Self::approve) for unknown ids.
    pub fn reject<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<usize> {
        self.transition(ids, MappingStatus::Rejected, ReviewAction::Reject)
    }

    pub fn override_mapping(
        &mut self,
        id: &str,
        fields: MappingOverride,
    ) -> Result<&MappingCandidate> {
        let Some(candidate) = self.set.get_mut(id) else {
            warn!("Override for unknown mapping '{}'", id);
            return Err(MappingError::UnknownMappings {
                ids: vec![id.to_string()],
                applied: 0,
            });
        };

        let previous_status = candidate.status;
        let changes_target = fields.changes_target();

        if let Some(target_id) = fields.target_id {
            candidate.target_id = target_id;
        }
        if let Some(target_name) = fields.target_name {
            candidate.target_name = target_name;
        }
        if let Some(reasoning) = fields.reasoning {
            candidate.reasoning = reasoning;
        }
        if let Some(status) = fields.status {
            candidate.status = status;
        }
        if changes_target || candidate.status != previous_status {
            candidate.auto_applied = false;
        }

        debug!(
            "Override on '{}': {} -> {:?} ({})",
            id,
            candidate.source_name,
            candidate.target_name,
            candidate.status
        );

        self.history.push(ReviewEvent {
            mapping_id: id.to_string(),
            action: ReviewAction::Override,
            previous_status,
            new_status: candidate.status,
            at: Utc::now(),
        });

        Ok(candidate)
    }

    /// Apply a batch request: overrides first, then the status decision.
    /// Unknown ids from both parts are reported together.
    pub fn apply(&mut self, request: ReviewRequest) -> Result<usize> {
        let mut unresolved = Vec::new();

        for (id, fields) in request.overrides {
            if self.override_mapping(&id, fields).is_err() {
                unresolved.push(id);
            }
        }

        let result = match request.action {
            ReviewDecision::Approve => self.approve(&request.mapping_ids),
            ReviewDecision::Reject => self.reject(&request.mapping_ids),
        };

        let applied = match result {
            Ok(applied) => applied,
            Err(MappingError::UnknownMappings { ids, applied }) => {
                for id in ids {
                    if !unresolved.contains(&id) {
                        unresolved.push(id);
                    }
                }
                applied
            }
            Err(e) => return Err(e),
        };

        if unresolved.is_empty() {
            Ok(applied)
        } else {
            Err(MappingError::UnknownMappings {
                ids: unresolved,
                applied,
            })
        }
    }

    fn transition<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        status: MappingStatus,
        action: ReviewAction,
    ) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut unresolved = Vec::new();
        let mut applied = 0;
        let now = Utc::now();

        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }

            match self.set.get_mut(id) {
                Some(candidate) => {
                    let previous_status = candidate.status;
                    if previous_status != status {
                        candidate.status = status;
                        candidate.auto_applied = false;
                    }
                    self.history.push(ReviewEvent {
                        mapping_id: id.to_string(),
                        action,
                        previous_status,
                        new_status: status,
                        at: now,
                    });
                    applied += 1;
                }
                None => unresolved.push(id.to_string()),
            }
        }

        info!("{:?}: {} mapping(s) updated", action, applied);

        if unresolved.is_empty() {
            Ok(applied)
        } else {
            warn!(
                "{:?}: {} unknown mapping id(s): {}",
                action,
                unresolved.len(),
                unresolved.join(", ")
            );
            Err(MappingError::UnknownMappings {
                ids: unresolved,
                applied,
            })
        }
    }
}

/// A [`MappingReviewWorkflow`] shared between tasks. Every operation holds
/// the set's lock for its whole duration, so batches never interleave.
#[derive(Debug, Clone, Default)]
pub struct SharedReview {
    inner: Arc<Mutex<MappingReviewWorkflow>>,
}

impl SharedReview {
    pub fn new(workflow: MappingReviewWorkflow) -> Self {
        Self {
            inner: Arc::new(Mutex::new(workflow)),
        }
    }

    pub async fn approve(&self, ids: &[String]) -> Result<usize> {
        self.inner.lock().await.approve(ids)
    }

    pub async fn reject(&self, ids: &[String]) -> Result<usize> {
        self.inner.lock().await.reject(ids)
    }

    pub async fn override_mapping(
        &self,
        id: &str,
        fields: MappingOverride,
    ) -> Result<MappingCandidate> {
        let mut workflow = self.inner.lock().await;
        workflow.override_mapping(id, fields).cloned()
    }

    pub async fn apply(&self, request: ReviewRequest) -> Result<usize> {
        self.inner.lock().await.apply(request)
    }

    pub async fn summary(&self) -> MappingSummary {
        self.inner.lock().await.summary()
    }

    /// A copy of the current mapping set, e.g. for persistence.
    pub async fn snapshot(&self) -> MappingSet {
        self.inner.lock().await.set().clone()
    }

    pub async fn history(&self) -> Vec<ReviewEvent> {
        self.inner.lock().await.history().to_vec()
    }
}
