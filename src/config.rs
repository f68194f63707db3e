use crate::error::{MappingError, Result};
use crate::oracle::GenerationParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on chart-of-accounts entries embedded in one prompt.
pub const MAX_COA_SAMPLE: usize = 50;

/// Identity of the layout processor used for extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub project_id: String,
    pub location: String,
    pub processor_id: String,
}

impl ProcessorConfig {
    /// Fully-qualified processor resource name.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, self.processor_id
        )
    }

    pub fn is_complete(&self) -> bool {
        !self.project_id.is_empty() && !self.location.is_empty() && !self.processor_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub processor: ProcessorConfig,
    pub model: String,
    pub generation: GenerationParams,
    /// Maximum time for a single oracle call (seconds)
    pub oracle_timeout_secs: u64,
    pub coa_sample_limit: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            model: "gemini-1.5-pro".to_string(),
            generation: GenerationParams::default(),
            oracle_timeout_secs: 120,
            coa_sample_limit: MAX_COA_SAMPLE,
        }
    }
}

impl MapperConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oracle_timeout_secs == 0 {
            return Err(MappingError::InvalidConfig(
                "oracle_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.coa_sample_limit == 0 || self.coa_sample_limit > MAX_COA_SAMPLE {
            return Err(MappingError::InvalidConfig(format!(
                "coa_sample_limit must be between 1 and {}",
                MAX_COA_SAMPLE
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(MappingError::InvalidConfig(format!(
                "temperature {} out of range 0.0..=2.0",
                self.generation.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(MappingError::InvalidConfig(format!(
                "top_p {} out of range 0.0..=1.0",
                self.generation.top_p
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(MappingError::InvalidConfig(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
