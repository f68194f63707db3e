//! Raw layout output as produced by an OCR/layout backend.
//!
//! The shapes follow Google Document AI's `Document` JSON (camelCase keys,
//! cells located by text anchors into the full document text). Every field is
//! optional on the wire: partial layout data is normal and must not abort
//! extraction.

use crate::error::{MappingError, Result};
use crate::span::TextSpan;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawLayout {
    pub text: String,
    pub pages: Vec<RawPage>,
    pub entities: Vec<RawEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPage {
    pub page_number: u32,
    pub layout: RawBlockLayout,
    pub tables: Vec<RawTable>,
}

impl RawPage {
    pub fn confidence(&self) -> f64 {
        self.layout.confidence
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBlockLayout {
    pub text_anchor: TextAnchor,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextAnchor {
    pub text_segments: Vec<TextSpan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTable {
    pub header_rows: Vec<RawRow>,
    pub body_rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCell {
    pub layout: RawBlockLayout,
}

impl RawCell {
    pub fn from_spans(spans: Vec<TextSpan>) -> Self {
        Self {
            layout: RawBlockLayout {
                text_anchor: TextAnchor {
                    text_segments: spans,
                },
                confidence: 0.0,
            },
        }
    }

    pub fn spans(&self) -> &[TextSpan] {
        &self.layout.text_anchor.text_segments
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub mention_text: String,
    pub confidence: f64,
    pub normalized_value: Option<NormalizedValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizedValue {
    pub text: Option<String>,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: RawLayout,
}

impl RawLayout {
    /// Parse backend JSON: either a bare `Document` or a process response
    /// wrapping it under `document`.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| MappingError::InvalidLayout(format!("layout JSON parse failed: {}", e)))?;

        if value.get("document").is_some() {
            let wrapped: ProcessResponse = serde_json::from_value(value)?;
            return Ok(wrapped.document);
        }

        Ok(serde_json::from_value(value)?)
    }
}
