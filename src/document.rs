use crate::error::{MappingError, Result};
use crate::layout::{RawLayout, RawRow, RawTable};
use crate::span::resolve_spans;
use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub pages: usize,
    pub tables: Vec<Table>,
    pub entities: Vec<ExtractedEntity>,
    /// Confidence of the first page, or 0.0 for a document without pages.
    pub confidence: f64,
}

impl Document {
    /// The degraded result returned when no layout backend is available.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            pages: 0,
            tables: Vec::new(),
            entities: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages == 0 && self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub page: u32,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub mention_text: String,
    pub confidence: f64,
    pub normalized_value: Option<String>,
}

/// A `scheme://bucket/path` object reference, e.g. `gs://uploads/acme/fy23.pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub scheme: String,
    pub bucket: String,
    pub path: String,
}

impl SourceRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || MappingError::InvalidSourceRef(reference.to_string());

        let (scheme, rest) = reference.split_once("://").ok_or_else(invalid)?;
        let valid_scheme = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme {
            return Err(invalid());
        }

        let (bucket, path) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || path.is_empty() || bucket.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    /// Best guess at the MIME type from the object path's extension.
    pub fn guess_mime_type(&self) -> String {
        mime_guess::from_path(&self.path)
            .first_or_octet_stream()
            .to_string()
    }
}

impl FromStr for SourceRef {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.path)
    }
}

/// An OCR/layout engine turning document bytes into raw layout output.
pub trait LayoutBackend: Send + Sync {
    fn process<'a>(&'a self, content: &'a [u8], mime_type: &'a str)
        -> BoxFuture<'a, Result<RawLayout>>;
}

/// Fetches document bytes for a source reference.
pub trait ObjectStore: Send + Sync {
    fn fetch<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<Vec<u8>>>;
}

pub struct DocumentStructureExtractor {
    backend: Option<Box<dyn LayoutBackend>>,
}

impl DocumentStructureExtractor {
    pub fn new(backend: Box<dyn LayoutBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// An extractor with no backend: every extraction yields [`Document::empty`].
    pub fn unconfigured() -> Self {
        Self { backend: None }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn extract(
        &self,
        raw_bytes: &[u8],
        mime_type: &str,
        source_ref: &str,
    ) -> Result<Document> {
        let source = SourceRef::parse(source_ref)?;

        let Some(backend) = &self.backend else {
            warn!(
                "No layout backend configured, returning empty document for {}",
                source
            );
            return Ok(Document::empty());
        };

        info!("Processing document: {} ({})", source, mime_type);
        let raw = backend.process(raw_bytes, mime_type).await?;
        let document = build_document(&raw);

        info!(
            "Document processed: {} pages, {} tables, {} entities",
            document.pages,
            document.tables.len(),
            document.entities.len()
        );
        Ok(document)
    }

    /// Fetch the referenced object through `store`, then extract it. When no
    /// MIME type is given it is guessed from the object path.
    pub async fn extract_from_store(
        &self,
        store: &dyn ObjectStore,
        source_ref: &str,
        mime_type: Option<&str>,
    ) -> Result<Document> {
        let source = SourceRef::parse(source_ref)?;
        if !self.is_configured() {
            warn!(
                "No layout backend configured, skipping fetch of {}",
                source
            );
            return Ok(Document::empty());
        }

        let mime_type = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| source.guess_mime_type());
        let bytes = store.fetch(&source).await?;
        debug!("Fetched {} bytes from {}", bytes.len(), source);

        self.extract(&bytes, &mime_type, source_ref).await
    }
}

/// Convert raw layout output into a [`Document`]. Never fails: missing
/// offsets, pages or values fall back to their documented defaults.
pub fn build_document(raw: &RawLayout) -> Document {
    let tables = raw
        .pages
        .iter()
        .flat_map(|page| {
            page.tables
                .iter()
                .map(move |table| build_table(table, page.page_number, &raw.text))
        })
        .collect();

    let entities = raw
        .entities
        .iter()
        .map(|entity| ExtractedEntity {
            entity_type: entity.entity_type.clone(),
            mention_text: entity.mention_text.clone(),
            confidence: entity.confidence,
            normalized_value: entity
                .normalized_value
                .as_ref()
                .and_then(|value| value.text.clone()),
        })
        .collect();

    Document {
        text: raw.text.clone(),
        pages: raw.pages.len(),
        tables,
        entities,
        confidence: raw.pages.first().map(|p| p.confidence()).unwrap_or(0.0),
    }
}

fn build_table(table: &RawTable, page: u32, text: &str) -> Table {
    // Only the first header row is used; additional header rows are ignored.
    if table.header_rows.len() > 1 {
        debug!(
            "Table on page {} has {} header rows, ignoring all but the first",
            page,
            table.header_rows.len()
        );
    }

    Table {
        page,
        headers: table
            .header_rows
            .first()
            .map(|row| row_text(row, text))
            .unwrap_or_default(),
        rows: table.body_rows.iter().map(|row| row_text(row, text)).collect(),
    }
}

fn row_text(row: &RawRow, text: &str) -> Vec<String> {
    row.cells
        .iter()
        .map(|cell| resolve_spans(cell.spans(), text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{NormalizedValue, RawBlockLayout, RawCell, RawEntity, RawPage};
    use crate::span::TextSpan;

    const TEXT: &str = "Account Amount\nCash 1,200\nRevenue 5,000\n";

    fn cell(start: usize, end: usize) -> RawCell {
        RawCell::from_spans(vec![TextSpan::new(start, end)])
    }

    fn sample_layout() -> RawLayout {
        RawLayout {
            text: TEXT.to_string(),
            pages: vec![RawPage {
                page_number: 1,
                layout: RawBlockLayout {
                    confidence: 0.97,
                    ..Default::default()
                },
                tables: vec![RawTable {
                    header_rows: vec![
                        RawRow {
                            cells: vec![cell(0, 7), cell(8, 14)],
                        },
                        RawRow {
                            cells: vec![cell(15, 19)],
                        },
                    ],
                    body_rows: vec![
                        RawRow {
                            cells: vec![cell(15, 19), cell(20, 25)],
                        },
                        RawRow {
                            cells: vec![cell(26, 33), cell(34, 39)],
                        },
                    ],
                }],
            }],
            entities: vec![
                RawEntity {
                    entity_type: "currency".to_string(),
                    mention_text: "1,200".to_string(),
                    confidence: 0.6,
                    normalized_value: Some(NormalizedValue {
                        text: Some("1200".to_string()),
                    }),
                },
                RawEntity {
                    entity_type: "org".to_string(),
                    mention_text: "Acme".to_string(),
                    confidence: 0.4,
                    normalized_value: None,
                },
            ],
        }
    }

    struct FixedBackend(RawLayout);

    impl LayoutBackend for FixedBackend {
        fn process<'a>(
            &'a self,
            _content: &'a [u8],
            _mime_type: &'a str,
        ) -> BoxFuture<'a, Result<RawLayout>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[test]
    fn test_source_ref_parsing() {
        let source = SourceRef::parse("gs://uploads/acme/fy23.pdf").unwrap();
        assert_eq!(source.scheme, "gs");
        assert_eq!(source.bucket, "uploads");
        assert_eq!(source.path, "acme/fy23.pdf");
        assert_eq!(source.to_string(), "gs://uploads/acme/fy23.pdf");
        assert_eq!(source.guess_mime_type(), "application/pdf");

        for bad in ["uploads/acme.pdf", "gs://uploads", "gs:///file.pdf", "://b/p", "gs://b/"] {
            assert!(
                matches!(SourceRef::parse(bad), Err(MappingError::InvalidSourceRef(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_build_document_tables_and_entities() {
        let document = build_document(&sample_layout());

        assert_eq!(document.pages, 1);
        assert!((document.confidence - 0.97).abs() < f64::EPSILON);
        assert_eq!(document.tables.len(), 1);

        let table = &document.tables[0];
        assert_eq!(table.page, 1);
        assert_eq!(table.headers, vec!["Account", "Amount"]);
        assert_eq!(
            table.rows,
            vec![vec!["Cash", "1,200"], vec!["Revenue", "5,000"]]
        );

        assert_eq!(document.entities.len(), 2);
        assert_eq!(document.entities[0].normalized_value.as_deref(), Some("1200"));
        assert_eq!(document.entities[1].normalized_value, None);
    }

    #[test]
    fn test_table_without_header_rows() {
        let mut layout = sample_layout();
        layout.pages[0].tables[0].header_rows.clear();
        let document = build_document(&layout);
        assert!(document.tables[0].headers.is_empty());
        assert_eq!(document.tables[0].rows.len(), 2);
    }

    #[test]
    fn test_no_pages_means_zero_confidence() {
        let layout = RawLayout {
            text: "loose text".to_string(),
            ..Default::default()
        };
        let document = build_document(&layout);
        assert_eq!(document.pages, 0);
        assert_eq!(document.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_unconfigured_extractor_returns_empty_document() {
        let extractor = DocumentStructureExtractor::unconfigured();
        let document = extractor
            .extract(b"%PDF-1.7", "application/pdf", "gs://bucket/file.pdf")
            .await
            .unwrap();
        assert_eq!(document, Document::empty());
        assert!(document.is_empty());
    }

    #[tokio::test]
    async fn test_extract_rejects_malformed_source_ref() {
        let extractor = DocumentStructureExtractor::new(Box::new(FixedBackend(sample_layout())));
        let err = extractor
            .extract(b"", "application/pdf", "not-a-reference")
            .await
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidSourceRef(_)));
    }

    #[tokio::test]
    async fn test_extract_with_backend() {
        let extractor = DocumentStructureExtractor::new(Box::new(FixedBackend(sample_layout())));
        let document = extractor
            .extract(b"bytes", "application/pdf", "gs://bucket/statements/q4.pdf")
            .await
            .unwrap();
        assert_eq!(document.tables[0].rows[1][0], "Revenue");
    }
}
