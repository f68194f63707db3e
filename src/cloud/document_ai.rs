use crate::cloud::status_error;
use crate::cloud::types::{ProcessRequest, ProcessResponse, RawDocument};
use crate::config::ProcessorConfig;
use crate::document::LayoutBackend;
use crate::error::{MappingError, Result};
use crate::layout::RawLayout;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::Client;

/// [`LayoutBackend`] calling a Document AI processor.
///
/// Authentication is the caller's concern: supply an OAuth access token.
#[derive(Clone)]
pub struct DocumentAiBackend {
    client: Client,
    processor: ProcessorConfig,
    access_token: String,
    endpoint: String,
}

impl DocumentAiBackend {
    pub fn new(processor: ProcessorConfig, access_token: impl Into<String>) -> Result<Self> {
        if !processor.is_complete() {
            return Err(MappingError::InvalidConfig(
                "Document AI processor requires project_id, location and processor_id"
                    .to_string(),
            ));
        }
        let endpoint = format!(
            "https://{}-documentai.googleapis.com/v1",
            processor.location
        );
        Ok(Self {
            client: Client::new(),
            processor,
            access_token: access_token.into(),
            endpoint,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub(crate) fn process_url(&self) -> String {
        format!("{}/{}:process", self.endpoint, self.processor.resource_name())
    }

    async fn process_document(&self, content: &[u8], mime_type: &str) -> Result<RawLayout> {
        let payload = ProcessRequest {
            raw_document: RawDocument {
                content: STANDARD.encode(content),
                mime_type: mime_type.to_string(),
            },
        };

        debug!(
            "Sending {} bytes to {}",
            content.len(),
            self.processor.resource_name()
        );
        let res = self
            .client
            .post(self.process_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            warn!("Document AI error (status {})", status);
            return Err(status_error(
                "Document AI",
                status,
                err_text,
                MappingError::Transport,
            ));
        }

        let body: ProcessResponse = res.json().await?;
        Ok(body.document)
    }
}

impl LayoutBackend for DocumentAiBackend {
    fn process<'a>(
        &'a self,
        content: &'a [u8],
        mime_type: &'a str,
    ) -> BoxFuture<'a, Result<RawLayout>> {
        Box::pin(self.process_document(content, mime_type))
    }
}
