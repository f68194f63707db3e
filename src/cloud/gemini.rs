use crate::cloud::status_error;
use crate::cloud::types::*;
use crate::error::{MappingError, Result};
use crate::oracle::{GenerationParams, Oracle};
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// [`Oracle`] backed by the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    response_schema: Option<serde_json::Value>,
}

impl GeminiOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            response_schema: None,
        }
    }

    /// Constrain output with a `responseSchema`, e.g.
    /// [`crate::prompts::response_schema`].
    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn request_body(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                max_output_tokens: params.max_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: self.response_schema.clone(),
            },
        }
    }

    async fn generate_content(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = self.request_body(prompt, params);

        debug!(
            "Calling {} with a {} character prompt",
            self.model,
            prompt.len()
        );
        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            warn!("Gemini API error (status {})", status);
            return Err(status_error(
                "Gemini API",
                status,
                err_text,
                MappingError::OracleUnavailable,
            ));
        }

        let body: GenerateContentResponse = res.json().await?;
        response_text(body)
    }
}

pub(crate) fn response_text(body: GenerateContentResponse) -> Result<String> {
    let candidate = body
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| {
            MappingError::OracleUnavailable("No candidates returned".to_string())
        })?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        })
        .collect();

    if text.is_empty() {
        return Err(MappingError::OracleUnavailable(format!(
            "Model returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

impl Oracle for GeminiOracle {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.generate_content(prompt, params))
    }
}
